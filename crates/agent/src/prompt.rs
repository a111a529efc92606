//! Prompt builder for the ReAct loop.
//!
//! Layout, top to bottom:
//! 1. system prefix (configurable)
//! 2. tool catalogue, in registration order
//! 3. format instructions
//! 4. previous conversation
//! 5. the current question, then the scratchpad

use opsclaw_core::memory::ConversationTurn;
use opsclaw_core::tool::ToolDescription;

use crate::scratchpad::Scratchpad;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Do your best to answer the questions. Feel free to use any tools \
available to look up relevant information, only if necessary.";

/// Stop sequence sent with every request so the model does not invent
/// tool results.
pub const OBSERVATION_STOP: &str = "\nObservation:";

/// Everything the prompt is built from.
pub struct PromptParts<'a> {
    pub system: &'a str,
    pub tools: &'a [ToolDescription],
    pub history: &'a [ConversationTurn],
    pub input: &'a str,
    pub scratchpad: &'a Scratchpad,
}

pub fn render(parts: &PromptParts<'_>) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(parts.system.trim());
    prompt.push_str("\n\n");

    if parts.tools.is_empty() {
        prompt.push_str("You have no tools available.\n\n");
    } else {
        prompt.push_str("You have access to the following tools:\n\n");
        for tool in parts.tools {
            prompt.push_str(&format!("{}: {}\n", tool.name, tool.description));
        }
        prompt.push('\n');
    }

    let names: Vec<&str> = parts.tools.iter().map(|t| t.name.as_str()).collect();
    prompt.push_str(&format!(
        "Use the following format:\n\n\
         Question: the input question you must answer\n\
         Thought: you should always think about what to do\n\
         Action: the action to take, should be one of [{}]\n\
         Action Input: the input to the action\n\
         Observation: the result of the action\n\
         ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
         Thought: I now know the final answer\n\
         Final Answer: the final answer to the original input question\n\n\
         Begin!\n\n",
        names.join(", ")
    ));

    if !parts.history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for turn in parts.history {
            prompt.push_str(&format!("{}: {}\n", turn.role.label(), turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {}\nThought:", parts.input.trim()));
    prompt.push_str(&parts.scratchpad.render());
    prompt
}
