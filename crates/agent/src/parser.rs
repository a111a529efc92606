//! ReAct output parser.
//!
//! The model answers in the text format described by the prompt:
//!
//! ```text
//! Thought: I need the ticket list
//! Action: list-all-tickets
//! Action Input: ""
//! ```
//!
//! or, once it is done:
//!
//! ```text
//! Thought: I now know the final answer
//! Final Answer: There are 3 open tickets.
//! ```

use opsclaw_core::tool::ToolCall;

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const THOUGHT: &str = "Thought:";

/// Markers after which an action input is considered finished.
const INPUT_TERMINATORS: [&str; 3] = ["\nObservation:", "\nThought:", "\nFinal Answer:"];

/// What the model decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput {
    /// Call a tool, then think again.
    Action { thought: String, call: ToolCall },
    /// Stop and answer.
    FinalAnswer { thought: String, answer: String },
}

impl ParsedOutput {
    pub fn thought(&self) -> &str {
        match self {
            Self::Action { thought, .. } | Self::FinalAnswer { thought, .. } => thought,
        }
    }
}

/// Model output that is neither an action nor a final answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The observation fed back to the model so it can correct itself.
    pub fn observation(&self) -> String {
        format!(
            "Invalid Format: {}. Reply with 'Action:' and 'Action Input:' lines to use a tool, \
             or with 'Final Answer:' to answer.",
            self.reason
        )
    }
}

/// Parse one model reply.
///
/// When both an action and a final answer are present, whichever comes
/// first wins.
pub fn parse(text: &str) -> Result<ParsedOutput, ParseError> {
    let final_at = text.find(FINAL_ANSWER);
    let action_at = text.find(ACTION);

    match (action_at, final_at) {
        (Some(action), Some(answer)) if action < answer => parse_action(text, action),
        (_, Some(answer)) => {
            let answer_text = text[answer + FINAL_ANSWER.len()..].trim();
            if answer_text.is_empty() {
                return Err(ParseError::new("'Final Answer:' is empty"));
            }
            Ok(ParsedOutput::FinalAnswer {
                thought: thought_before(text, answer),
                answer: answer_text.to_string(),
            })
        }
        (Some(action), None) => parse_action(text, action),
        (None, None) => Err(ParseError::new(
            "no 'Action:' or 'Final Answer:' found in the reply",
        )),
    }
}

fn parse_action(text: &str, action_at: usize) -> Result<ParsedOutput, ParseError> {
    let after_action = &text[action_at + ACTION.len()..];
    let Some(input_offset) = after_action.find(ACTION_INPUT) else {
        return Err(ParseError::new("'Action:' must be followed by 'Action Input:'"));
    };

    let tool_name = strip_wrapping(after_action[..input_offset].trim());
    if tool_name.is_empty() {
        return Err(ParseError::new("'Action:' names no tool"));
    }
    if tool_name.contains('\n') {
        return Err(ParseError::new("'Action:' must name a single tool on one line"));
    }

    let mut input = &after_action[input_offset + ACTION_INPUT.len()..];
    if let Some(end) = INPUT_TERMINATORS.iter().filter_map(|m| input.find(m)).min() {
        input = &input[..end];
    }

    Ok(ParsedOutput::Action {
        thought: thought_before(text, action_at),
        call: ToolCall::new(tool_name, strip_wrapping(input.trim())),
    })
}

/// Text before `end`, minus a leading `Thought:`.
fn thought_before(text: &str, end: usize) -> String {
    let before = text[..end].trim();
    before
        .strip_prefix(THOUGHT)
        .unwrap_or(before)
        .trim()
        .to_string()
}

/// Remove code fences, backticks and quotes around a value.
fn strip_wrapping(value: &str) -> &str {
    let mut value = value.trim();

    if let Some(fenced) = value.strip_prefix("```").and_then(|v| v.strip_suffix("```")) {
        // Drop a language tag such as ```json
        value = match fenced.split_once('\n') {
            Some((tag, body)) if !tag.trim().contains(' ') => body,
            _ => fenced,
        };
        value = value.trim();
    }

    for quote in ['`', '"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            let inner = &value[1..value.len() - 1];
            // `"a", "b"` is a list, not a quoted string
            if !inner.contains(quote) {
                value = inner.trim();
            }
        }
    }
    value
}
