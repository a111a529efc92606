//! Scratchpad: the record of one task's reasoning.
//!
//! Holds every Thought/Action/Observation of the running task in order and
//! renders them back into the prompt, so the model sees what it already
//! tried. A scratchpad lives exactly as long as one task and is never
//! written to conversation memory.

use opsclaw_core::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// One completed reasoning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub thought: String,

    /// `None` when the model's output could not be parsed; `thought` then
    /// holds the raw output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolCall>,

    pub observation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool call and what it returned.
    pub fn record(&mut self, thought: &str, action: ToolCall, observation: &str) {
        self.entries.push(ScratchpadEntry {
            thought: thought.to_string(),
            action: Some(action),
            observation: observation.to_string(),
        });
    }

    /// Record output that was neither an action nor an answer.
    pub fn record_invalid(&mut self, raw_output: &str, observation: &str) {
        self.entries.push(ScratchpadEntry {
            thought: raw_output.trim().to_string(),
            action: None,
            observation: observation.to_string(),
        });
    }

    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the steps in the ReAct text format.
    ///
    /// The prompt already ends with `Thought:`, so the first step continues
    /// that line and the rendering again ends with `Thought:` for the next
    /// model turn.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            match &entry.action {
                Some(call) => {
                    out.push_str(&format!(
                        " {}\nAction: {}\nAction Input: {}\n",
                        entry.thought, call.tool_name, call.raw_input
                    ));
                }
                None => {
                    out.push_str(&format!(" {}\n", entry.thought));
                }
            }
            out.push_str(&format!("Observation: {}\nThought:", entry.observation));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scratchpad_renders_nothing() {
        let pad = Scratchpad::new();
        assert!(pad.is_empty());
        assert_eq!(pad.render(), "");
    }

    #[test]
    fn renders_steps_in_order() {
        let mut pad = Scratchpad::new();
        pad.record("I need the list", ToolCall::new("list-buckets", ""), "1. logs");
        pad.record("Now the size", ToolCall::new("get-bucket-size", "logs"), "Size of the bucket logs: 5 B");

        let text = pad.render();
        assert_eq!(pad.len(), 2);
        let first = text.find("list-buckets").unwrap();
        let second = text.find("get-bucket-size").unwrap();
        assert!(first < second);
        assert!(text.starts_with(" I need the list\nAction: list-buckets\nAction Input: \nObservation: 1. logs\nThought:"));
        assert!(text.ends_with("Observation: Size of the bucket logs: 5 B\nThought:"));
    }

    #[test]
    fn invalid_output_is_echoed_with_its_correction() {
        let mut pad = Scratchpad::new();
        pad.record_invalid("  just chatting  ", "Invalid Format: missing action");
        assert_eq!(
            pad.render(),
            " just chatting\nObservation: Invalid Format: missing action\nThought:"
        );
        assert!(pad.entries()[0].action.is_none());
    }

    #[test]
    fn serializes_for_debugging() {
        let mut pad = Scratchpad::new();
        pad.record("t", ToolCall::new("view-ticket", "7"), "ok");
        let json = serde_json::to_value(&pad).unwrap();
        assert_eq!(json["entries"][0]["action"]["tool_name"], "view-ticket");
    }
}
