//! Step events: the observable record of one task.
//!
//! Every transition of the agent loop produces exactly one [`StepEvent`].
//! The same values are streamed to live observers and collected into the
//! task's trace, so they serialize as a tagged JSON object
//! (`{"type": "action", "tool": ..., "input": ...}`).

use serde::{Deserialize, Serialize};

use crate::error::ToolErrorKind;

/// Why a task ended without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The reasoning driver failed or timed out
    ModelUnavailable,
    /// The model kept producing output that is neither an action nor an answer
    UnparsableOutput,
    /// The step budget ran out before a final answer
    StepBudgetExceeded,
    /// The caller cancelled the task
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelUnavailable => "model_unavailable",
            Self::UnparsableOutput => "unparsable_output",
            Self::StepBudgetExceeded => "step_budget_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observable step of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    /// The model's reasoning before it acts
    Thought { text: String },

    /// The model chose a tool
    Action { tool: String, input: String },

    /// What the tool (or the loop, for recoverable failures) reported back
    Observation {
        text: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<ToolErrorKind>,
    },

    /// The model produced its answer
    FinalAnswer { text: String },

    /// The task failed; always the last event of its trace
    Error { kind: FailureKind, message: String },
}

impl StepEvent {
    pub fn thought(text: impl Into<String>) -> Self {
        Self::Thought { text: text.into() }
    }

    pub fn action(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self::Action {
            tool: tool.into(),
            input: input.into(),
        }
    }

    pub fn observation(text: impl Into<String>) -> Self {
        Self::Observation {
            text: text.into(),
            is_error: false,
            error_kind: None,
        }
    }

    /// An observation describing a recoverable failure.
    pub fn failed_observation(text: impl Into<String>, kind: Option<ToolErrorKind>) -> Self {
        Self::Observation {
            text: text.into(),
            is_error: true,
            error_kind: kind,
        }
    }

    pub fn final_answer(text: impl Into<String>) -> Self {
        Self::FinalAnswer { text: text.into() }
    }

    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns the event type name as a static string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::FinalAnswer { .. } => "final_answer",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends a trace.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. } | Self::Error { .. })
    }
}
