//! The OpsClaw agent: a ReAct loop over tools.
//!
//! The agent follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Render** the prompt (system prefix, tool catalogue, conversation,
//!    question, scratchpad)
//! 2. **Ask** the model for its next step
//! 3. **If an action**: run the tool, record the observation, loop back to 2
//! 4. **If a final answer**: save the exchange to memory and stop
//!
//! The loop also stops on cancellation, on an exhausted step budget, when
//! the model is unavailable, or when its output stays unparsable.
//! [`AgentRuntime`] wraps the loop with sessions, observers and
//! cancellation by task id.

pub mod emitter;
pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod runtime;
pub mod scratchpad;
pub mod toolset;

#[cfg(test)]
mod test_helpers;

pub use emitter::{SessionHub, StepEmitter, TaskEvent};
pub use loop_runner::{AgentLoop, TaskContext, TaskOutcome, Terminal};
pub use parser::{ParseError, ParsedOutput};
pub use runtime::{AgentError, AgentRuntime, RunOptions, StartedTask};
pub use scratchpad::{Scratchpad, ScratchpadEntry};
pub use toolset::{StaticTools, TaskTools, ToolSource, ToolSourceError, ToolkitSource};
