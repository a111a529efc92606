//! # OpsClaw Core
//!
//! Domain types, traits, and error definitions for the OpsClaw tool-using
//! agent engine. This crate has **no framework dependencies**; it defines
//! the domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here. Implementations live
//! in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod credential;
pub mod error;
pub mod event;
pub mod memory;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use credential::{CredentialResolver, Credentials};
pub use error::{Error, Result};
pub use event::{FailureKind, StepEvent};
pub use memory::{ConversationTurn, MemoryStore, TurnRole};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use session::{SessionId, TaskId};
pub use tool::{Tool, ToolCall, ToolDescription, ToolInput, ToolRegistry};
