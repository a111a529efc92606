//! Conversation memory for OpsClaw.
//!
//! History lives in process memory only and is scoped to a session.

pub mod in_memory;
pub mod session_store;

pub use in_memory::InMemoryStore;
pub use session_store::SessionStore;
