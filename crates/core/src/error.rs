//! Error types for the OpsClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; the top-level [`Error`]
//! wraps them for callers that only need a single error channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all OpsClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Credential errors ---
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the reasoning backend. The agent loop treats every variant
/// as "model unavailable"; the variants exist for diagnostics.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

/// Machine-readable classification of a tool failure.
///
/// The human-readable text travels in [`ToolError::message`]; the kind
/// lets callers and tests tell failure classes apart without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The model supplied input the tool could not parse or validate.
    InvalidInput,
    /// The external service answered with an error (4xx/5xx, access denied, ...).
    Remote,
    /// The external service could not be reached.
    Transport,
    /// The invocation exceeded its time allowance.
    Timeout,
    /// The requested tool does not exist in the registry.
    UnknownTool,
    /// The invocation was cancelled before it completed.
    Cancelled,
    /// Anything else.
    Other,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Remote => "remote",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::UnknownTool => "unknown_tool",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed tool invocation.
///
/// Displays as the bare message so that the loop can feed
/// `"Error: <message>"` back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidInput, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Remote, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transport, message)
    }

    pub fn timeout(tool_name: &str, timeout_ms: u64) -> Self {
        Self::new(
            ToolErrorKind::Timeout,
            format!("{tool_name} timed out after {timeout_ms}ms"),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Other, message)
    }
}

/// Failures of the tool registry itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("{name} is not a valid tool, try one of [{available}].")]
    UnknownTool { name: String, available: String },
}

#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Credential {credential} is missing parameter {param}")]
    MissingParam { credential: String, param: String },

    #[error("Credential backend failed: {0}")]
    Backend(String),
}
