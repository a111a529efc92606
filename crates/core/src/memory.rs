//! Memory trait: session-scoped conversation history.
//!
//! The memory store holds the turns of one session (user inputs and the
//! final answers the agent produced for them). The agent loop reads it
//! before a task and appends to it after a task is answered; tools never
//! touch it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The end user
    User,
    /// The agent's final answer
    Assistant,
}

impl TurnRole {
    /// The speaker label used when rendering history into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "Human",
            Self::Assistant => "AI",
        }
    }
}

/// A single turn in a session's conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The conversation store of one session.
///
/// Implementations must preserve insertion order exactly and serialize
/// writers while allowing concurrent readers.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append a turn at the end of the history.
    async fn append(&self, turn: ConversationTurn) -> Result<(), MemoryError>;

    /// Append several turns so that no other writer interleaves with them.
    ///
    /// The default appends one by one; stores with a single lock should
    /// override it.
    async fn append_all(&self, turns: Vec<ConversationTurn>) -> Result<(), MemoryError> {
        for turn in turns {
            self.append(turn).await?;
        }
        Ok(())
    }

    /// Every turn, oldest first.
    async fn history(&self) -> Result<Vec<ConversationTurn>, MemoryError>;

    /// The last `k` turns, oldest first.
    async fn recent(&self, k: usize) -> Result<Vec<ConversationTurn>, MemoryError> {
        let history = self.history().await?;
        let skip = history.len().saturating_sub(k);
        Ok(history.into_iter().skip(skip).collect())
    }

    /// Number of stored turns.
    async fn len(&self) -> Result<usize, MemoryError>;

    /// Drop every turn.
    async fn clear(&self) -> Result<(), MemoryError>;
}
