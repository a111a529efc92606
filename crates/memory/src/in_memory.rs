//! In-memory conversation store: one per session.

use async_trait::async_trait;
use opsclaw_core::error::MemoryError;
use opsclaw_core::memory::{ConversationTurn, MemoryStore};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stores the turns of one session in a Vec.
///
/// Writers are serialized by the lock; readers run concurrently.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    turns: Arc<RwLock<Vec<ConversationTurn>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, turn: ConversationTurn) -> Result<(), MemoryError> {
        self.turns.write().await.push(turn);
        Ok(())
    }

    async fn append_all(&self, turns: Vec<ConversationTurn>) -> Result<(), MemoryError> {
        self.turns.write().await.extend(turns);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ConversationTurn>, MemoryError> {
        Ok(self.turns.read().await.clone())
    }

    async fn recent(&self, k: usize) -> Result<Vec<ConversationTurn>, MemoryError> {
        let turns = self.turns.read().await;
        let start = turns.len().saturating_sub(k);
        Ok(turns[start..].to_vec())
    }

    async fn len(&self) -> Result<usize, MemoryError> {
        Ok(self.turns.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.turns.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsclaw_core::memory::TurnRole;

    #[tokio::test]
    async fn history_preserves_insertion_order() {
        let mem = InMemoryStore::new();
        for i in 0..10 {
            let turn = if i % 2 == 0 {
                ConversationTurn::user(format!("question {i}"))
            } else {
                ConversationTurn::assistant(format!("answer {i}"))
            };
            mem.append(turn).await.unwrap();
        }

        let history = mem.history().await.unwrap();
        assert_eq!(history.len(), 10);
        for (i, turn) in history.iter().enumerate() {
            assert!(turn.content.ends_with(&i.to_string()));
            let expected = if i % 2 == 0 { TurnRole::User } else { TurnRole::Assistant };
            assert_eq!(turn.role, expected);
        }
    }

    #[tokio::test]
    async fn recent_returns_tail_in_order() {
        let mem = InMemoryStore::new();
        for i in 0..5 {
            mem.append(ConversationTurn::user(format!("m{i}"))).await.unwrap();
        }
        let tail: Vec<_> = mem
            .recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(tail, vec!["m3", "m4"]);
        assert_eq!(mem.recent(50).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn clear_all() {
        let mem = InMemoryStore::new();
        mem.append(ConversationTurn::user("Entry 1")).await.unwrap();
        mem.append(ConversationTurn::assistant("Entry 2")).await.unwrap();
        assert_eq!(mem.len().await.unwrap(), 2);

        mem.clear().await.unwrap();
        assert_eq!(mem.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let mem = InMemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..20 {
            let mem = mem.clone();
            handles.push(tokio::spawn(async move {
                mem.append(ConversationTurn::user(format!("t{i}"))).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(mem.len().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn exchanges_are_never_interleaved() {
        let mem = InMemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..10 {
            let mem = mem.clone();
            handles.push(tokio::spawn(async move {
                mem.append_all(vec![
                    ConversationTurn::user(format!("q{i}")),
                    ConversationTurn::assistant(format!("a{i}")),
                ])
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let history = mem.history().await.unwrap();
        assert_eq!(history.len(), 20);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, TurnRole::User);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }
}
