//! Session registry: maps session ids to their conversation stores.
//!
//! Stores are created on first use. The number of live sessions is
//! bounded; when a new session would exceed the bound, the session that
//! was used least recently is dropped along with its history.

use opsclaw_core::memory::MemoryStore;
use opsclaw_core::session::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::in_memory::InMemoryStore;

struct Slot {
    store: Arc<InMemoryStore>,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    slots: HashMap<SessionId, Slot>,
    clock: u64,
}

/// Owns the memory store of every live session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<Sessions>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Sessions::default())),
            max_sessions: max_sessions.max(1),
        }
    }

    /// The store for `id`, created empty if the session is new.
    pub async fn get_or_create(&self, id: &SessionId) -> Arc<dyn MemoryStore> {
        let mut sessions = self.inner.lock().await;
        sessions.clock += 1;
        let now = sessions.clock;

        if let Some(slot) = sessions.slots.get_mut(id) {
            slot.last_used = now;
            return slot.store.clone();
        }

        if sessions.slots.len() >= self.max_sessions {
            let oldest = sessions
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!(session = %oldest, "Evicting least recently used session");
                sessions.slots.remove(&oldest);
            }
        }

        let store = Arc::new(InMemoryStore::new());
        sessions.slots.insert(
            id.clone(),
            Slot {
                store: store.clone(),
                last_used: now,
            },
        );
        store
    }

    /// The store for `id` if the session exists. Does not refresh its age.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<dyn MemoryStore>> {
        let sessions = self.inner.lock().await;
        sessions
            .slots
            .get(id)
            .map(|slot| slot.store.clone() as Arc<dyn MemoryStore>)
    }

    /// Drop a session and its history. Returns whether it existed.
    pub async fn remove(&self, id: &SessionId) -> bool {
        self.inner.lock().await.slots.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(1024)
    }
}
