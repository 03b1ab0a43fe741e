//! Session Manager (spec.md §4.2): a lock-guarded map of channel id to
//! session, grounded on the teacher's `SessionTracker` (a single shared
//! map behind `RwLock`, entries individually lockable).

use super::{CircuitBreaker, StreamSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A session and its circuit breaker, grouped so both are dropped together
/// when the channel is torn down.
pub struct SessionEntry {
    pub session: Mutex<StreamSession>,
    pub breaker: Mutex<CircuitBreaker>,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<SessionEntry>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, channel_id: Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(&channel_id).cloned()
    }

    /// Returns the existing entry for `channel_id`, or inserts one built
    /// from `make` if absent. `make` is only invoked on the miss path.
    pub async fn get_or_insert_with<F>(&self, channel_id: Uuid, make: F) -> Arc<SessionEntry>
    where
        F: FnOnce() -> StreamSession,
    {
        if let Some(existing) = self.get(channel_id).await {
            return existing;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(channel_id)
            .or_insert_with(|| {
                Arc::new(SessionEntry {
                    session: Mutex::new(make()),
                    breaker: Mutex::new(CircuitBreaker::new()),
                })
            })
            .clone()
    }

    pub async fn remove(&self, channel_id: Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.write().await.remove(&channel_id)
    }

    pub async fn channel_ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
