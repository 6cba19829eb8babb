//! In-process session store
//!
//! Information Hiding:
//! - HashMap storage structure hidden from callers
//! - Each session sits behind its own mutex so unrelated conversations never
//!   contend beyond the brief map lookup
//! - Creation happens under the map's write lock, so one id maps to exactly
//!   one session even when first contacts race

use super::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Stable key for one end user's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<ConversationId, SessionHandle>>,
    idle_timeout: Duration,
    history_capacity: usize,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, history_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            history_capacity,
        }
    }

    /// Session for `id`, created in automated mode with empty history on first reference.
    pub async fn get_or_create(&self, id: &ConversationId) -> SessionHandle {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(conversation = %id, "[SessionStore] Created session");
            Arc::new(Mutex::new(Session::new(
                self.idle_timeout,
                self.history_capacity,
            )))
        });
        Arc::clone(session)
    }

    /// Point-in-time view of every session. Sessions created after the call
    /// are not included.
    pub async fn all_sessions(&self) -> impl Iterator<Item = (ConversationId, SessionHandle)> {
        let sessions = self.sessions.read().await;
        let snapshot: Vec<(ConversationId, SessionHandle)> = sessions
            .iter()
            .map(|(id, session)| (id.clone(), Arc::clone(session)))
            .collect();
        snapshot.into_iter()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
