//! Session store: the shared table of live sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use termrun_core::{Error, Result, SessionId};

use crate::dispatch::SurfaceId;
use crate::session::Session;

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self { max_sessions: 32 }
    }
}

/// Concurrency-safe table of sessions.
///
/// Ids come from a counter that is never rewound, so an id is never handed
/// out twice even after its session is deleted.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU64,
    config: SessionStoreConfig,
}

impl SessionStore {
    /// Create a new store with default configuration.
    pub fn new() -> Self {
        Self::with_config(SessionStoreConfig::default())
    }

    /// Create a new store with custom configuration.
    pub fn with_config(config: SessionStoreConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Allocate a new session in the Created phase.
    pub fn create(&self, surface: Option<SurfaceId>) -> Result<Arc<Session>> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions.len() >= self.config.max_sessions {
            return Err(Error::SessionLimitReached(self.config.max_sessions));
        }

        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::new(id, surface));
        sessions.insert(id, Arc::clone(&session));

        debug!(session = %id, ?surface, "Session created");
        Ok(session)
    }

    /// Get a session by ID.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Get a session by ID, or `SessionNotFound`.
    pub fn require(&self, id: SessionId) -> Result<Arc<Session>> {
        self.get(id).ok_or(Error::SessionNotFound(id))
    }

    /// Remove a session, killing its process first if one is running.
    pub fn delete(&self, id: SessionId) -> Option<Arc<Session>> {
        let session = self.get(id)?;
        if session.kill_active() {
            info!(session = %id, "Killed running process of deleted session");
        }

        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!(session = %id, "Session deleted");
        }
        removed
    }

    /// All sessions, ordered by id.
    pub fn list(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.id());
        sessions
    }

    /// Delete every session, returning the removed ones.
    pub fn close_all(&self) -> Vec<Arc<Session>> {
        let ids: Vec<SessionId> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();

        ids.into_iter().filter_map(|id| self.delete(id)).collect()
    }

    /// Get the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
