//! Session persistence boundary.
//!
//! The remote data store is an external collaborator. [`SessionStore`]
//! describes the calls the session manager makes against it;
//! [`InMemorySessionStore`] is a process-local implementation used by the
//! binary when no remote store is configured, and by tests (it can be told
//! to fail a number of upcoming calls).

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use canopy_types::{CultivationSession, SessionId, VarietyId};
use chrono::{DateTime, Utc};

/// Errors returned by a session store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or timed out. Worth retrying.
    #[error("session store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The session does not exist.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The store refused the write.
    #[error("session store rejected the request: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },
}

impl StoreError {
    /// Whether a retry may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Fields of a session that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    /// Display name.
    pub name: String,
    /// Day zero.
    pub start_date: DateTime<Utc>,
    /// Varieties in scope for harvest estimation.
    pub selected_varieties: BTreeSet<VarietyId>,
}

/// Remote storage of cultivation sessions.
pub trait SessionStore: Send + Sync {
    /// Store a new active session and return the id the store assigned.
    fn create_session(
        &self,
        draft: SessionDraft,
    ) -> impl Future<Output = Result<SessionId, StoreError>> + Send;

    /// Fetch one session.
    fn get_session_by_id(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<CultivationSession, StoreError>> + Send;

    /// Overwrite a stored session.
    fn update_session(
        &self,
        session: CultivationSession,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Mark a session ended at `ended_at`.
    fn end_session(
        &self,
        id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a session.
    fn delete_session(&self, id: SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// List every stored session.
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<CultivationSession>, StoreError>> + Send;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    /// Stored sessions.
    sessions: Mutex<BTreeMap<SessionId, CultivationSession>>,
    /// Number of upcoming calls that will fail with `Unavailable`.
    failures_pending: AtomicU32,
}

impl InMemorySessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::Release);
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map_or(0, |s| s.len())
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let consumed = self
            .failures_pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(StoreError::Unavailable {
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }

    fn with_sessions<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<SessionId, CultivationSession>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_available()?;
        let mut guard = self.sessions.lock().map_err(|_poisoned| StoreError::Unavailable {
            message: "session map poisoned".to_owned(),
        })?;
        f(&mut guard)
    }
}

impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, draft: SessionDraft) -> Result<SessionId, StoreError> {
        self.with_sessions(|sessions| {
            let id = SessionId::new();
            sessions.insert(
                id,
                CultivationSession {
                    id,
                    name: draft.name,
                    start_date: draft.start_date,
                    end_date: None,
                    is_active: true,
                    selected_varieties: draft.selected_varieties,
                },
            );
            Ok(id)
        })
    }

    async fn get_session_by_id(&self, id: SessionId) -> Result<CultivationSession, StoreError> {
        self.with_sessions(|sessions| sessions.get(&id).cloned().ok_or(StoreError::NotFound(id)))
    }

    async fn update_session(&self, session: CultivationSession) -> Result<(), StoreError> {
        self.with_sessions(|sessions| {
            let stored = sessions
                .get_mut(&session.id)
                .ok_or(StoreError::NotFound(session.id))?;
            *stored = session;
            Ok(())
        })
    }

    async fn end_session(&self, id: SessionId, ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_sessions(|sessions| {
            let stored = sessions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            stored.is_active = false;
            stored.end_date = Some(ended_at);
            Ok(())
        })
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StoreError> {
        self.with_sessions(|sessions| {
            sessions
                .remove(&id)
                .map(|_removed| ())
                .ok_or(StoreError::NotFound(id))
        })
    }

    async fn list_sessions(&self) -> Result<Vec<CultivationSession>, StoreError> {
        self.with_sessions(|sessions| Ok(sessions.values().cloned().collect()))
    }
}
