//! Session lifecycle against the remote store.
//!
//! [`SessionManager`] performs session writes through a [`SessionStore`]
//! and keeps the engine's current session in step with them. Every remote
//! call goes through a bounded retry with linear backoff; only transient
//! failures are retried. A call that still fails raises an error alert and
//! leaves the engine untouched, so no session is ever current without
//! having been stored first.
//!
//! The engine side is reached through [`SessionHost`]: either the
//! [`Engine`] itself, or an [`EngineHandle`] while the scheduler owns it.
//!
//! An ended session is history. Edits and repeated ends are refused before
//! anything is written.

use std::future::{self, Future};
use std::time::Duration;

use canopy_types::{CultivationSession, SessionId};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::alerts::{Alert, AlertSink, AlertType};
use crate::command::EngineHandle;
use crate::config::PersistenceConfig;
use crate::engine::{Engine, EngineError, TickSummary};
use crate::store::{SessionDraft, SessionStore, StoreError};

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The store call failed, after retries where the failure was transient.
    #[error("failed to {operation} after {attempts} attempt(s): {source}")]
    Store {
        /// What was being attempted.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// The last store error.
        source: StoreError,
    },

    /// An edit tried to move the current session's start date later, which
    /// would put plants behind the phase they already reached.
    #[error("start date of current session {id} cannot move later ({current} -> {requested})")]
    StartDateMovedLater {
        /// The session being edited.
        id: SessionId,
        /// Start date in effect.
        current: DateTime<Utc>,
        /// Start date requested.
        requested: DateTime<Utc>,
    },

    /// A session needs a name.
    #[error("session name must not be empty")]
    EmptyName,

    /// The session has ended and can no longer change.
    #[error("session {0} has ended")]
    SessionEnded(SessionId),

    /// The engine refused the session.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },
}

/// The engine side of session changes.
pub trait SessionHost: Send {
    /// A copy of the current session.
    fn current_session(
        &mut self,
    ) -> impl Future<Output = Result<Option<CultivationSession>, EngineError>> + Send;

    /// Make `session` current and tick at `now`.
    fn make_current(
        &mut self,
        session: CultivationSession,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<TickSummary, EngineError>> + Send;

    /// Clear the current session if it is `id`.
    fn clear_if_current(
        &mut self,
        id: SessionId,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Deliver an alert.
    fn raise(&mut self, alert: Alert) -> impl Future<Output = ()> + Send;
}

impl<A: AlertSink + Send> SessionHost for Engine<A> {
    fn current_session(
        &mut self,
    ) -> impl Future<Output = Result<Option<CultivationSession>, EngineError>> + Send {
        future::ready(Ok(self.clock().current().cloned()))
    }

    fn make_current(
        &mut self,
        session: CultivationSession,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<TickSummary, EngineError>> + Send {
        future::ready(self.set_current_session(session, now))
    }

    fn clear_if_current(
        &mut self,
        id: SessionId,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        self.clear_session_if(id);
        future::ready(Ok(()))
    }

    fn raise(&mut self, alert: Alert) -> impl Future<Output = ()> + Send {
        self.sink_mut().notify(alert);
        future::ready(())
    }
}

impl SessionHost for EngineHandle {
    async fn current_session(&mut self) -> Result<Option<CultivationSession>, EngineError> {
        EngineHandle::current_session(self).await
    }

    async fn make_current(
        &mut self,
        session: CultivationSession,
        now: DateTime<Utc>,
    ) -> Result<TickSummary, EngineError> {
        self.set_current_session(session, now).await
    }

    async fn clear_if_current(&mut self, id: SessionId) -> Result<(), EngineError> {
        self.clear_session_if(id).await.map(|_cleared| ())
    }

    async fn raise(&mut self, alert: Alert) {
        if let Err(err) = self.raise_alert(alert).await {
            warn!(error = %err, "Alert dropped");
        }
    }
}

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, including the first. Never zero.
    pub max_attempts: u32,
    /// Delay after the first failure; the n-th retry waits `n * backoff`.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy with at least one attempt.
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            backoff,
        }
    }

    /// Build from the persistence section of the config.
    pub const fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }

    /// Delay before retrying after failed attempt number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PersistenceConfig::default())
    }
}

/// Session writes, with the engine kept in step.
#[derive(Debug)]
pub struct SessionManager<S> {
    /// Remote store.
    store: S,
    /// Retry behaviour for every store call.
    retry: RetryPolicy,
}

impl<S: SessionStore> SessionManager<S> {
    /// Create a manager over `store`.
    pub const fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The retry policy in use.
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Store a new session. It does not become current.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyName`] for a blank name or
    /// [`SessionError::Store`] if the store call fails.
    pub async fn create_session<H: SessionHost>(
        &self,
        host: &mut H,
        draft: SessionDraft,
    ) -> Result<SessionId, SessionError> {
        if draft.name.trim().is_empty() {
            return Err(SessionError::EmptyName);
        }
        let id = self
            .with_retry("create session", host, move || {
                self.store.create_session(draft.clone())
            })
            .await?;
        info!(session_id = %id, "Session created");
        Ok(id)
    }

    /// Create a session and make it current.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever step failed. If the session was
    /// created but could not be fetched back, it stays stored but does not
    /// become current.
    pub async fn start_session<H: SessionHost>(
        &self,
        host: &mut H,
        draft: SessionDraft,
        now: DateTime<Utc>,
    ) -> Result<TickSummary, SessionError> {
        let id = self.create_session(host, draft).await?;
        self.activate_session(host, id, now).await
    }

    /// Fetch a stored session and make it current. Runs a tick immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the fetch fails, or
    /// [`SessionError::Engine`] if the session has ended.
    pub async fn activate_session<H: SessionHost>(
        &self,
        host: &mut H,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<TickSummary, SessionError> {
        let session = self
            .with_retry("load session", host, move || {
                self.store.get_session_by_id(id)
            })
            .await?;
        let summary = host.make_current(session, now).await?;
        info!(
            session_id = %id,
            elapsed_days = ?summary.elapsed_days,
            transitions = summary.transitions.len(),
            transfers = summary.transfers.len(),
            "Session activated"
        );
        Ok(summary)
    }

    /// Overwrite a stored session. If it is the current session the engine
    /// picks up the new values and ticks; an edit that deactivates it clears
    /// the current session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionEnded`] if the stored session has
    /// ended, [`SessionError::StartDateMovedLater`] if the edit would move
    /// the current session's start later, [`SessionError::EmptyName`] for a
    /// blank name, or [`SessionError::Store`] if a store call fails.
    pub async fn update_session<H: SessionHost>(
        &self,
        host: &mut H,
        session: CultivationSession,
        now: DateTime<Utc>,
    ) -> Result<Option<TickSummary>, SessionError> {
        if session.name.trim().is_empty() {
            return Err(SessionError::EmptyName);
        }
        self.ensure_open(host, session.id).await?;

        let current = host
            .current_session()
            .await?
            .filter(|c| c.id == session.id);
        let is_current = current.is_some();
        if let Some(current) = current.filter(|c| session.start_date > c.start_date) {
            return Err(SessionError::StartDateMovedLater {
                id: session.id,
                current: current.start_date,
                requested: session.start_date,
            });
        }

        let stored = session.clone();
        self.with_retry("update session", host, move || {
            self.store.update_session(stored.clone())
        })
        .await?;
        info!(session_id = %session.id, "Session updated");

        if !is_current {
            return Ok(None);
        }
        if session.is_active {
            Ok(Some(host.make_current(session, now).await?))
        } else {
            host.clear_if_current(session.id).await?;
            Ok(None)
        }
    }

    /// Mark a session ended. Ending the current session clears it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionEnded`] if it has already ended, or
    /// [`SessionError::Store`] if a store call fails.
    pub async fn end_session<H: SessionHost>(
        &self,
        host: &mut H,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.ensure_open(host, id).await?;
        self.with_retry("end session", host, move || self.store.end_session(id, now))
            .await?;
        info!(session_id = %id, "Session ended");
        host.clear_if_current(id).await?;
        Ok(())
    }

    /// Delete a stored session. Deleting the current session clears it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the delete fails.
    pub async fn delete_session<H: SessionHost>(
        &self,
        host: &mut H,
        id: SessionId,
    ) -> Result<(), SessionError> {
        self.with_retry("delete session", host, move || {
            self.store.delete_session(id)
        })
        .await?;
        info!(session_id = %id, "Session deleted");
        host.clear_if_current(id).await?;
        Ok(())
    }

    /// Every stored session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the listing fails.
    pub async fn list_sessions<H: SessionHost>(
        &self,
        host: &mut H,
    ) -> Result<Vec<CultivationSession>, SessionError> {
        self.with_retry("list sessions", host, move || self.store.list_sessions())
            .await
    }

    /// Fetch the stored session and refuse it if it has ended.
    async fn ensure_open<H: SessionHost>(
        &self,
        host: &mut H,
        id: SessionId,
    ) -> Result<(), SessionError> {
        let stored = self
            .with_retry("load session", host, move || {
                self.store.get_session_by_id(id)
            })
            .await?;
        if !stored.is_active || stored.end_date.is_some() {
            warn!(session_id = %id, "Ended session cannot change");
            return Err(SessionError::SessionEnded(id));
        }
        Ok(())
    }

    async fn with_retry<H, T, F, Fut>(
        &self,
        operation: &'static str,
        host: &mut H,
        mut call: F,
    ) -> Result<T, SessionError>
    where
        H: SessionHost,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(operation, attempts = attempt, error = %err, "Store call failed");
                    host.raise(Alert::new(
                        AlertType::Error,
                        format!("Failed to {operation}: {err}"),
                    ))
                    .await;
                    return Err(SessionError::Store {
                        operation,
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}
