//! Session clock: the single active cultivation session that anchors day
//! zero for every automatic transition.
//!
//! The clock is passed explicitly to the reconciler and the transfer
//! protocol instead of being read from ambient state. When it holds no
//! active session, automatic advancement is a no-op.
//!
//! "Now" comes from a [`TimeSource`], so the scheduler can be driven by a
//! fixed instant in tests.

use std::sync::Mutex;

use canopy_types::CultivationSession;
use chrono::{DateTime, Utc};
use tracing::info;

/// Seconds in one elapsed day.
const SECONDS_PER_DAY: i64 = 86_400;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// An ended session cannot become the current session.
    #[error("session {0} is not active")]
    SessionNotActive(canopy_types::SessionId),
}

/// Whole days from `start` to `now`, floored.
///
/// An instant before `start` yields a negative count.
pub fn elapsed_days(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(start)
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY)
}

/// Holder of the current cultivation session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionClock {
    /// The session driving automatic transitions, if any.
    current: Option<CultivationSession>,
}

impl SessionClock {
    /// A clock with no current session.
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// A clock anchored on `session`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::SessionNotActive`] if the session has ended.
    pub fn with_session(session: CultivationSession) -> Result<Self, ClockError> {
        let mut clock = Self::new();
        clock.set_current_session(session)?;
        Ok(clock)
    }

    /// Make `session` the current session.
    ///
    /// Already-advanced plant states are not rewritten by a switch.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::SessionNotActive`] if the session has ended.
    pub fn set_current_session(&mut self, session: CultivationSession) -> Result<(), ClockError> {
        if !session.is_active {
            return Err(ClockError::SessionNotActive(session.id));
        }
        info!(
            session_id = %session.id,
            name = %session.name,
            start_date = %session.start_date,
            "Current session set"
        );
        self.current = Some(session);
        Ok(())
    }

    /// Drop the current session. Returns the session that was current.
    pub fn clear(&mut self) -> Option<CultivationSession> {
        self.current.take()
    }

    /// The current session, whether or not it is still active.
    pub const fn current(&self) -> Option<&CultivationSession> {
        self.current.as_ref()
    }

    /// The session anchoring automatic transitions: the current session,
    /// only while it is active.
    pub fn anchor(&self) -> Option<&CultivationSession> {
        self.current.as_ref().filter(|s| s.is_active)
    }

    /// Elapsed days since the anchor's start date, or `None` with no
    /// active session.
    pub fn elapsed_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.anchor().map(|s| elapsed_days(s.start_date, now))
    }
}

/// Source of the current instant.
pub trait TimeSource: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable instant, for tests and replays.
#[derive(Debug)]
pub struct ManualTime {
    /// The instant returned by [`TimeSource::now`].
    now: Mutex<DateTime<Utc>>,
}

impl ManualTime {
    /// Start at `now`.
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Move forward by `days` whole days.
    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.now.lock() {
            let current = *guard;
            *guard = chrono::TimeDelta::try_days(days)
                .and_then(|delta| current.checked_add_signed(delta))
                .unwrap_or(current);
        }
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }
}
