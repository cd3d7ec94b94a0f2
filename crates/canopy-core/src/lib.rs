//! Lifecycle engine, session clock, and scheduler for the Canopy
//! cultivation tracker.
//!
//! This crate advances plants through their lifecycle phases from the
//! current cultivation session's start date, moves flowering plants out of
//! growth rooms, and persists sessions through a retrying store boundary.
//!
//! # Modules
//!
//! - [`alerts`] -- Alert model, bounded [`AlertStore`] and the
//!   [`AlertSink`] seam.
//! - [`catalog`] -- Variety catalog keyed by id.
//! - [`clock`] -- Session clock, elapsed-day arithmetic and time sources.
//! - [`command`] -- [`EngineHandle`] for edits while the scheduler runs.
//! - [`config`] -- Configuration loading from `canopy-config.yaml`.
//! - [`control`] -- Shared pause/stop/interval state for the scheduler.
//! - [`engine`] -- The [`Engine`]: single owner of the topology snapshot.
//! - [`estimate`] -- Flowering and harvest date estimates.
//! - [`phenology`] -- Phase boundaries from variety timing.
//! - [`reconcile`] -- Forward-only phase reconciliation.
//! - [`runner`] -- The scheduler loop.
//! - [`seed`] -- Starting engine built from configuration.
//! - [`session`] -- [`SessionManager`] with bounded retry.
//! - [`store`] -- [`SessionStore`] trait and an in-memory store.
//! - [`transfer`] -- Growth-to-flowering room transfer.

pub mod alerts;
pub mod catalog;
pub mod clock;
pub mod command;
pub mod config;
pub mod control;
pub mod engine;
pub mod estimate;
pub mod phenology;
pub mod reconcile;
pub mod runner;
pub mod seed;
pub mod session;
pub mod store;
pub mod transfer;

// Re-export primary types at crate root.
pub use alerts::{Alert, AlertSink, AlertStore, AlertType, TracingAlertSink};
pub use catalog::VarietyCatalog;
pub use clock::{ManualTime, SessionClock, SystemTime, TimeSource};
pub use command::{EngineCommand, EngineHandle};
pub use config::CanopyConfig;
pub use control::SchedulerControl;
pub use engine::{Engine, EngineError, LifecycleEstimate, TickSummary};
pub use runner::{NoOpCallback, SchedulerResult, TickCallback, run_scheduler};
pub use session::{RetryPolicy, SessionError, SessionHost, SessionManager};
pub use store::{InMemorySessionStore, SessionDraft, SessionStore, StoreError};
