//! Lifecycle engine binary for Canopy.
//!
//! Wires together the configuration, the seeded topology, the session
//! store and the reconciliation scheduler, then ticks until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `canopy-config.yaml` (or `CANOPY_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Seed the variety catalog and cultivation spaces
//! 4. Open the engine command channel and the session manager
//! 5. Install the Ctrl-C handler
//! 6. Run the scheduler until stopped, starting the configured session
//!    through an engine handle once it is taking commands
//! 7. Log the result

mod callback;
mod error;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use canopy_core::config::{CanopyConfig, SessionConfig};
use canopy_core::runner;
use canopy_core::seed;
use canopy_core::{
    EngineHandle, InMemorySessionStore, RetryPolicy, SchedulerControl, SessionManager, SystemTime,
    TimeSource,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::callback::OccupancyLogCallback;
use crate::error::AppError;
use crate::sink::LoggedAlertStore;

/// Pending engine commands before senders wait.
const COMMAND_BUFFER: usize = 64;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration loading or seeding fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        tick_interval = ?config.scheduler.tick_interval(),
        run_on_startup = config.scheduler.run_on_startup,
        varieties = config.varieties.len(),
        spaces = config.spaces.len(),
        "canopy-engine starting"
    );

    // 3. Seed the topology.
    let time = SystemTime;
    let mut engine = seed::seed_engine(
        &config,
        LoggedAlertStore::new(config.alerts.max_alerts),
        time.now(),
    )
    .map_err(AppError::from)?;

    // 4. Command channel and session manager.
    let (mut handle, mut commands) = EngineHandle::channel(COMMAND_BUFFER);
    let sessions = SessionManager::new(
        InMemorySessionStore::new(),
        RetryPolicy::from_config(&config.persistence),
    );

    // 5. Stop cleanly on Ctrl-C.
    let control = Arc::new(SchedulerControl::new(config.scheduler.tick_interval_secs));
    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping scheduler");
                    control.request_stop();
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
    }

    // 6. Run the scheduler alongside the startup session.
    let mut callback = OccupancyLogCallback;
    let (result, ()) = tokio::join!(
        runner::run_scheduler(
            &mut engine,
            &control,
            &time,
            &mut commands,
            &mut callback,
            config.scheduler.run_on_startup,
        ),
        start_configured_session(&sessions, &mut handle, config.session.as_ref(), &time),
    );

    // 7. Log results.
    runner::log_scheduler_end(&result);
    info!(
        alerts_retained = engine.sink().store().len(),
        "canopy-engine shutdown complete"
    );

    Ok(())
}

/// Create and activate the configured session, if any, through `handle`.
async fn start_configured_session(
    sessions: &SessionManager<InMemorySessionStore>,
    handle: &mut EngineHandle,
    session: Option<&SessionConfig>,
    time: &dyn TimeSource,
) {
    let Some(session) = session else {
        info!("No session configured, plants will not advance until one is activated");
        return;
    };
    match sessions
        .start_session(handle, seed::session_draft(session), time.now())
        .await
    {
        Ok(summary) => info!(
            session = %session.name,
            elapsed_days = ?summary.elapsed_days,
            "Startup session active"
        ),
        Err(e) => warn!(error = %e, "Startup session not activated, plants will not advance"),
    }
}

/// Load configuration from `CANOPY_CONFIG` or `canopy-config.yaml`.
///
/// Falls back to defaults when the file does not exist.
fn load_config() -> Result<CanopyConfig, AppError> {
    let path = std::env::var("CANOPY_CONFIG")
        .map_or_else(|_| PathBuf::from("canopy-config.yaml"), PathBuf::from);
    if path.exists() {
        Ok(CanopyConfig::from_file(&path)?)
    } else {
        let mut config = CanopyConfig::default();
        config.logging.apply_env_overrides();
        Ok(config)
    }
}
