//! Scheduler loop with control hooks.
//!
//! [`run_scheduler`] drives [`Engine::tick`] on a fixed interval until a
//! stop is requested. It supports:
//!
//! - **Startup tick**: optionally tick once before the first wait
//! - **Pause/resume**: no ticks run while paused
//! - **Tick now**: [`SchedulerControl::request_tick`] cuts the wait short
//! - **Variable interval**: read again before every wait
//! - **Clean shutdown**: a stop request interrupts the wait
//! - **Commands**: [`EngineCommand`]s from [`EngineHandle`](crate::command::EngineHandle)s
//!   are applied between ticks, also while paused
//!
//! The loop owns the engine for its duration, so ticks never overlap and
//! commands never land inside a tick. Applying a command does not restart
//! the interval.

use std::sync::Arc;

use std::pin::pin;

use canopy_topology::Topology;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::alerts::AlertSink;
use crate::clock::TimeSource;
use crate::command::EngineCommand;
use crate::control::SchedulerControl;
use crate::engine::{Engine, TickSummary};

/// Outcome of a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerResult {
    /// Number of ticks executed.
    pub total_ticks: u64,
    /// Phase changes written across all ticks.
    pub total_transitions: u64,
    /// Relocations performed across all ticks.
    pub total_transfers: u64,
    /// The last tick summary, if any tick ran.
    pub final_summary: Option<TickSummary>,
}

/// Callback invoked after each tick.
///
/// Receives the tick summary and the snapshot the tick published.
pub trait TickCallback: Send {
    /// Called after a tick completes.
    fn on_tick(&mut self, summary: &TickSummary, topology: &Topology);
}

/// A callback that does nothing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _topology: &Topology) {}
}

/// Apply a received command. Returns whether more may arrive.
fn apply_command<A: AlertSink>(engine: &mut Engine<A>, command: Option<EngineCommand>) -> bool {
    match command {
        Some(command) => {
            command.apply(engine);
            true
        }
        None => {
            debug!("All engine handles dropped");
            false
        }
    }
}

/// Run the tick loop until a stop is requested.
pub async fn run_scheduler<A: AlertSink>(
    engine: &mut Engine<A>,
    control: &Arc<SchedulerControl>,
    time: &dyn TimeSource,
    commands: &mut mpsc::Receiver<EngineCommand>,
    callback: &mut dyn TickCallback,
    run_on_startup: bool,
) -> SchedulerResult {
    let mut result = SchedulerResult::default();
    let mut skip_wait = run_on_startup;
    let mut commands_open = true;

    info!(
        tick_interval_secs = control.tick_interval().as_secs(),
        run_on_startup,
        "Scheduler starting"
    );

    loop {
        if control.is_paused() {
            info!("Scheduler paused, waiting for resume...");
            while control.is_paused() && !control.is_stop_requested() {
                tokio::select! {
                    () = control.wait_if_paused() => {}
                    command = commands.recv(), if commands_open => {
                        commands_open = apply_command(engine, command);
                    }
                }
            }
            if !control.is_stop_requested() {
                info!("Scheduler resumed");
            }
        }

        if control.is_stop_requested() {
            info!("Scheduler stop requested");
            break;
        }

        if skip_wait {
            skip_wait = false;
        } else {
            let mut sleep = pin!(tokio::time::sleep(control.tick_interval()));
            let stop = loop {
                tokio::select! {
                    () = sleep.as_mut() => break false,
                    () = control.tick_requested() => {
                        debug!("Immediate tick requested");
                        break false;
                    }
                    () = control.stopped() => break true,
                    command = commands.recv(), if commands_open => {
                        commands_open = apply_command(engine, command);
                    }
                }
            };
            if stop {
                info!("Scheduler stop requested");
                break;
            }
            if control.is_paused() {
                continue;
            }
        }

        let summary = engine.tick(time.now());
        result.total_ticks = result.total_ticks.saturating_add(1);
        result.total_transitions = result
            .total_transitions
            .saturating_add(u64::try_from(summary.transitions.len()).unwrap_or(u64::MAX));
        result.total_transfers = result
            .total_transfers
            .saturating_add(u64::try_from(summary.transfers.len()).unwrap_or(u64::MAX));

        debug!(
            at = %summary.at,
            elapsed_days = ?summary.elapsed_days,
            transitions = summary.transitions.len(),
            transfers = summary.transfers.len(),
            deferred = summary.transfers_deferred,
            "Tick complete"
        );

        callback.on_tick(&summary, &engine.snapshot());
        result.final_summary = Some(summary);
    }

    result
}

/// Log the end of a scheduler run.
pub fn log_scheduler_end(result: &SchedulerResult) {
    info!(
        total_ticks = result.total_ticks,
        total_transitions = result.total_transitions,
        total_transfers = result.total_transfers,
        "Scheduler stopped"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            at = %summary.at,
            elapsed_days = ?summary.elapsed_days,
            "Final tick summary"
        );
    } else {
        warn!("Scheduler stopped with no ticks executed");
    }
}
