//! Shared scheduler control state.
//!
//! [`SchedulerControl`] is wrapped in [`Arc`](std::sync::Arc) and shared
//! between the scheduler loop and whoever drives it (signal handlers, an
//! admin surface, tests). Flags are atomics so the loop reads them without
//! locking; [`Notify`] wakes the loop out of a pause or a sleep.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Pause, stop, tick-now and interval controls for the scheduler loop.
#[derive(Debug)]
pub struct SchedulerControl {
    /// Whether ticking is paused.
    paused: AtomicBool,

    /// Wakes the loop when resumed.
    resume_notify: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes every waiter when a stop is requested.
    stop_notify: Notify,

    /// Wakes the loop to tick without waiting out the interval.
    tick_notify: Notify,

    /// Seconds between ticks (runtime-adjustable).
    tick_interval_secs: AtomicU64,
}

impl SchedulerControl {
    /// Create control state with the given tick interval. A zero interval
    /// is raised to one second.
    pub fn new(tick_interval_secs: u64) -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            tick_notify: Notify::new(),
            tick_interval_secs: AtomicU64::new(tick_interval_secs.max(1)),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Whether ticking is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause ticking. A tick already running completes.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume ticking and wake the loop.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Wait until resumed or stopped. Returns immediately if not paused.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            tokio::select! {
                () = self.resume_notify.notified() => {}
                () = self.stopped() => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop and wake every waiter.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let mut notified = pin!(self.stop_notify.notified());
            notified.as_mut().enable();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Tick now
    // -----------------------------------------------------------------------

    /// Ask the loop to tick without waiting for the interval to elapse.
    pub fn request_tick(&self) {
        self.tick_notify.notify_one();
    }

    /// Resolve when a tick has been requested.
    pub async fn tick_requested(&self) {
        self.tick_notify.notified().await;
    }

    // -----------------------------------------------------------------------
    // Interval
    // -----------------------------------------------------------------------

    /// Current tick interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.load(Ordering::Acquire))
    }

    /// Set the tick interval in seconds; applies from the next wait.
    ///
    /// Returns the previous interval, or `None` if `secs` is zero.
    pub fn set_tick_interval_secs(&self, secs: u64) -> Option<u64> {
        if secs == 0 {
            return None;
        }
        Some(self.tick_interval_secs.swap(secs, Ordering::AcqRel))
    }
}
