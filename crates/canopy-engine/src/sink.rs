//! Alert sink used by the binary: every alert is logged, then kept in a
//! bounded store for later inspection.

use canopy_core::{Alert, AlertSink, AlertStore, TracingAlertSink};

/// Logs each alert and keeps the most recent ones.
#[derive(Debug, Clone, Default)]
pub struct LoggedAlertStore {
    log: TracingAlertSink,
    store: AlertStore,
}

impl LoggedAlertStore {
    /// Keep at most `max_alerts`.
    pub const fn new(max_alerts: usize) -> Self {
        Self {
            log: TracingAlertSink,
            store: AlertStore::new(max_alerts),
        }
    }

    /// The retained alerts.
    pub const fn store(&self) -> &AlertStore {
        &self.store
    }
}

impl AlertSink for LoggedAlertStore {
    fn notify(&mut self, alert: Alert) {
        self.log.notify(alert.clone());
        self.store.notify(alert);
    }
}
