//! Alert sink: the fire-and-forget notification surface.
//!
//! The reconciler reports every phase transition and the transfer protocol
//! every relocation. Session persistence failures are reported as
//! `error` alerts. Skips (missing timing, no session, no flowering room)
//! never raise alerts.
//!
//! Two sinks are provided: [`AlertStore`], a bounded in-memory list for
//! the dashboard, and [`TracingAlertSink`], which writes each alert to the
//! log.

use canopy_types::{PlantId, SpaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Alert types
// ---------------------------------------------------------------------------

/// Kind of alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// Informational.
    Info,
    /// A lifecycle transition or transfer completed.
    Success,
    /// Something is off but nothing failed.
    Warning,
    /// An operation failed.
    Error,
}

/// A single notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier.
    pub id: Uuid,
    /// Alert kind.
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Human-readable message.
    pub message: String,
    /// Plant the alert concerns, if any.
    pub plant_id: Option<PlantId>,
    /// Space the alert concerns, if any.
    pub space_id: Option<SpaceId>,
    /// When the alert was raised.
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// A new alert with no plant or space attached, stamped with the wall
    /// clock. Use [`at`](Self::at) to stamp it with the instant it reports.
    pub fn new(alert_type: AlertType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            alert_type,
            message: message.into(),
            plant_id: None,
            space_id: None,
            created_at: Utc::now(),
        }
    }

    /// Stamp with the instant the alert reports on.
    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attach a plant.
    #[must_use]
    pub fn with_plant(mut self, plant_id: PlantId) -> Self {
        self.plant_id = Some(plant_id);
        self
    }

    /// Attach a space.
    #[must_use]
    pub fn with_space(mut self, space_id: SpaceId) -> Self {
        self.space_id = Some(space_id);
        self
    }
}

/// Receiver of alerts.
pub trait AlertSink {
    /// Deliver an alert. Must not fail.
    fn notify(&mut self, alert: Alert);
}

// ---------------------------------------------------------------------------
// Alert Store
// ---------------------------------------------------------------------------

/// Default number of alerts kept in memory.
pub const DEFAULT_MAX_ALERTS: usize = 500;

/// In-memory alert store, newest first.
#[derive(Debug, Clone)]
pub struct AlertStore {
    /// All alerts, newest first.
    alerts: Vec<Alert>,
    /// Capacity; the oldest alert is dropped beyond it.
    max_alerts: usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ALERTS)
    }
}

impl AlertStore {
    /// Create an empty store holding at most `max_alerts`.
    pub const fn new(max_alerts: usize) -> Self {
        Self {
            alerts: Vec::new(),
            max_alerts,
        }
    }

    /// All alerts, newest first.
    pub fn all(&self) -> &[Alert] {
        &self.alerts
    }

    /// Number of stored alerts.
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Alerts of one kind.
    pub fn by_type(&self, alert_type: AlertType) -> Vec<&Alert> {
        self.alerts
            .iter()
            .filter(|a| a.alert_type == alert_type)
            .collect()
    }

    /// Alerts about one plant.
    pub fn for_plant(&self, plant_id: PlantId) -> Vec<&Alert> {
        self.alerts
            .iter()
            .filter(|a| a.plant_id == Some(plant_id))
            .collect()
    }

    /// Remove and return every alert.
    pub fn drain(&mut self) -> Vec<Alert> {
        std::mem::take(&mut self.alerts)
    }
}

impl AlertSink for AlertStore {
    fn notify(&mut self, alert: Alert) {
        self.alerts.insert(0, alert);
        if self.alerts.len() > self.max_alerts {
            self.alerts.truncate(self.max_alerts);
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing sink
// ---------------------------------------------------------------------------

/// Writes alerts to the log and keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&mut self, alert: Alert) {
        let plant_id = alert.plant_id.map(|id| id.to_string());
        let space_id = alert.space_id.map(|id| id.to_string());
        match alert.alert_type {
            AlertType::Error => error!(?plant_id, ?space_id, "{}", alert.message),
            AlertType::Warning => warn!(?plant_id, ?space_id, "{}", alert.message),
            AlertType::Info | AlertType::Success => {
                info!(?plant_id, ?space_id, "{}", alert.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keeps_newest_first() {
        let mut store = AlertStore::default();
        store.notify(Alert::new(AlertType::Info, "first"));
        store.notify(Alert::new(AlertType::Success, "second"));
        let messages: Vec<&str> = store.all().iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[test]
    fn store_is_bounded() {
        let mut store = AlertStore::new(3);
        for i in 0..5 {
            store.notify(Alert::new(AlertType::Info, format!("alert {i}")));
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.all().first().map(|a| a.message.as_str()), Some("alert 4"));
        assert_eq!(store.all().last().map(|a| a.message.as_str()), Some("alert 2"));
    }

    #[test]
    fn filters_by_type_and_plant() {
        let plant = PlantId::new();
        let mut store = AlertStore::default();
        store.notify(Alert::new(AlertType::Success, "moved").with_plant(plant));
        store.notify(Alert::new(AlertType::Error, "store down"));
        assert_eq!(store.by_type(AlertType::Error).len(), 1);
        assert_eq!(store.for_plant(plant).len(), 1);
        assert_eq!(store.drain().len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn alert_serializes_type_field() {
        let alert = Alert::new(AlertType::Warning, "check").with_space(SpaceId(3));
        let json = serde_json::to_value(&alert).unwrap_or_default();
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("warning"));
        assert_eq!(json.get("space_id").and_then(serde_json::Value::as_u64), Some(3));
    }
}
