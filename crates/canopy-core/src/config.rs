//! Configuration loading and typed config structures for Canopy.
//!
//! The canonical configuration lives in `canopy-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure and a loader that reads and validates the file.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use canopy_types::{PlantVariety, RoomType, SpaceId, VarietyId};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CanopyConfig {
    /// Reconciliation scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Session persistence retry settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Alert store settings.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The variety catalog.
    #[serde(default)]
    pub varieties: Vec<PlantVariety>,

    /// Seed layout of cultivation spaces.
    #[serde(default)]
    pub spaces: Vec<SpaceConfig>,

    /// Optional session to create and activate at startup.
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

impl CanopyConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `CANOPY_LOG` overrides `logging.level` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.logging.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references between spaces, sessions and varieties.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let known: BTreeSet<VarietyId> = self.varieties.iter().map(|v| v.id).collect();
        if known.len() != self.varieties.len() {
            return Err(ConfigError::Invalid {
                reason: "duplicate variety id".to_owned(),
            });
        }

        let mut space_ids = BTreeSet::new();
        for space in &self.spaces {
            if !space_ids.insert(space.id) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate space id {}", space.id),
                });
            }
            if space.plants_per_row == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("space {} must have at least one plant per row", space.id),
                });
            }
            if space.initial_rows > 0 {
                match space.variety {
                    Some(id) if known.contains(&id) => {}
                    Some(id) => {
                        return Err(ConfigError::Invalid {
                            reason: format!("space {} references unknown variety {id}", space.id),
                        });
                    }
                    None => {
                        return Err(ConfigError::Invalid {
                            reason: format!("space {} has initial rows but no variety", space.id),
                        });
                    }
                }
            }
        }

        if let Some(session) = &self.session {
            if let Some(missing) = session.varieties.iter().find(|id| !known.contains(*id)) {
                return Err(ConfigError::Invalid {
                    reason: format!("session selects unknown variety {missing}"),
                });
            }
        }

        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "scheduler.tick_interval_secs must be at least 1".to_owned(),
            });
        }
        if self.persistence.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                reason: "persistence.max_attempts must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Reconciliation scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between reconciliation ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Whether a tick runs immediately on startup.
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl SchedulerConfig {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            run_on_startup: true,
        }
    }
}

/// Session persistence retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    /// Attempts per remote call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts in milliseconds (grows linearly).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Alert store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertsConfig {
    /// Maximum alerts kept in memory.
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            max_alerts: default_max_alerts(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    /// Override the level with `CANOPY_LOG` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CANOPY_LOG") {
            self.level = val;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Seed definition of one cultivation space.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpaceConfig {
    /// Space identifier.
    pub id: SpaceId,
    /// Display name.
    pub name: String,
    /// Growth or flowering.
    pub room_type: RoomType,
    /// Plants per row.
    pub plants_per_row: u32,
    /// Rows created at startup.
    #[serde(default)]
    pub initial_rows: u32,
    /// Variety used for the initial rows.
    #[serde(default)]
    pub variety: Option<VarietyId>,
}

/// Session created and activated at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Display name.
    pub name: String,
    /// Day zero.
    pub start_date: DateTime<Utc>,
    /// Varieties in scope for harvest estimation.
    #[serde(default)]
    pub varieties: Vec<VarietyId>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_tick_interval_secs() -> u64 {
    3600
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    250
}

const fn default_max_alerts() -> usize {
    crate::alerts::DEFAULT_MAX_ALERTS
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
