//! Core entity structs for the Canopy cultivation tracker.
//!
//! A [`CultivationSpace`] owns its [`Plant`] collection. Each plant carries
//! a by-value snapshot of its [`PlantVariety`], so a variety edit has to be
//! propagated to every plant that references it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Phase, RoomType};
use crate::ids::{PlantId, SessionId, SpaceId, VarietyId};

// ---------------------------------------------------------------------------
// PlantVariety
// ---------------------------------------------------------------------------

/// A cultivar with its timing profile.
///
/// Timings are whole days. Any of them may be missing; a plant whose
/// variety lacks timing data is never advanced automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlantVariety {
    /// Catalog identifier.
    pub id: VarietyId,
    /// Display name.
    pub name: String,
    /// Display color (CSS hex string).
    pub color: String,
    /// Days spent germinating.
    #[serde(default)]
    pub germination_time: Option<u32>,
    /// Days of vegetative growth.
    #[serde(default)]
    pub growth_time: Option<u32>,
    /// Days of flowering.
    #[serde(default)]
    pub flowering_time: Option<u32>,
    /// Expected dry weight per plant in grams.
    #[serde(default)]
    pub dry_weight: Option<f64>,
}

// ---------------------------------------------------------------------------
// Plant
// ---------------------------------------------------------------------------

/// Grid coordinate of a plant. Rows and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// The space that currently owns the plant.
    pub space: SpaceId,
    /// Row within the space, in `1..=rows`.
    pub row: u32,
    /// Column within the row, in `1..=plants_per_row`.
    pub column: u32,
}

/// A single tracked plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Plant {
    /// Unique identifier.
    pub id: PlantId,
    /// Location in the space grid.
    pub position: Position,
    /// Snapshot of the variety this plant belongs to.
    pub variety: PlantVariety,
    /// Stored lifecycle phase.
    pub state: Phase,
    /// Last electrical-conductivity reading.
    pub ec: f64,
    /// Last pH reading.
    pub ph: f64,
    /// When any field of this plant was last written.
    pub last_updated: DateTime<Utc>,
}

impl Plant {
    /// Create a fresh plant with neutral nutrient readings.
    pub fn new(
        position: Position,
        variety: PlantVariety,
        state: Phase,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlantId::new(),
            position,
            variety,
            state,
            ec: 0.0,
            ph: 7.0,
            last_updated: now,
        }
    }
}

// ---------------------------------------------------------------------------
// CultivationSpace
// ---------------------------------------------------------------------------

/// A physical room laid out as a grid of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CultivationSpace {
    /// Space identifier.
    pub id: SpaceId,
    /// Display name.
    pub name: String,
    /// Number of rows. Row numbers are contiguous `1..=rows`.
    pub rows: u32,
    /// Number of plants seeded in each row.
    pub plants_per_row: u32,
    /// Whether the room hosts growth or flowering plants.
    pub room_type: RoomType,
    /// Plants currently owned by this space.
    pub plants: Vec<Plant>,
}

impl CultivationSpace {
    /// Create an empty space with no rows.
    pub fn new(id: SpaceId, name: impl Into<String>, room_type: RoomType, plants_per_row: u32) -> Self {
        Self {
            id,
            name: name.into(),
            rows: 0,
            plants_per_row,
            room_type,
            plants: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// CultivationSession
// ---------------------------------------------------------------------------

/// A cultivation run whose start date anchors elapsed-day computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CultivationSession {
    /// Session identifier assigned by the persistence layer.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Day zero for every plant under automatic scheduling.
    pub start_date: DateTime<Utc>,
    /// When the session was ended, if it has been.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Whether the session may still anchor automatic transitions.
    pub is_active: bool,
    /// Varieties in scope for harvest-date estimation.
    #[serde(default)]
    pub selected_varieties: BTreeSet<VarietyId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn variety() -> PlantVariety {
        PlantVariety {
            id: VarietyId(1),
            name: "Northern Lights".to_owned(),
            color: "#4caf50".to_owned(),
            germination_time: Some(5),
            growth_time: Some(25),
            flowering_time: Some(60),
            dry_weight: None,
        }
    }

    #[test]
    fn new_plant_has_neutral_readings() {
        let pos = Position {
            space: SpaceId(1),
            row: 1,
            column: 3,
        };
        let plant = Plant::new(pos, variety(), Phase::Growth, Utc::now());
        assert_eq!(plant.position, pos);
        assert_eq!(plant.state, Phase::Growth);
        assert!((plant.ph - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn new_space_is_empty() {
        let space = CultivationSpace::new(SpaceId(3), "Veg A", RoomType::Growth, 12);
        assert_eq!(space.rows, 0);
        assert!(space.plants.is_empty());
        assert_eq!(space.plants_per_row, 12);
    }

    #[test]
    fn variety_timings_default_to_none() {
        let json = r##"{"id": 4, "name": "Unknown", "color": "#000"}"##;
        let parsed: PlantVariety = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, VarietyId(4));
        assert!(parsed.germination_time.is_none());
        assert!(parsed.flowering_time.is_none());
    }
}
