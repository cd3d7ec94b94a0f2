//! Enumeration types for the Canopy cultivation tracker.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Lifecycle phase
// ---------------------------------------------------------------------------

/// A lifecycle phase a plant passes through.
///
/// Variants are declared in biological order, so the derived [`Ord`] gives
/// "earlier" and "later" directly: `Germination < Growth < ... < Harvested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Phase {
    /// Seed has been sown and is sprouting.
    Germination,
    /// Vegetative growth.
    Growth,
    /// Flowering under a flowering light cycle.
    Flowering,
    /// Cut and hanging to dry.
    Drying,
    /// Terminal state.
    Harvested,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Germination,
        Self::Growth,
        Self::Flowering,
        Self::Drying,
        Self::Harvested,
    ];

    /// Lowercase name used in alerts and serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Germination => "germination",
            Self::Growth => "growth",
            Self::Flowering => "flowering",
            Self::Drying => "drying",
            Self::Harvested => "harvested",
        }
    }

    /// Whether no further transition is possible from this phase.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Harvested)
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Room type
// ---------------------------------------------------------------------------

/// What a cultivation space is configured to host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum RoomType {
    /// Pre-flowering (vegetative) room.
    Growth,
    /// Flowering and finishing room.
    Flowering,
}

impl RoomType {
    /// The phase assigned to plants created by a manual row insertion in
    /// a room of this type.
    pub const fn seeded_phase(self) -> Phase {
        match self {
            Self::Growth => Phase::Growth,
            Self::Flowering => Phase::Flowering,
        }
    }
}

impl core::fmt::Display for RoomType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Growth => f.write_str("growth"),
            Self::Flowering => f.write_str("flowering"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered_biologically() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
        assert!(Phase::Growth < Phase::Flowering);
        assert!(Phase::Drying < Phase::Harvested);
    }

    #[test]
    fn phase_serializes_lowercase() {
        let json = serde_json::to_string(&Phase::Flowering).unwrap_or_default();
        assert_eq!(json, "\"flowering\"");
        let back: Result<Phase, _> = serde_json::from_str("\"harvested\"");
        assert!(matches!(back, Ok(Phase::Harvested)));
    }

    #[test]
    fn seeded_phase_follows_room_type() {
        assert_eq!(RoomType::Growth.seeded_phase(), Phase::Growth);
        assert_eq!(RoomType::Flowering.seeded_phase(), Phase::Flowering);
    }

    #[test]
    fn only_harvested_is_terminal() {
        for phase in Phase::ALL {
            assert_eq!(phase.is_terminal(), phase == Phase::Harvested);
        }
    }
}
