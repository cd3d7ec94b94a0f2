//! Phenology model: which lifecycle phase a variety should be in after a
//! given number of days.
//!
//! With germination `g`, growth `w` and flowering `f` day-counts:
//!
//! | elapsed days            | phase       |
//! |-------------------------|-------------|
//! | `d <= g`                | germination |
//! | `g < d <= g+w`          | growth      |
//! | `g+w < d <= g+w+f`      | flowering   |
//! | `d > g+w+f`             | harvested   |
//!
//! Each threshold day belongs to the earlier phase. A variety missing any
//! of the three timings has no schedule: [`phase_for`] returns `None` and
//! the plant is left alone. `drying` is never computed; it is only reached
//! through a manual edit.

use canopy_types::{Phase, PlantVariety};

/// A complete timing profile, with cumulative thresholds precomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarietyTiming {
    /// Days of germination.
    pub germination: u32,
    /// Days of vegetative growth.
    pub growth: u32,
    /// Days of flowering.
    pub flowering: u32,
}

impl VarietyTiming {
    /// Extract the timing profile, or `None` if any timing is missing.
    pub const fn of(variety: &PlantVariety) -> Option<Self> {
        match (
            variety.germination_time,
            variety.growth_time,
            variety.flowering_time,
        ) {
            (Some(germination), Some(growth), Some(flowering)) => Some(Self {
                germination,
                growth,
                flowering,
            }),
            _ => None,
        }
    }

    /// Last day of germination (`g`).
    pub fn germination_ends(self) -> i64 {
        i64::from(self.germination)
    }

    /// Last day of growth (`g + w`).
    pub fn growth_ends(self) -> i64 {
        self.germination_ends().saturating_add(i64::from(self.growth))
    }

    /// Last day of flowering (`g + w + f`); the plant is harvested after it.
    pub fn flowering_ends(self) -> i64 {
        self.growth_ends().saturating_add(i64::from(self.flowering))
    }

    /// The phase for `elapsed_days` since the session anchor.
    pub fn phase_at(self, elapsed_days: i64) -> Phase {
        if elapsed_days <= self.germination_ends() {
            Phase::Germination
        } else if elapsed_days <= self.growth_ends() {
            Phase::Growth
        } else if elapsed_days <= self.flowering_ends() {
            Phase::Flowering
        } else {
            Phase::Harvested
        }
    }

    /// Days remaining until the next computed phase begins, or `None` once
    /// harvested.
    pub fn days_until_next_phase(self, elapsed_days: i64) -> Option<i64> {
        let boundary = match self.phase_at(elapsed_days) {
            Phase::Germination => self.germination_ends(),
            Phase::Growth => self.growth_ends(),
            Phase::Flowering | Phase::Drying => self.flowering_ends(),
            Phase::Harvested => return None,
        };
        Some(boundary.saturating_sub(elapsed_days).saturating_add(1))
    }
}

/// The phase a plant of `variety` should be in after `elapsed_days`.
///
/// Returns `None` when the variety lacks timing data.
pub fn phase_for(variety: &PlantVariety, elapsed_days: i64) -> Option<Phase> {
    VarietyTiming::of(variety).map(|t| t.phase_at(elapsed_days))
}

/// Days until the next computed phase; `None` if unscheduled or harvested.
pub fn days_until_next_phase(variety: &PlantVariety, elapsed_days: i64) -> Option<i64> {
    VarietyTiming::of(variety).and_then(|t| t.days_until_next_phase(elapsed_days))
}
