//! Tick callback that logs occupancy after every tick.

use std::collections::BTreeMap;

use canopy_core::{TickCallback, TickSummary};
use canopy_topology::Topology;
use canopy_types::{Phase, RoomType};
use tracing::info;

/// Logs plants per room type and per phase.
pub struct OccupancyLogCallback;

impl OccupancyLogCallback {
    /// Count plants by phase.
    pub fn phase_counts(topology: &Topology) -> BTreeMap<Phase, usize> {
        let mut counts = BTreeMap::new();
        for plant in topology.plants() {
            let count = counts.entry(plant.state).or_insert(0_usize);
            *count = count.saturating_add(1);
        }
        counts
    }

    /// Count plants hosted by spaces of `room_type`.
    pub fn plants_in(topology: &Topology, room_type: RoomType) -> usize {
        topology
            .get_spaces_by_room_type(room_type)
            .iter()
            .map(|s| s.plants.len())
            .sum()
    }
}

impl TickCallback for OccupancyLogCallback {
    fn on_tick(&mut self, summary: &TickSummary, topology: &Topology) {
        if summary.is_empty() {
            return;
        }
        let phases = Self::phase_counts(topology);
        info!(
            elapsed_days = ?summary.elapsed_days,
            growth_rooms = Self::plants_in(topology, RoomType::Growth),
            flowering_rooms = Self::plants_in(topology, RoomType::Flowering),
            ?phases,
            "Occupancy after tick"
        );
    }
}
