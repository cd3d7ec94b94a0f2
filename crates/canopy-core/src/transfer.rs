//! Room transfer protocol: moving plants out of growth rooms once they
//! reach flowering.
//!
//! The automatic sweep uses the same elapsed-day computation as the
//! reconciler. Every plant in a growth-type space whose computed phase is
//! flowering or later is moved to the lowest-id flowering-type space. When
//! no flowering space exists the plant is skipped and picked up again on a
//! later tick.
//!
//! A transfer removes the plant from its source collection, points its
//! position at the target, sets its phase and appends it to the target
//! collection. Row and column are kept as they were and may lie outside
//! the target grid.

use canopy_topology::{Topology, TopologyError};
use canopy_types::{Phase, PlantId, RoomType, SpaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alerts::{Alert, AlertSink, AlertType};
use crate::clock::SessionClock;
use crate::phenology;

/// Errors from a direct transfer request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The target space does not host flowering plants.
    #[error("space {0} is not a flowering space")]
    NotFloweringSpace(SpaceId),

    /// The underlying topology write failed.
    #[error("topology error: {source}")]
    Topology {
        /// The underlying topology error.
        #[from]
        source: TopologyError,
    },
}

/// One relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantTransfer {
    /// The plant moved.
    pub plant_id: PlantId,
    /// Space the plant left.
    pub from: SpaceId,
    /// Space the plant joined.
    pub to: SpaceId,
    /// Phase the plant holds after the move.
    pub state: Phase,
}

impl PlantTransfer {
    /// The alert reported for this transfer, stamped with `at`.
    pub fn to_alert(&self, at: DateTime<Utc>) -> Alert {
        Alert::new(
            AlertType::Success,
            format!(
                "Plant {} transferred from space {} to flowering space {}",
                self.plant_id, self.from, self.to
            ),
        )
        .at(at)
        .with_plant(self.plant_id)
        .with_space(self.to)
    }
}

/// Result of one automatic transfer sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Relocations performed.
    pub transfers: Vec<PlantTransfer>,
    /// Plants that were due but had nowhere to go.
    pub skipped: usize,
}

/// The default target: the lowest-id flowering-type space.
pub fn default_target(topology: &Topology) -> Option<SpaceId> {
    topology
        .get_spaces_by_room_type(RoomType::Flowering)
        .first()
        .map(|s| s.id)
}

/// Plants in growth-type spaces whose computed phase is flowering or later.
pub fn due_for_transfer(
    topology: &Topology,
    clock: &SessionClock,
    now: DateTime<Utc>,
) -> Vec<PlantId> {
    let Some(elapsed) = clock.elapsed_days(now) else {
        return Vec::new();
    };
    topology
        .get_spaces_by_room_type(RoomType::Growth)
        .into_iter()
        .flat_map(|space| space.plants.iter())
        .filter(|plant| {
            phenology::phase_for(&plant.variety, elapsed).is_some_and(|p| p >= Phase::Flowering)
        })
        .map(|plant| plant.id)
        .collect()
}

/// Move one plant into a flowering space, forcing its phase to flowering.
///
/// Usable directly, outside the automatic sweep. On success the plant is
/// absent from its former space and present exactly once in `target`.
///
/// # Errors
///
/// Returns [`TransferError::NotFloweringSpace`] if `target` is a growth
/// space, or [`TransferError::Topology`] if the plant or space is unknown
/// or the plant is already in `target`.
pub fn transfer_plant_to_flowering(
    topology: &mut Topology,
    plant_id: PlantId,
    target: SpaceId,
    now: DateTime<Utc>,
) -> Result<PlantTransfer, TransferError> {
    relocate(topology, plant_id, target, Phase::Flowering, now)
}

fn relocate(
    topology: &mut Topology,
    plant_id: PlantId,
    target: SpaceId,
    state: Phase,
    now: DateTime<Utc>,
) -> Result<PlantTransfer, TransferError> {
    let space = topology
        .get_space_by_id(target)
        .ok_or(TopologyError::SpaceNotFound(target))?;
    if space.room_type != RoomType::Flowering {
        return Err(TransferError::NotFloweringSpace(target));
    }
    let from = topology.relocate_plant(plant_id, target, state, now)?;
    debug!(plant_id = %plant_id, from = %from, to = %target, state = %state, "Plant transferred");
    Ok(PlantTransfer {
        plant_id,
        from,
        to: target,
        state,
    })
}

/// Run one automatic transfer sweep over `topology`.
///
/// A plant whose stored phase is already later than flowering keeps it;
/// everything else arrives as flowering. Each relocation is reported to
/// `sink`; skips are not.
pub fn transfer_due_plants(
    topology: &mut Topology,
    clock: &SessionClock,
    now: DateTime<Utc>,
    sink: &mut dyn AlertSink,
) -> TransferOutcome {
    let due = due_for_transfer(topology, clock, now);
    if due.is_empty() {
        return TransferOutcome::default();
    }

    let Some(target) = default_target(topology) else {
        debug!(due = due.len(), "No flowering space available, transfers deferred");
        return TransferOutcome {
            transfers: Vec::new(),
            skipped: due.len(),
        };
    };

    let mut outcome = TransferOutcome::default();
    for plant_id in due {
        let stored = topology
            .get_plant_by_id(plant_id)
            .map_or(Phase::Flowering, |p| p.state);
        let state = stored.max(Phase::Flowering);
        match relocate(topology, plant_id, target, state, now) {
            Ok(transfer) => {
                sink.notify(transfer.to_alert(now));
                outcome.transfers.push(transfer);
            }
            Err(err) => {
                debug!(plant_id = %plant_id, error = %err, "Transfer skipped");
                outcome.skipped = outcome.skipped.saturating_add(1);
            }
        }
    }

    info!(
        target = %target,
        transferred = outcome.transfers.len(),
        skipped = outcome.skipped,
        "Transfer sweep applied"
    );
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use canopy_types::{CultivationSession, CultivationSpace, PlantVariety, SessionId, VarietyId};
    use chrono::TimeZone;

    use super::*;
    use crate::alerts::AlertStore;

    fn variety() -> PlantVariety {
        PlantVariety {
            id: VarietyId(1),
            name: "V".to_owned(),
            color: "#ff00ff".to_owned(),
            germination_time: Some(5),
            growth_time: Some(25),
            flowering_time: Some(60),
            dry_weight: None,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        start() + chrono::TimeDelta::days(n)
    }

    fn clock() -> SessionClock {
        SessionClock::with_session(CultivationSession {
            id: SessionId::new(),
            name: "Run".to_owned(),
            start_date: start(),
            end_date: None,
            is_active: true,
            selected_varieties: BTreeSet::new(),
        })
        .unwrap()
    }

    fn topology(with_flowering: bool) -> Topology {
        let mut t = Topology::new();
        t.insert_space(CultivationSpace::new(SpaceId(1), "Veg", RoomType::Growth, 3))
            .unwrap();
        if with_flowering {
            t.insert_space(CultivationSpace::new(SpaceId(9), "Bloom 9", RoomType::Flowering, 3))
                .unwrap();
            t.insert_space(CultivationSpace::new(SpaceId(5), "Bloom 5", RoomType::Flowering, 3))
                .unwrap();
        }
        t.add_row(SpaceId(1), &variety(), start()).unwrap();
        t
    }

    #[test]
    fn nothing_due_before_flowering() {
        let mut t = topology(true);
        let mut sink = AlertStore::default();
        let outcome = transfer_due_plants(&mut t, &clock(), day(30), &mut sink);
        assert_eq!(outcome, TransferOutcome::default());
        assert!(sink.is_empty());
    }

    #[test]
    fn due_plants_move_to_lowest_id_flowering_space() {
        let mut t = topology(true);
        let mut sink = AlertStore::default();
        let outcome = transfer_due_plants(&mut t, &clock(), day(31), &mut sink);

        assert_eq!(outcome.transfers.len(), 3);
        assert_eq!(outcome.skipped, 0);
        assert!(outcome.transfers.iter().all(|tr| tr.to == SpaceId(5)));
        assert!(t.get_space_by_id(SpaceId(1)).unwrap().plants.is_empty());
        let target = t.get_space_by_id(SpaceId(5)).unwrap();
        assert_eq!(target.plants.len(), 3);
        assert!(target.plants.iter().all(|p| p.state == Phase::Flowering));
        assert!(target.plants.iter().all(|p| p.position.space == SpaceId(5)));
        assert_eq!(sink.len(), 3);
        assert!(sink.all().iter().all(|a| a.created_at == day(31)));
    }

    #[test]
    fn missing_flowering_space_defers_silently() {
        let mut t = topology(false);
        let mut sink = AlertStore::default();
        let outcome = transfer_due_plants(&mut t, &clock(), day(40), &mut sink);
        assert!(outcome.transfers.is_empty());
        assert_eq!(outcome.skipped, 3);
        assert!(sink.is_empty());
        assert_eq!(t.get_space_by_id(SpaceId(1)).unwrap().plants.len(), 3);
    }

    #[test]
    fn no_session_means_no_transfers() {
        let mut t = topology(true);
        let mut sink = AlertStore::default();
        let outcome = transfer_due_plants(&mut t, &SessionClock::new(), day(40), &mut sink);
        assert!(outcome.transfers.is_empty());
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn later_stored_phase_survives_automatic_transfer() {
        let mut t = topology(true);
        let id = t.plants().next().unwrap().id;
        t.update_plant_state(id, Phase::Harvested, day(100)).unwrap();
        let mut sink = AlertStore::default();
        transfer_due_plants(&mut t, &clock(), day(100), &mut sink);
        assert_eq!(t.get_plant_by_id(id).unwrap().state, Phase::Harvested);
        assert_eq!(t.space_of(id), Some(SpaceId(5)));
    }

    #[test]
    fn direct_transfer_forces_flowering() {
        let mut t = topology(true);
        let plant = t.plants().next().unwrap().clone();
        let transfer = transfer_plant_to_flowering(&mut t, plant.id, SpaceId(9), day(2)).unwrap();

        assert_eq!(transfer.from, SpaceId(1));
        assert_eq!(transfer.state, Phase::Flowering);
        assert!(t
            .get_space_by_id(SpaceId(1))
            .unwrap()
            .plants
            .iter()
            .all(|p| p.id != plant.id));
        let in_target = t
            .get_space_by_id(SpaceId(9))
            .unwrap()
            .plants
            .iter()
            .filter(|p| p.id == plant.id)
            .count();
        assert_eq!(in_target, 1);
        let moved = t.get_plant_by_id(plant.id).unwrap();
        assert_eq!((moved.position.row, moved.position.column), (1, 1));
    }

    #[test]
    fn direct_transfer_rejects_growth_target() {
        let mut t = topology(true);
        let id = t.plants().next().unwrap().id;
        t.insert_space(CultivationSpace::new(SpaceId(2), "Veg 2", RoomType::Growth, 3))
            .unwrap();
        assert_eq!(
            transfer_plant_to_flowering(&mut t, id, SpaceId(2), day(1)),
            Err(TransferError::NotFloweringSpace(SpaceId(2)))
        );
        assert!(matches!(
            transfer_plant_to_flowering(&mut t, PlantId::new(), SpaceId(9), day(1)),
            Err(TransferError::Topology {
                source: TopologyError::PlantNotFound(_)
            })
        ));
    }
}
