//! State reconciler: the periodic sweep that brings each plant's stored
//! phase in line with the phase its variety timing implies.
//!
//! One sweep:
//!
//! 1. Returns immediately when the clock has no active session.
//! 2. Computes the target phase for every plant from one shared `now`, so
//!    plants with the same variety and anchor always move together.
//! 3. Skips plants whose variety is unscheduled, whose stored phase
//!    already matches, or whose stored phase is later than the computed
//!    one (a manual forward edit is never pulled back).
//! 4. Writes the remaining transitions, at most one per plant.
//!
//! Running a sweep twice with the same `now` writes nothing the second
//! time.

use canopy_topology::Topology;
use canopy_types::{Phase, PlantId, SpaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alerts::{Alert, AlertSink, AlertType};
use crate::clock::SessionClock;
use crate::phenology;

/// One phase change written by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// The plant.
    pub plant_id: PlantId,
    /// The space owning the plant.
    pub space_id: SpaceId,
    /// Stored phase before the sweep.
    pub from: Phase,
    /// Phase written by the sweep.
    pub to: Phase,
}

impl PhaseTransition {
    /// The alert reported for this transition, stamped with the sweep's
    /// `now`.
    pub fn to_alert(&self, at: DateTime<Utc>) -> Alert {
        Alert::new(
            AlertType::Success,
            format!(
                "Plant {} in space {} moved from {} to {}",
                self.plant_id, self.space_id, self.from, self.to
            ),
        )
        .at(at)
        .with_plant(self.plant_id)
        .with_space(self.space_id)
    }
}

/// Compute the transitions due at `now` without writing anything.
pub fn plan(topology: &Topology, clock: &SessionClock, now: DateTime<Utc>) -> Vec<PhaseTransition> {
    let Some(elapsed) = clock.elapsed_days(now) else {
        return Vec::new();
    };

    topology
        .spaces()
        .flat_map(|space| space.plants.iter().map(move |plant| (space.id, plant)))
        .filter_map(|(space_id, plant)| {
            let computed = phenology::phase_for(&plant.variety, elapsed)?;
            (computed > plant.state).then_some(PhaseTransition {
                plant_id: plant.id,
                space_id,
                from: plant.state,
                to: computed,
            })
        })
        .collect()
}

/// Run one reconciliation sweep over `topology`.
///
/// Writes every due transition, notifies `sink` once per plant changed,
/// and returns the transitions applied.
pub fn reconcile(
    topology: &mut Topology,
    clock: &SessionClock,
    now: DateTime<Utc>,
    sink: &mut dyn AlertSink,
) -> Vec<PhaseTransition> {
    let Some(elapsed) = clock.elapsed_days(now) else {
        debug!("No active session, reconciliation skipped");
        return Vec::new();
    };

    let transitions = plan(topology, clock, now);
    let mut applied = Vec::with_capacity(transitions.len());
    for transition in transitions {
        // The plan was taken from this same topology, so the plant exists
        // in the space it was planned in.
        if topology
            .update_plant_state_in(transition.space_id, transition.plant_id, transition.to, now)
            .is_ok()
        {
            debug!(
                plant_id = %transition.plant_id,
                space_id = %transition.space_id,
                from = %transition.from,
                to = %transition.to,
                "Phase advanced"
            );
            sink.notify(transition.to_alert(now));
            applied.push(transition);
        }
    }

    if !applied.is_empty() {
        info!(elapsed_days = elapsed, transitions = applied.len(), "Reconciliation sweep applied");
    }
    applied
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use canopy_types::{
        CultivationSession, CultivationSpace, PlantVariety, RoomType, SessionId, VarietyId,
    };
    use chrono::TimeZone;

    use super::*;
    use crate::alerts::AlertStore;

    fn variety(id: u32, complete: bool) -> PlantVariety {
        PlantVariety {
            id: VarietyId(id),
            name: format!("V{id}"),
            color: "#00ff00".to_owned(),
            germination_time: Some(5),
            growth_time: Some(25),
            flowering_time: complete.then_some(60),
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

    fn topology() -> Topology {
        let mut t = Topology::new();
        t.insert_space(CultivationSpace::new(SpaceId(1), "Veg", RoomType::Growth, 4))
            .unwrap();
        t.add_row(SpaceId(1), &variety(1, true), start()).unwrap();
        t.add_row(SpaceId(1), &variety(2, false), start()).unwrap();
        t
    }

    #[test]
    fn no_session_is_a_no_op() {
        let mut t = topology();
        let mut sink = AlertStore::default();
        let applied = reconcile(&mut t, &SessionClock::new(), day(200), &mut sink);
        assert!(applied.is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn advances_scheduled_plants_only() {
        let mut t = topology();
        let mut sink = AlertStore::default();
        let applied = reconcile(&mut t, &clock(), day(31), &mut sink);

        assert_eq!(applied.len(), 4);
        assert!(applied.iter().all(|tr| tr.to == Phase::Flowering));
        assert_eq!(sink.len(), 4);
        assert!(sink.all().iter().all(|a| a.created_at == day(31)));
        assert!(t
            .plants()
            .filter(|p| p.state == Phase::Flowering)
            .all(|p| p.last_updated == day(31)));
        let frozen = t.plants().filter(|p| p.variety.id == VarietyId(2));
        assert!(frozen.into_iter().all(|p| p.state == Phase::Growth));
    }

    #[test]
    fn second_sweep_writes_nothing() {
        let mut t = topology();
        let mut sink = AlertStore::default();
        reconcile(&mut t, &clock(), day(31), &mut sink);
        let before = t.clone();
        sink.drain();

        let applied = reconcile(&mut t, &clock(), day(31), &mut sink);
        assert!(applied.is_empty());
        assert!(sink.is_empty());
        assert_eq!(t, before);
    }

    #[test]
    fn growth_room_plant_stays_in_growth_until_day_thirty() {
        let mut t = topology();
        let mut sink = AlertStore::default();
        assert!(reconcile(&mut t, &clock(), day(29), &mut sink).is_empty());
        assert!(reconcile(&mut t, &clock(), day(30), &mut sink).is_empty());
        assert!(t.plants().all(|p| p.state == Phase::Growth));
    }

    #[test]
    fn never_regresses_a_later_manual_state() {
        let mut t = topology();
        let id = t.plants().next().unwrap().id;
        t.update_plant_state(id, Phase::Drying, start()).unwrap();
        let mut sink = AlertStore::default();
        reconcile(&mut t, &clock(), day(40), &mut sink);
        assert_eq!(t.get_plant_by_id(id).unwrap().state, Phase::Drying);

        reconcile(&mut t, &clock(), day(91), &mut sink);
        assert_eq!(t.get_plant_by_id(id).unwrap().state, Phase::Harvested);
    }

    #[test]
    fn manual_backward_edit_is_re_advanced() {
        let mut t = topology();
        let mut sink = AlertStore::default();
        reconcile(&mut t, &clock(), day(40), &mut sink);
        let id = t.plants().next().unwrap().id;
        t.update_plant_state(id, Phase::Germination, day(40)).unwrap();

        let applied = reconcile(&mut t, &clock(), day(40), &mut sink);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied.first().map(|tr| tr.from), Some(Phase::Germination));
        assert_eq!(t.get_plant_by_id(id).unwrap().state, Phase::Flowering);
    }

    #[test]
    fn plan_matches_applied() {
        let mut t = topology();
        let planned = plan(&t, &clock(), day(95));
        let mut sink = AlertStore::default();
        let applied = reconcile(&mut t, &clock(), day(95), &mut sink);
        assert_eq!(planned, applied);
        assert!(applied.iter().all(|tr| tr.to == Phase::Harvested));
    }
}
