//! The lifecycle engine: single owner of the topology snapshot.
//!
//! [`Engine`] bundles the topology, the session clock, the variety catalog
//! and the alert sink, and exposes the query and mutation surface used by
//! the rest of the application. It is the only writer of the topology.
//!
//! Every mutation is copy-on-write: the current snapshot is cloned (which
//! shares every space), the clone is edited, and on success it replaces the
//! snapshot. A failed mutation leaves the published snapshot untouched, and
//! an [`Arc<Topology>`] handed out earlier never changes under its holder.
//!
//! A tick runs the reconciler and then the transfer protocol from one
//! shared `now`. A tick also runs immediately whenever the current session
//! changes.

use std::sync::Arc;

use canopy_topology::{Topology, TopologyError};
use canopy_types::{
    CultivationSession, CultivationSpace, Phase, Plant, PlantId, PlantVariety, RoomType, SessionId,
    SpaceId, VarietyId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alerts::AlertSink;
use crate::catalog::VarietyCatalog;
use crate::clock::{ClockError, SessionClock};
use crate::estimate;
use crate::phenology;
use crate::reconcile::{self, PhaseTransition};
use crate::transfer::{self, PlantTransfer, TransferError};

/// Errors raised by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A topology write failed.
    #[error("topology error: {source}")]
    Topology {
        /// The underlying topology error.
        #[from]
        source: TopologyError,
    },

    /// A direct transfer failed.
    #[error("transfer error: {source}")]
    Transfer {
        /// The underlying transfer error.
        #[from]
        source: TransferError,
    },

    /// The session could not become current.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The variety is not in the catalog.
    #[error("unknown variety: {0}")]
    UnknownVariety(VarietyId),

    /// Rows were requested for a space without naming a variety.
    #[error("space {0} has initial rows but no variety")]
    NoSeedVariety(SpaceId),

    /// The engine is no longer taking commands (its scheduler has stopped).
    #[error("engine is not accepting commands")]
    Stopped,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    /// The instant the tick evaluated.
    pub at: DateTime<Utc>,
    /// Elapsed days since the anchor, or `None` with no active session.
    pub elapsed_days: Option<i64>,
    /// Phase changes written by the reconciler.
    pub transitions: Vec<PhaseTransition>,
    /// Relocations performed by the transfer protocol.
    pub transfers: Vec<PlantTransfer>,
    /// Plants due for transfer that had no flowering space to go to.
    pub transfers_deferred: usize,
}

impl TickSummary {
    /// Whether the tick changed nothing.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.transfers.is_empty()
    }
}

/// Estimated calendar dates for a plant or variety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEstimate {
    /// Last expected day of growth; flowering computes from the next day.
    pub flowering: DateTime<Utc>,
    /// Last expected day of flowering; harvested computes from the next day.
    pub harvest: DateTime<Utc>,
}

/// Owner of the topology, session clock, catalog and alert sink.
#[derive(Debug)]
pub struct Engine<A> {
    /// Current published snapshot.
    topology: Arc<Topology>,
    /// Current session.
    clock: SessionClock,
    /// Variety catalog.
    catalog: VarietyCatalog,
    /// Where alerts go.
    sink: A,
}

impl<A: AlertSink> Engine<A> {
    /// Create an engine with no current session.
    pub fn new(topology: Topology, catalog: VarietyCatalog, sink: A) -> Self {
        Self {
            topology: Arc::new(topology),
            clock: SessionClock::new(),
            catalog,
            sink,
        }
    }

    /// The current topology snapshot.
    pub fn snapshot(&self) -> Arc<Topology> {
        Arc::clone(&self.topology)
    }

    /// The session clock.
    pub const fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// The variety catalog.
    pub const fn catalog(&self) -> &VarietyCatalog {
        &self.catalog
    }

    /// The alert sink.
    pub const fn sink(&self) -> &A {
        &self.sink
    }

    /// Mutable access to the alert sink.
    pub const fn sink_mut(&mut self) -> &mut A {
        &mut self.sink
    }

    /// Apply `f` to a working copy and publish it if `f` succeeds.
    fn commit<T, E>(&mut self, f: impl FnOnce(&mut Topology) -> Result<T, E>) -> Result<T, E> {
        let mut next = Topology::clone(&self.topology);
        let out = f(&mut next)?;
        self.topology = Arc::new(next);
        Ok(out)
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Find a plant by id.
    pub fn get_plant_by_id(&self, id: PlantId) -> Option<&Plant> {
        self.topology.get_plant_by_id(id)
    }

    /// Find a space by id.
    pub fn get_space_by_id(&self, id: SpaceId) -> Option<&CultivationSpace> {
        self.topology.get_space_by_id(id)
    }

    /// All spaces of a room type, in ascending id order.
    pub fn get_spaces_by_room_type(&self, room_type: RoomType) -> Vec<&CultivationSpace> {
        self.topology.get_spaces_by_room_type(room_type)
    }

    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    /// Register a new space.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Topology`] if the id is taken.
    pub fn insert_space(&mut self, space: CultivationSpace) -> Result<(), EngineError> {
        self.commit(|t| t.insert_space(space))?;
        Ok(())
    }

    /// Replace a plant (manual edit).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Topology`] if the plant is unknown or the
    /// update would move it between spaces.
    pub fn update_plant(&mut self, plant: Plant) -> Result<(), EngineError> {
        self.commit(|t| t.update_plant(plant))?;
        Ok(())
    }

    /// Replace several plants, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Topology`] for the first invalid plant.
    pub fn update_plant_batch(&mut self, plants: Vec<Plant>) -> Result<(), EngineError> {
        self.commit(|t| t.update_plant_batch(plants))?;
        Ok(())
    }

    /// Manually set a plant's phase. Any phase is allowed, including an
    /// earlier one; a later tick re-advances it once elapsed time does.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Topology`] if the plant is unknown.
    pub fn update_plant_state(
        &mut self,
        id: PlantId,
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.commit(|t| t.update_plant_state(id, state, now))?;
        info!(plant_id = %id, state = %state, "Plant state set manually");
        Ok(())
    }

    /// Manually set the phase of several plants, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Topology`] if any id is unknown.
    pub fn update_plants_batch_state(
        &mut self,
        ids: &[PlantId],
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.commit(|t| t.update_plants_batch_state(ids, state, now))?;
        info!(count = ids.len(), state = %state, "Plant states set manually");
        Ok(())
    }

    /// Append a row of `variety` plants to a space.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariety`] if the variety is not in the
    /// catalog, or [`EngineError::Topology`] if the space is unknown.
    pub fn add_row(
        &mut self,
        space_id: SpaceId,
        variety_id: VarietyId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlantId>, EngineError> {
        let variety = self
            .catalog
            .get(variety_id)
            .cloned()
            .ok_or(EngineError::UnknownVariety(variety_id))?;
        let created = self.commit(|t| t.add_row(space_id, &variety, now))?;
        info!(space_id = %space_id, variety_id = %variety_id, plants = created.len(), "Row added");
        Ok(created)
    }

    /// Delete a row and renumber the rows after it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Topology`] if the space or row is unknown.
    pub fn delete_row(&mut self, space_id: SpaceId, row: u32) -> Result<Vec<PlantId>, EngineError> {
        let removed = self.commit(|t| t.delete_row(space_id, row))?;
        info!(space_id = %space_id, row, plants = removed.len(), "Row deleted");
        Ok(removed)
    }

    /// Move a plant into a flowering space now, outside the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transfer`] if the target is not a flowering
    /// space or the plant or space is unknown.
    pub fn transfer_plant_to_flowering(
        &mut self,
        plant_id: PlantId,
        target: SpaceId,
        now: DateTime<Utc>,
    ) -> Result<PlantTransfer, EngineError> {
        let moved =
            self.commit(|t| transfer::transfer_plant_to_flowering(t, plant_id, target, now))?;
        self.sink.notify(moved.to_alert(now));
        Ok(moved)
    }

    /// Edit a variety: updates the catalog and every plant holding a
    /// snapshot of it. Returns the number of plants updated.
    pub fn update_variety(&mut self, variety: PlantVariety, now: DateTime<Utc>) -> usize {
        let updated = self.propagate_varieties(std::slice::from_ref(&variety), now);
        self.catalog.upsert(variety);
        updated
    }

    /// Replace the catalog with a freshly loaded list. Every variety that
    /// differs from its catalog entry is pushed to the plants holding it.
    /// Returns the number of plants updated.
    pub fn refresh_catalog(
        &mut self,
        varieties: impl IntoIterator<Item = PlantVariety>,
        now: DateTime<Utc>,
    ) -> usize {
        let incoming = VarietyCatalog::from_varieties(varieties);
        let changed: Vec<PlantVariety> = incoming
            .iter()
            .filter(|v| self.catalog.get(v.id) != Some(*v))
            .cloned()
            .collect();
        let updated = self.propagate_varieties(&changed, now);
        self.catalog = incoming;
        info!(
            varieties = self.catalog.len(),
            changed = changed.len(),
            plants_updated = updated,
            "Variety catalog refreshed"
        );
        updated
    }

    /// Overwrite plant snapshots of `varieties`, publishing only if a plant
    /// changed.
    fn propagate_varieties(&mut self, varieties: &[PlantVariety], now: DateTime<Utc>) -> usize {
        if varieties.is_empty() {
            return 0;
        }
        let mut next = Topology::clone(&self.topology);
        let updated = varieties
            .iter()
            .map(|v| next.replace_variety(v, now))
            .fold(0_usize, usize::saturating_add);
        if updated > 0 {
            self.topology = Arc::new(next);
        }
        updated
    }

    // -------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------

    /// Make `session` current and run a tick immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Clock`] if the session has ended.
    pub fn set_current_session(
        &mut self,
        session: CultivationSession,
        now: DateTime<Utc>,
    ) -> Result<TickSummary, EngineError> {
        self.clock.set_current_session(session)?;
        Ok(self.tick(now))
    }

    /// Drop the current session; automatic advancement stops.
    pub fn clear_session(&mut self) -> Option<CultivationSession> {
        let cleared = self.clock.clear();
        if let Some(session) = &cleared {
            info!(session_id = %session.id, "Current session cleared");
        }
        cleared
    }

    /// Drop the current session only if it is `id`.
    pub fn clear_session_if(&mut self, id: SessionId) -> Option<CultivationSession> {
        if self.clock.current().is_some_and(|c| c.id == id) {
            self.clear_session()
        } else {
            None
        }
    }

    // -------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------

    /// Run the reconciler and then the transfer protocol at `now`.
    ///
    /// The snapshot is replaced only if something changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickSummary {
        let elapsed_days = self.clock.elapsed_days(now);
        let mut next = Topology::clone(&self.topology);
        let transitions = reconcile::reconcile(&mut next, &self.clock, now, &mut self.sink);
        let outcome = transfer::transfer_due_plants(&mut next, &self.clock, now, &mut self.sink);

        let summary = TickSummary {
            at: now,
            elapsed_days,
            transitions,
            transfers: outcome.transfers,
            transfers_deferred: outcome.skipped,
        };
        if !summary.is_empty() {
            self.topology = Arc::new(next);
        }
        summary
    }

    // -------------------------------------------------------------------
    // Estimates
    // -------------------------------------------------------------------

    /// Estimated dates for a variety under the current session.
    pub fn variety_estimate(&self, variety_id: VarietyId) -> Option<LifecycleEstimate> {
        let session = self.clock.anchor()?;
        let variety = self.catalog.get(variety_id)?;
        Some(LifecycleEstimate {
            flowering: estimate::estimated_flowering_date(variety, session)?,
            harvest: estimate::estimated_harvest_date(variety, session)?,
        })
    }

    /// Estimated dates for a plant under the current session.
    pub fn plant_estimate(&self, plant_id: PlantId) -> Option<LifecycleEstimate> {
        let session = self.clock.anchor()?;
        let plant = self.get_plant_by_id(plant_id)?;
        Some(LifecycleEstimate {
            flowering: estimate::plant_flowering_date(plant, session)?,
            harvest: estimate::plant_harvest_date(plant, session)?,
        })
    }

    /// Estimated harvest date of the current session.
    pub fn session_harvest_date(&self) -> Option<DateTime<Utc>> {
        estimate::session_harvest_date(self.clock.anchor()?, &self.catalog)
    }

    /// Days until a plant's next computed phase under the current session.
    pub fn days_until_next_phase(&self, plant_id: PlantId, now: DateTime<Utc>) -> Option<i64> {
        let elapsed = self.clock.elapsed_days(now)?;
        let plant = self.get_plant_by_id(plant_id)?;
        phenology::days_until_next_phase(&plant.variety, elapsed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::TimeZone;

    use super::*;
    use crate::alerts::{AlertStore, AlertType};

    fn variety(id: u32) -> PlantVariety {
        PlantVariety {
            id: VarietyId(id),
            name: format!("V{id}"),
            color: "#336699".to_owned(),
            germination_time: Some(5),
            growth_time: Some(25),
            flowering_time: Some(60),
            dry_weight: Some(30.0),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        start() + chrono::TimeDelta::days(n)
    }

    fn session() -> CultivationSession {
        CultivationSession {
            id: SessionId::new(),
            name: "Run".to_owned(),
            start_date: start(),
            end_date: None,
            is_active: true,
            selected_varieties: BTreeSet::from([VarietyId(1)]),
        }
    }

    fn engine() -> Engine<AlertStore> {
        let mut topology = Topology::new();
        topology
            .insert_space(CultivationSpace::new(SpaceId(1), "Veg", RoomType::Growth, 2))
            .unwrap();
        topology
            .insert_space(CultivationSpace::new(SpaceId(3), "Bloom", RoomType::Flowering, 2))
            .unwrap();
        let mut engine = Engine::new(
            topology,
            VarietyCatalog::from_varieties([variety(1), variety(2)]),
            AlertStore::default(),
        );
        engine.add_row(SpaceId(1), VarietyId(1), start()).unwrap();
        engine
    }

    #[test]
    fn failed_mutation_keeps_snapshot() {
        let mut engine = engine();
        let before = engine.snapshot();
        assert!(engine.delete_row(SpaceId(1), 5).is_err());
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));
    }

    #[test]
    fn earlier_snapshot_is_not_affected_by_writes() {
        let mut engine = engine();
        let before = engine.snapshot();
        engine.add_row(SpaceId(1), VarietyId(2), start()).unwrap();
        assert_eq!(before.plant_count(), 2);
        assert_eq!(engine.snapshot().plant_count(), 4);
    }

    #[test]
    fn add_row_requires_known_variety() {
        let mut engine = engine();
        assert_eq!(
            engine.add_row(SpaceId(1), VarietyId(42), start()),
            Err(EngineError::UnknownVariety(VarietyId(42)))
        );
    }

    #[test]
    fn tick_without_session_changes_nothing() {
        let mut engine = engine();
        let before = engine.snapshot();
        let summary = engine.tick(day(100));
        assert!(summary.is_empty());
        assert_eq!(summary.elapsed_days, None);
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));
    }

    #[test]
    fn setting_session_runs_a_tick() {
        let mut engine = engine();
        let summary = engine.set_current_session(session(), day(31)).unwrap();
        assert_eq!(summary.elapsed_days, Some(31));
        assert_eq!(summary.transitions.len(), 2);
        assert_eq!(summary.transfers.len(), 2);
        assert_eq!(engine.get_space_by_id(SpaceId(3)).unwrap().plants.len(), 2);
        assert_eq!(engine.sink().by_type(AlertType::Success).len(), 4);
    }

    #[test]
    fn clearing_session_stops_advancement() {
        let mut engine = engine();
        engine.set_current_session(session(), day(1)).unwrap();
        engine.clear_session();
        assert!(engine.tick(day(60)).is_empty());
    }

    #[test]
    fn direct_transfer_reports_alert() {
        let mut engine = engine();
        let id = engine.snapshot().plants().next().unwrap().id;
        let moved = engine.transfer_plant_to_flowering(id, SpaceId(3), day(3)).unwrap();
        assert_eq!(moved.to, SpaceId(3));
        assert_eq!(engine.sink().for_plant(id).len(), 1);
    }

    #[test]
    fn variety_edit_reaches_plants_and_catalog() {
        let mut engine = engine();
        let mut edited = variety(1);
        edited.growth_time = Some(40);
        assert_eq!(engine.update_variety(edited, start()), 2);
        assert!(engine
            .snapshot()
            .plants()
            .all(|p| p.variety.growth_time == Some(40)));
        assert_eq!(engine.catalog().get(VarietyId(1)).and_then(|v| v.growth_time), Some(40));
    }

    #[test]
    fn catalog_refresh_reaches_plants() {
        let mut engine = engine();
        let before = engine.snapshot();
        let mut edited = variety(1);
        edited.growth_time = Some(40);

        assert_eq!(engine.refresh_catalog([edited, variety(2)], day(2)), 2);
        assert!(engine
            .snapshot()
            .plants()
            .all(|p| p.variety.growth_time == Some(40) && p.last_updated == day(2)));
        assert_eq!(engine.catalog().get(VarietyId(1)).and_then(|v| v.growth_time), Some(40));
        assert!(before.plants().all(|p| p.variety.growth_time == Some(25)));

        // Plants now follow the new timing: still growing on day 31.
        engine.set_current_session(session(), day(31)).unwrap();
        assert!(engine.snapshot().plants().all(|p| p.state == Phase::Growth));
    }

    #[test]
    fn unchanged_refresh_keeps_snapshot() {
        let mut engine = engine();
        let before = engine.snapshot();
        assert_eq!(engine.refresh_catalog([variety(1)], day(2)), 0);
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));
        assert_eq!(engine.catalog().len(), 1);
    }

    #[test]
    fn estimates_need_a_session() {
        let mut engine = engine();
        let id = engine.snapshot().plants().next().unwrap().id;
        assert!(engine.plant_estimate(id).is_none());

        engine.set_current_session(session(), start()).unwrap();
        let estimate = engine.plant_estimate(id).unwrap();
        assert_eq!(estimate.flowering, day(30));
        assert_eq!(estimate.harvest, day(90));
        assert_eq!(engine.variety_estimate(VarietyId(2)).map(|e| e.harvest), Some(day(90)));
        assert_eq!(engine.session_harvest_date(), Some(day(90)));
        assert_eq!(engine.days_until_next_phase(id, day(10)), Some(21));
    }
}
