//! Plant and space lookup across the whole topology, plus plant writes.
//!
//! Lookups are linear scans over every space. At the population this
//! tracker targets (a few thousand plants) that is cheap; an id index is
//! the first thing to add if that changes.

use canopy_types::{CultivationSpace, Phase, Plant, PlantId, PlantVariety, RoomType, SpaceId};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::TopologyError;
use crate::topology::Topology;

impl Topology {
    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Find a plant by id in any space.
    pub fn get_plant_by_id(&self, id: PlantId) -> Option<&Plant> {
        self.plants().find(|p| p.id == id)
    }

    /// Find a space by id.
    pub fn get_space_by_id(&self, id: SpaceId) -> Option<&CultivationSpace> {
        self.spaces().find(|s| s.id == id)
    }

    /// All spaces of the given room type, in ascending id order.
    pub fn get_spaces_by_room_type(&self, room_type: RoomType) -> Vec<&CultivationSpace> {
        self.spaces().filter(|s| s.room_type == room_type).collect()
    }

    /// The space currently owning a plant.
    pub fn space_of(&self, id: PlantId) -> Option<SpaceId> {
        self.spaces()
            .find(|s| s.plants.iter().any(|p| p.id == id))
            .map(|s| s.id)
    }

    // -------------------------------------------------------------------
    // Plant writes
    // -------------------------------------------------------------------

    /// Mutable access to a plant, copying its space if shared.
    fn plant_mut(&mut self, id: PlantId) -> Result<&mut Plant, TopologyError> {
        let space_id = self.space_of(id).ok_or(TopologyError::PlantNotFound(id))?;
        self.space_mut(space_id)?
            .plants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(TopologyError::PlantNotFound(id))
    }

    /// Replace a stored plant with `plant`, matched by id.
    ///
    /// A plain update may not move a plant between spaces (only a transfer
    /// may), and a changed row must exist in the owning space.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::PlantNotFound`],
    /// [`TopologyError::SpaceChangeNotAllowed`], or
    /// [`TopologyError::RowOutOfRange`].
    pub fn update_plant(&mut self, plant: Plant) -> Result<(), TopologyError> {
        self.validate_update(&plant)?;
        let stored = self.plant_mut(plant.id)?;
        *stored = plant;
        Ok(())
    }

    /// Replace several plants. Either every update is applied or none is.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered; nothing is written.
    pub fn update_plant_batch(&mut self, plants: Vec<Plant>) -> Result<(), TopologyError> {
        for plant in &plants {
            self.validate_update(plant)?;
        }
        let count = plants.len();
        for plant in plants {
            let stored = self.plant_mut(plant.id)?;
            *stored = plant;
        }
        debug!(count, "Plant batch updated");
        Ok(())
    }

    /// Set a single plant's phase and stamp `last_updated`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::PlantNotFound`] if the id is unknown.
    pub fn update_plant_state(
        &mut self,
        id: PlantId,
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<(), TopologyError> {
        let plant = self.plant_mut(id)?;
        plant.state = state;
        plant.last_updated = now;
        Ok(())
    }

    /// Set a plant's phase when its owning space is already known. Only
    /// that space is searched.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::SpaceNotFound`] for an unknown space, or
    /// [`TopologyError::PlantNotFound`] if the plant is not in it.
    pub fn update_plant_state_in(
        &mut self,
        space_id: SpaceId,
        id: PlantId,
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<(), TopologyError> {
        let plant = self
            .space_mut(space_id)?
            .plants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(TopologyError::PlantNotFound(id))?;
        plant.state = state;
        plant.last_updated = now;
        Ok(())
    }

    /// Set the phase of several plants. Either all ids resolve and every
    /// plant is written, or nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::PlantNotFound`] for the first unknown id.
    pub fn update_plants_batch_state(
        &mut self,
        ids: &[PlantId],
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<(), TopologyError> {
        if let Some(missing) = ids.iter().find(|id| self.get_plant_by_id(**id).is_none()) {
            return Err(TopologyError::PlantNotFound(*missing));
        }
        for space_id in self.spaces_where(|p| ids.contains(&p.id)) {
            for plant in &mut self.space_mut(space_id)?.plants {
                if ids.contains(&plant.id) {
                    plant.state = state;
                    plant.last_updated = now;
                }
            }
        }
        debug!(count = ids.len(), state = %state, "Plant batch state updated");
        Ok(())
    }

    /// Move a plant into `target`, appending it to the target's collection
    /// and setting its phase. Row and column are left as they were.
    ///
    /// Returns the id of the space the plant left.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::PlantNotFound`],
    /// [`TopologyError::SpaceNotFound`] for an unknown target, or
    /// [`TopologyError::AlreadyInSpace`] if the plant is already there.
    pub fn relocate_plant(
        &mut self,
        id: PlantId,
        target: SpaceId,
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<SpaceId, TopologyError> {
        let source = self.space_of(id).ok_or(TopologyError::PlantNotFound(id))?;
        if source == target {
            return Err(TopologyError::AlreadyInSpace {
                plant: id,
                space: target,
            });
        }
        if self.get_space_by_id(target).is_none() {
            return Err(TopologyError::SpaceNotFound(target));
        }

        let source_space = self.space_mut(source)?;
        let index = source_space
            .plants
            .iter()
            .position(|p| p.id == id)
            .ok_or(TopologyError::PlantNotFound(id))?;
        let mut plant = source_space.plants.remove(index);

        plant.position.space = target;
        plant.state = state;
        plant.last_updated = now;
        self.space_mut(target)?.plants.push(plant);

        debug!(plant_id = %id, from = %source, to = %target, "Plant relocated");
        Ok(source)
    }

    /// Overwrite the variety snapshot of every plant that references
    /// `variety.id`. Returns the number of plants updated.
    pub fn replace_variety(&mut self, variety: &PlantVariety, now: DateTime<Utc>) -> usize {
        let mut updated: usize = 0;
        for space_id in self.spaces_where(|p| p.variety.id == variety.id) {
            let Ok(space) = self.space_mut(space_id) else {
                continue;
            };
            for plant in space.plants.iter_mut().filter(|p| p.variety.id == variety.id) {
                plant.variety = variety.clone();
                plant.last_updated = now;
                updated = updated.saturating_add(1);
            }
        }
        info!(variety_id = %variety.id, updated, "Variety propagated to plants");
        updated
    }

    fn validate_update(&self, plant: &Plant) -> Result<(), TopologyError> {
        let stored = self
            .get_plant_by_id(plant.id)
            .ok_or(TopologyError::PlantNotFound(plant.id))?;
        let from = stored.position.space;
        if plant.position.space != from {
            return Err(TopologyError::SpaceChangeNotAllowed {
                plant: plant.id,
                from,
                to: plant.position.space,
            });
        }
        if plant.position.row != stored.position.row {
            let rows = self.get_space_by_id(from).map_or(0, |s| s.rows);
            if plant.position.row == 0 || plant.position.row > rows {
                return Err(TopologyError::RowOutOfRange {
                    space: from,
                    row: plant.position.row,
                    rows,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use canopy_types::VarietyId;

    use super::*;

    fn variety(id: u32) -> PlantVariety {
        PlantVariety {
            id: VarietyId(id),
            name: format!("Variety {id}"),
            color: "#00aa00".to_owned(),
            germination_time: Some(5),
            growth_time: Some(25),
            flowering_time: Some(60),
            dry_weight: None,
        }
    }

    fn topology() -> Topology {
        let mut t = Topology::new();
        t.insert_space(CultivationSpace::new(SpaceId(1), "Veg", RoomType::Growth, 3))
            .unwrap();
        t.insert_space(CultivationSpace::new(SpaceId(4), "Bloom B", RoomType::Flowering, 3))
            .unwrap();
        t.insert_space(CultivationSpace::new(SpaceId(2), "Bloom A", RoomType::Flowering, 3))
            .unwrap();
        t.add_row(SpaceId(1), &variety(1), Utc::now()).unwrap();
        t.add_row(SpaceId(1), &variety(2), Utc::now()).unwrap();
        t
    }

    #[test]
    fn state_update_within_known_space() {
        let mut t = topology();
        let id = t.plants().next().unwrap().id;
        t.update_plant_state_in(SpaceId(1), id, Phase::Flowering, Utc::now())
            .unwrap();
        assert_eq!(t.get_plant_by_id(id).unwrap().state, Phase::Flowering);
        assert_eq!(
            t.update_plant_state_in(SpaceId(2), id, Phase::Drying, Utc::now()),
            Err(TopologyError::PlantNotFound(id))
        );
        assert_eq!(
            t.update_plant_state_in(SpaceId(9), id, Phase::Drying, Utc::now()),
            Err(TopologyError::SpaceNotFound(SpaceId(9)))
        );
    }

    #[test]
    fn lookups_find_plants_and_spaces() {
        let t = topology();
        let plant = t.plants().next().unwrap().clone();
        assert_eq!(t.get_plant_by_id(plant.id), Some(&plant));
        assert_eq!(t.space_of(plant.id), Some(SpaceId(1)));
        assert_eq!(t.get_space_by_id(SpaceId(4)).map(|s| s.name.as_str()), Some("Bloom B"));
        assert!(t.get_plant_by_id(PlantId::new()).is_none());
    }

    #[test]
    fn spaces_by_room_type_are_id_ordered() {
        let t = topology();
        let ids: Vec<SpaceId> = t
            .get_spaces_by_room_type(RoomType::Flowering)
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![SpaceId(2), SpaceId(4)]);
    }

    #[test]
    fn update_plant_rejects_space_change() {
        let mut t = topology();
        let mut plant = t.plants().next().unwrap().clone();
        plant.position.space = SpaceId(2);
        assert!(matches!(
            t.update_plant(plant),
            Err(TopologyError::SpaceChangeNotAllowed { .. })
        ));
    }

    #[test]
    fn update_plant_rejects_missing_row() {
        let mut t = topology();
        let mut plant = t.plants().next().unwrap().clone();
        plant.position.row = 3;
        assert!(matches!(
            t.update_plant(plant),
            Err(TopologyError::RowOutOfRange { row: 3, rows: 2, .. })
        ));
    }

    #[test]
    fn update_plant_writes_readings() {
        let mut t = topology();
        let mut plant = t.plants().next().unwrap().clone();
        plant.ec = 1.8;
        plant.ph = 6.2;
        t.update_plant(plant.clone()).unwrap();
        assert_eq!(t.get_plant_by_id(plant.id), Some(&plant));
    }

    #[test]
    fn batch_update_is_all_or_nothing() {
        let mut t = topology();
        let mut good = t.plants().next().unwrap().clone();
        good.ec = 2.0;
        let mut bad = t.plants().nth(1).unwrap().clone();
        bad.position.space = SpaceId(4);

        assert!(t.update_plant_batch(vec![good.clone(), bad]).is_err());
        assert!((t.get_plant_by_id(good.id).unwrap().ec - 0.0).abs() < f64::EPSILON);

        t.update_plant_batch(vec![good.clone()]).unwrap();
        assert!((t.get_plant_by_id(good.id).unwrap().ec - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn batch_state_update_requires_every_id() {
        let mut t = topology();
        let ids: Vec<PlantId> = t.plants().take(4).map(|p| p.id).collect();
        let mut with_unknown = ids.clone();
        with_unknown.push(PlantId::new());

        assert!(t
            .update_plants_batch_state(&with_unknown, Phase::Drying, Utc::now())
            .is_err());
        assert!(t.plants().all(|p| p.state == Phase::Growth));

        t.update_plants_batch_state(&ids, Phase::Drying, Utc::now()).unwrap();
        let drying = t.plants().filter(|p| p.state == Phase::Drying).count();
        assert_eq!(drying, 4);
    }

    #[test]
    fn relocate_moves_plant_between_spaces() {
        let mut t = topology();
        let plant = t.plants().next().unwrap().clone();
        let source = t
            .relocate_plant(plant.id, SpaceId(2), Phase::Flowering, Utc::now())
            .unwrap();

        assert_eq!(source, SpaceId(1));
        assert_eq!(t.space_of(plant.id), Some(SpaceId(2)));
        let moved = t.get_plant_by_id(plant.id).unwrap();
        assert_eq!(moved.position.space, SpaceId(2));
        assert_eq!(moved.position.row, plant.position.row);
        assert_eq!(moved.state, Phase::Flowering);
        assert_eq!(t.get_space_by_id(SpaceId(1)).unwrap().plants.len(), 5);
    }

    #[test]
    fn relocate_into_same_space_fails() {
        let mut t = topology();
        let plant = t.plants().next().unwrap().clone();
        assert!(matches!(
            t.relocate_plant(plant.id, SpaceId(1), Phase::Flowering, Utc::now()),
            Err(TopologyError::AlreadyInSpace { .. })
        ));
        assert!(matches!(
            t.relocate_plant(plant.id, SpaceId(99), Phase::Flowering, Utc::now()),
            Err(TopologyError::SpaceNotFound(SpaceId(99)))
        ));
    }

    #[test]
    fn replace_variety_touches_only_matching_plants() {
        let mut t = topology();
        let mut edited = variety(2);
        edited.flowering_time = Some(75);
        let updated = t.replace_variety(&edited, Utc::now());

        assert_eq!(updated, 3);
        assert!(t
            .plants()
            .filter(|p| p.variety.id == VarietyId(2))
            .all(|p| p.variety.flowering_time == Some(75)));
        assert!(t
            .plants()
            .filter(|p| p.variety.id == VarietyId(1))
            .all(|p| p.variety.flowering_time == Some(60)));
    }
}
