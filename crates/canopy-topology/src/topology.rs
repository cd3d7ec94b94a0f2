//! The facility-wide collection of cultivation spaces.
//!
//! Spaces are held behind [`Arc`] so that cloning a [`Topology`] is cheap
//! and shares every untouched space with the original. Writers clone the
//! topology, mutate the clone (which copies only the spaces it touches via
//! [`Arc::make_mut`]) and publish it as the next snapshot. Readers holding
//! the previous snapshot keep seeing a fully-formed value.

use std::collections::BTreeMap;
use std::sync::Arc;

use canopy_types::{CultivationSpace, Plant, PlantId, PlantVariety, SpaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TopologyError;
use crate::space;

/// Every cultivation space, indexed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Spaces in ascending id order.
    spaces: BTreeMap<SpaceId, Arc<CultivationSpace>>,
}

impl Topology {
    /// Create an empty topology.
    pub const fn new() -> Self {
        Self {
            spaces: BTreeMap::new(),
        }
    }

    /// Register a space.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::DuplicateSpace`] if the id is taken.
    pub fn insert_space(&mut self, space: CultivationSpace) -> Result<(), TopologyError> {
        if self.spaces.contains_key(&space.id) {
            return Err(TopologyError::DuplicateSpace(space.id));
        }
        info!(
            space_id = %space.id,
            name = %space.name,
            room_type = %space.room_type,
            "Space registered"
        );
        self.spaces.insert(space.id, Arc::new(space));
        Ok(())
    }

    /// Number of spaces.
    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    /// Total number of plants across all spaces.
    pub fn plant_count(&self) -> usize {
        self.spaces.values().map(|s| s.plants.len()).sum()
    }

    /// Iterate over spaces in ascending id order.
    pub fn spaces(&self) -> impl Iterator<Item = &CultivationSpace> {
        self.spaces.values().map(AsRef::as_ref)
    }

    /// Iterate over every plant in every space.
    pub fn plants(&self) -> impl Iterator<Item = &Plant> {
        self.spaces.values().flat_map(|s| s.plants.iter())
    }

    /// Whether two topologies share the same allocation for a space.
    ///
    /// Used to observe structural sharing between snapshots.
    pub fn shares_space_with(&self, other: &Self, id: SpaceId) -> bool {
        match (self.spaces.get(&id), other.spaces.get(&id)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Mutable access to one space, copying it first if it is shared with
    /// another snapshot.
    pub(crate) fn space_mut(&mut self, id: SpaceId) -> Result<&mut CultivationSpace, TopologyError> {
        self.spaces
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or(TopologyError::SpaceNotFound(id))
    }

    /// Ids of the spaces holding at least one plant matching `pred`.
    pub(crate) fn spaces_where(&self, pred: impl Fn(&Plant) -> bool) -> Vec<SpaceId> {
        self.spaces
            .iter()
            .filter(|(_, s)| s.plants.iter().any(&pred))
            .map(|(id, _)| *id)
            .collect()
    }

    // -------------------------------------------------------------------
    // Row management
    // -------------------------------------------------------------------

    /// Append a row of `variety` plants to a space.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::SpaceNotFound`] if the space is unknown, or
    /// the error from [`space::add_row`].
    pub fn add_row(
        &mut self,
        space_id: SpaceId,
        variety: &PlantVariety,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlantId>, TopologyError> {
        space::add_row(self.space_mut(space_id)?, variety, now)
    }

    /// Delete a row from a space, renumbering later rows.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::SpaceNotFound`] if the space is unknown, or
    /// [`TopologyError::RowOutOfRange`] if the row does not exist.
    pub fn delete_row(&mut self, space_id: SpaceId, row: u32) -> Result<Vec<PlantId>, TopologyError> {
        space::delete_row(self.space_mut(space_id)?, row)
    }
}
