//! Variety catalog: the list of [`PlantVariety`] records supplying the
//! timing fields the phenology model depends on.
//!
//! The catalog is loaded once at startup and may be refreshed wholesale.
//! Editing a single variety goes through the engine so the change also
//! reaches every plant holding a snapshot of it.

use std::collections::BTreeMap;

use canopy_types::{PlantVariety, VarietyId};

/// Varieties indexed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarietyCatalog {
    /// All known varieties.
    varieties: BTreeMap<VarietyId, PlantVariety>,
}

impl VarietyCatalog {
    /// An empty catalog.
    pub const fn new() -> Self {
        Self {
            varieties: BTreeMap::new(),
        }
    }

    /// Build a catalog from a list. Later duplicates win.
    pub fn from_varieties(varieties: impl IntoIterator<Item = PlantVariety>) -> Self {
        Self {
            varieties: varieties.into_iter().map(|v| (v.id, v)).collect(),
        }
    }

    /// Look up a variety.
    pub fn get(&self, id: VarietyId) -> Option<&PlantVariety> {
        self.varieties.get(&id)
    }

    /// Insert or replace a variety. Returns the previous record.
    pub fn upsert(&mut self, variety: PlantVariety) -> Option<PlantVariety> {
        self.varieties.insert(variety.id, variety)
    }

    /// Replace the entire catalog (refresh from the remote list).
    pub fn replace_all(&mut self, varieties: impl IntoIterator<Item = PlantVariety>) {
        *self = Self::from_varieties(varieties);
    }

    /// Iterate in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &PlantVariety> {
        self.varieties.values()
    }

    /// Number of varieties.
    pub fn len(&self) -> usize {
        self.varieties.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.varieties.is_empty()
    }
}
