//! Build the starting engine from configuration.
//!
//! Spaces are registered in the order listed and filled with their initial
//! rows of the configured variety. The optional startup session is turned
//! into a [`SessionDraft`] for the session manager; it is not activated
//! here.

use canopy_topology::Topology;
use canopy_types::CultivationSpace;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::alerts::AlertSink;
use crate::catalog::VarietyCatalog;
use crate::config::{CanopyConfig, SessionConfig};
use crate::engine::{Engine, EngineError};
use crate::store::SessionDraft;

/// Create an engine with the configured catalog and spaces.
///
/// # Errors
///
/// Returns [`EngineError`] if a space id repeats or initial rows name no
/// variety or one missing from the catalog.
pub fn seed_engine<A: AlertSink>(
    config: &CanopyConfig,
    sink: A,
    now: DateTime<Utc>,
) -> Result<Engine<A>, EngineError> {
    let catalog = VarietyCatalog::from_varieties(config.varieties.iter().cloned());
    let mut engine = Engine::new(Topology::new(), catalog, sink);

    for space in &config.spaces {
        engine.insert_space(CultivationSpace::new(
            space.id,
            space.name.clone(),
            space.room_type,
            space.plants_per_row,
        ))?;
        if space.initial_rows == 0 {
            continue;
        }
        let variety = space.variety.ok_or(EngineError::NoSeedVariety(space.id))?;
        for _ in 0..space.initial_rows {
            engine.add_row(space.id, variety, now)?;
        }
    }

    let snapshot = engine.snapshot();
    info!(
        spaces = snapshot.space_count(),
        plants = snapshot.plant_count(),
        varieties = engine.catalog().len(),
        "Topology seeded"
    );
    Ok(engine)
}

/// The draft for the configured startup session.
pub fn session_draft(config: &SessionConfig) -> SessionDraft {
    SessionDraft {
        name: config.name.clone(),
        start_date: config.start_date,
        selected_varieties: config.varieties.iter().copied().collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use canopy_types::{RoomType, SpaceId, VarietyId};

    use super::*;
    use crate::alerts::AlertStore;

    const YAML: &str = r##"
varieties:
  - id: 1
    name: "Northern Lights"
    color: "#4caf50"
    germination_time: 5
    growth_time: 25
    flowering_time: 60
spaces:
  - id: 7
    name: "Veg"
    room_type: growth
    plants_per_row: 25
    initial_rows: 3
    variety: 1
  - id: 9
    name: "Bloom"
    room_type: flowering
    plants_per_row: 12
session:
  name: "Spring"
  start_date: "2023-01-01T00:00:00Z"
  varieties: [1]
"##;

    #[test]
    fn seeds_spaces_and_rows() {
        let config = CanopyConfig::parse(YAML).unwrap();
        let engine = seed_engine(&config, AlertStore::default(), Utc::now()).unwrap();
        let veg = engine.get_space_by_id(SpaceId(7)).unwrap();
        assert_eq!(veg.rows, 3);
        assert_eq!(veg.plants.len(), 75);
        assert_eq!(engine.get_spaces_by_room_type(RoomType::Flowering).len(), 1);
        assert!(engine.clock().current().is_none());
    }

    #[test]
    fn draft_carries_selected_varieties() {
        let config = CanopyConfig::parse(YAML).unwrap();
        let draft = session_draft(config.session.as_ref().unwrap());
        assert_eq!(draft.name, "Spring");
        assert!(draft.selected_varieties.contains(&VarietyId(1)));
    }
}
