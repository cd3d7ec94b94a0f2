//! Row management on a single cultivation space.
//!
//! Rows are numbered `1..=rows` with no gaps. Adding a row appends row
//! `rows + 1` filled with `plants_per_row` plants; deleting a row drops its
//! plants and shifts every later row down by one so numbering stays
//! contiguous.

use std::collections::BTreeSet;

use canopy_types::{CultivationSpace, Plant, PlantId, PlantVariety, Position};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::TopologyError;

/// Append a new row to `space`, populated with one plant per column.
///
/// Every new plant shares `variety` and starts in the phase implied by the
/// room type (growth rooms seed `growth`, flowering rooms seed
/// `flowering`). Returns the ids of the created plants in column order.
///
/// # Errors
///
/// Returns [`TopologyError::ArithmeticOverflow`] if the row counter would
/// overflow.
pub fn add_row(
    space: &mut CultivationSpace,
    variety: &PlantVariety,
    now: DateTime<Utc>,
) -> Result<Vec<PlantId>, TopologyError> {
    let row = space
        .rows
        .checked_add(1)
        .ok_or(TopologyError::ArithmeticOverflow)?;
    let state = space.room_type.seeded_phase();

    let capacity = usize::try_from(space.plants_per_row).unwrap_or(0);
    let mut created = Vec::with_capacity(capacity);
    space.plants.reserve(capacity);
    for column in 1..=space.plants_per_row {
        let plant = Plant::new(
            Position {
                space: space.id,
                row,
                column,
            },
            variety.clone(),
            state,
            now,
        );
        created.push(plant.id);
        space.plants.push(plant);
    }
    space.rows = row;

    debug!(
        space_id = %space.id,
        row,
        plants = created.len(),
        variety = %variety.id,
        "Row added"
    );
    Ok(created)
}

/// Remove `row` from `space`, renumbering later rows down by one.
///
/// Returns the ids of the removed plants.
///
/// # Errors
///
/// Returns [`TopologyError::RowOutOfRange`] if `row` is not in `1..=rows`.
pub fn delete_row(space: &mut CultivationSpace, row: u32) -> Result<Vec<PlantId>, TopologyError> {
    if row == 0 || row > space.rows {
        return Err(TopologyError::RowOutOfRange {
            space: space.id,
            row,
            rows: space.rows,
        });
    }

    let mut removed = Vec::new();
    space.plants.retain(|plant| {
        if plant.position.row == row {
            removed.push(plant.id);
            false
        } else {
            true
        }
    });
    for plant in &mut space.plants {
        if plant.position.row > row {
            plant.position.row = plant.position.row.saturating_sub(1);
        }
    }
    space.rows = space.rows.saturating_sub(1);

    debug!(
        space_id = %space.id,
        row,
        removed = removed.len(),
        rows = space.rows,
        "Row deleted"
    );
    Ok(removed)
}

/// The set of distinct row numbers occupied by plants in `space`.
pub fn row_numbers(space: &CultivationSpace) -> BTreeSet<u32> {
    space.plants.iter().map(|p| p.position.row).collect()
}

/// Whether the occupied rows are exactly `1..=rows`.
pub fn has_contiguous_rows(space: &CultivationSpace) -> bool {
    row_numbers(space).into_iter().eq(1..=space.rows)
}

/// Plants in a given row, in column order.
pub fn plants_in_row(space: &CultivationSpace, row: u32) -> Vec<&Plant> {
    let mut plants: Vec<&Plant> = space
        .plants
        .iter()
        .filter(|p| p.position.row == row)
        .collect();
    plants.sort_by_key(|p| p.position.column);
    plants
}
