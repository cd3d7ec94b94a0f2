//! Error types for the `canopy-topology` crate.

use canopy_types::{PlantId, SpaceId};

/// Errors that can occur during topology operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// A space was not found in the topology.
    #[error("space not found: {0}")]
    SpaceNotFound(SpaceId),

    /// A plant was not found in any space.
    #[error("plant not found: {0}")]
    PlantNotFound(PlantId),

    /// A space with the same id is already registered.
    #[error("duplicate space id: {0}")]
    DuplicateSpace(SpaceId),

    /// The row does not exist in the space.
    #[error("row {row} is out of range for space {space} (rows: {rows})")]
    RowOutOfRange {
        /// The space.
        space: SpaceId,
        /// The requested row.
        row: u32,
        /// The space's current row count.
        rows: u32,
    },

    /// A plain plant update tried to move the plant to another space.
    #[error("plant {plant} cannot move from space {from} to {to} outside a transfer")]
    SpaceChangeNotAllowed {
        /// The plant.
        plant: PlantId,
        /// The space currently owning the plant.
        from: SpaceId,
        /// The space requested by the update.
        to: SpaceId,
    },

    /// The plant already lives in the requested target space.
    #[error("plant {plant} is already in space {space}")]
    AlreadyInSpace {
        /// The plant.
        plant: PlantId,
        /// The space.
        space: SpaceId,
    },

    /// Arithmetic overflow while computing row or column numbers.
    #[error("arithmetic overflow in topology calculation")]
    ArithmeticOverflow,
}
