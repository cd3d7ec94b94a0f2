//! Space topology and plant registry for the Canopy cultivation tracker.
//!
//! This crate models the physical layout: cultivation spaces as grids of
//! rows, each row populated with a fixed number of plants, and the
//! whole-facility [`Topology`] that owns every space.
//!
//! # Modules
//!
//! - [`error`] -- Error types for topology operations.
//! - [`space`] -- Row insertion and removal on a single space, keeping row
//!   numbers contiguous.
//! - [`topology`] -- The copy-on-write collection of spaces.
//! - [`registry`] -- Plant and space lookup plus plant writes across the
//!   whole topology.

pub mod error;
pub mod registry;
pub mod space;
pub mod topology;

// Re-export primary types at crate root.
pub use error::TopologyError;
pub use space::{add_row, delete_row, has_contiguous_rows, row_numbers};
pub use topology::Topology;
