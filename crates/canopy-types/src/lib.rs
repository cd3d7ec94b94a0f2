//! Shared type definitions for the Canopy cultivation tracker.
//!
//! This crate is the single source of truth for the data model shared by
//! the topology, the lifecycle engine, and the binary. Types defined here
//! flow downstream to `TypeScript` via `ts-rs` for the grow-room dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers (UUID and numeric)
//! - [`enums`] -- Lifecycle [`Phase`] and [`RoomType`]
//! - [`structs`] -- Plants, varieties, cultivation spaces and sessions

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{Phase, RoomType};
pub use ids::{PlantId, SessionId, SpaceId, VarietyId};
pub use structs::{CultivationSession, CultivationSpace, Plant, PlantVariety, Position};
