//! Core types and addressing math for hierarchical sparse volume grids.
//!
//! This crate provides the pieces every other part of the workspace builds on:
//! - Level topology tables derived from a branching schedule
//! - Bit-shift coordinate mapping between domain offsets and node voxels
//! - Grid transforms and the packed index-to-object layout
//! - Value ranges and error types

pub mod error;
pub mod mapping;
pub mod topology;
pub mod transform;
pub mod types;

pub use error::{Error, Result};
pub use mapping::CoordinateMapper;
pub use topology::{LevelInfo, LevelTopology, TopologyConfig};
pub use transform::{GridTransform, IndexToObject};
pub use types::ValueRange;

/// Workspace-wide constants
pub mod constants {
    /// Default branching schedule (log2 voxels per axis, root to leaf).
    pub const DEFAULT_LOG_RES: [u32; 4] = [6, 5, 4, 3];
    /// Smallest supported tree depth (a root plus a leaf level).
    pub const MIN_DEPTH: usize = 2;
    /// Largest log-resolution a single level may store (1024 voxels per axis).
    pub const MAX_LEVEL_LOG_RES: u32 = 10;
    /// Largest cumulative log-resolution; keeps every domain coordinate in `i32`.
    pub const MAX_TOTAL_LOG_RES: u32 = 30;
    /// Prefix of the topology identifier, followed by the non-root log-resolutions.
    pub const TOPOLOGY_TYPE_PREFIX: &str = "Tree_float";
}
