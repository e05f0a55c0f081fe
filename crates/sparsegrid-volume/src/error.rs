//! Volume loading and ingestion errors.

use std::path::PathBuf;

use glam::IVec3;
use thiserror::Error;

/// Errors raised while reading sources or packing them.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// Invalid topology configuration or transform.
    #[error(transparent)]
    Core(#[from] sparsegrid_core::Error),

    /// Source tree shape differs from the configured topology.
    #[error("Incorrect tree type: expected {expected}, found {found}")]
    TopologyMismatch { expected: String, found: String },

    /// Source root covers a different domain than the configured topology.
    #[error("Domain mismatch: expected 2^{expected} voxels per axis, found 2^{found}")]
    DomainMismatch { expected: u32, found: u32 },

    /// Backing file could not be opened or read.
    #[error("Error loading {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backing file could not be created or written.
    #[error("Error writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container payload could not be decoded.
    #[error("Error decoding {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    /// Container payload could not be encoded.
    #[error("Error encoding {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    /// File does not start with the container magic.
    #[error("{path} is not a grid container")]
    BadMagic { path: PathBuf },

    /// Container written by an unknown format revision.
    #[error("{path} uses unsupported container version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    /// Container holds no grids.
    #[error("{path} contains no grids")]
    EmptyContainer { path: PathBuf },

    /// No grid with the requested name.
    #[error("Grid not found: {name}")]
    GridNotFound { name: String },

    /// Decoded grid violates its own structure.
    #[error("Corrupt grid {name}: {reason}")]
    CorruptGrid { name: String, reason: String },

    /// Dense block of the wrong size.
    #[error("Leaf block at {origin} has {found} values, expected {expected}")]
    InvalidLeafBlock {
        origin: IVec3,
        expected: u64,
        found: u64,
    },

    /// Source reported an active child without a dense block.
    #[error("Missing leaf block at {origin}")]
    MissingLeafBlock { origin: IVec3 },

    /// Coordinate outside the root domain.
    #[error("Coordinate {coord} is outside the domain [0, {domain_res})")]
    OutOfDomain { coord: IVec3, domain_res: u64 },

    /// Level unusable for the requested edit.
    #[error("Invalid level {level}: {reason}")]
    InvalidLevel { level: u32, reason: &'static str },

    /// Emitted nodes disagree with the counts the source reported.
    #[error("Node count mismatch: source reported {expected}, traversal produced {actual}")]
    NodeCountMismatch { expected: u64, actual: u64 },

    /// Emitted payloads disagree with the tile/leaf split the source reported.
    #[error("Reservation mismatch for {what}: reserved {expected}, traversal produced {actual}")]
    ReservationMismatch {
        what: &'static str,
        expected: u64,
        actual: u64,
    },

    /// Reservation does not fit in memory addressing.
    #[error("Capacity overflow reserving {what}")]
    CapacityOverflow { what: &'static str },

    /// Process-wide context used before `init`.
    #[error("Grid context is not initialized")]
    NotInitialized,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, VolumeError>;
