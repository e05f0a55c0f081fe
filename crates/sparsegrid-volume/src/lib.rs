//! Sparse volume sources and their ingestion into packed renderer buffers.
//!
//! A [`GridSource`] is any sparse tree following the configured
//! [`LevelTopology`](sparsegrid_core::LevelTopology). [`TreeIngestor`] walks
//! it once and produces an immutable [`PackedGridBuffer`]. [`MemoryGrid`] is
//! the in-memory source stored in [`GridFile`] containers.

pub mod container;
pub mod context;
pub mod error;
pub mod ingest;
pub mod mask;
pub mod memory;
pub mod packed;
pub mod source;

pub use container::{GridFile, GridSelection, GRID_FILE_MAGIC, GRID_FILE_VERSION};
pub use error::{Result, VolumeError};
pub use ingest::TreeIngestor;
pub use mask::NodeMask;
pub use memory::{MemoryGrid, MemoryNode};
pub use packed::{
    GpuNodeRecord, NodeFormat, NodeHandle, NodePayload, NodeRecord, PackedGridBuffer,
    PackedGridBuilder, Reservation,
};
pub use source::{GridSource, SourceNode};
