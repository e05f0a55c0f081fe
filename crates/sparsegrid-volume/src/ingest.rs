//! Tree ingestion into packed renderer buffers.
//!
//! The walk is depth-first. Above the one-above-leaf level a node's active
//! tiles are emitted one level below it, then its active children are
//! visited in slot order. One level above the leaves the node's voxel table
//! is scanned directly (x slowest, z fastest), emitting a tile record for
//! every set tile bit and otherwise a dense record for a set child bit.

use std::sync::Arc;

use glam::UVec3;
use rayon::prelude::*;
use sparsegrid_core::{IndexToObject, LevelTopology};
use tracing::{debug, info};

use crate::context;
use crate::error::{Result, VolumeError};
use crate::packed::{PackedGridBuffer, PackedGridBuilder};
use crate::source::{GridSource, SourceNode};

/// Packs source trees that follow one configured topology.
#[derive(Clone, Debug)]
pub struct TreeIngestor {
    topology: Arc<LevelTopology>,
}

impl TreeIngestor {
    /// Create an ingestor for `topology`.
    pub fn new(topology: impl Into<Arc<LevelTopology>>) -> Self {
        Self {
            topology: topology.into(),
        }
    }

    /// Create an ingestor for the process-wide topology.
    pub fn from_context() -> Result<Self> {
        context::topology()
            .map(Self::new)
            .ok_or(VolumeError::NotInitialized)
    }

    /// Configured topology.
    #[inline]
    pub fn topology(&self) -> &LevelTopology {
        &self.topology
    }

    /// Pack `source` into a fresh buffer.
    ///
    /// Nothing is returned unless the whole tree was packed.
    #[tracing::instrument(level = "trace", skip_all, fields(grid = source.name()))]
    pub fn ingest<S: GridSource>(&self, source: &S) -> Result<PackedGridBuffer> {
        let (index_to_object, mut builder) = self.prepare(source)?;
        self.visit(source.root(), 0, &mut builder)?;
        self.complete(source, builder, index_to_object)
    }

    /// Like [`Self::ingest`], with the subtrees below the root packed on the
    /// rayon pool. The output is identical to the sequential walk.
    #[tracing::instrument(level = "trace", skip_all, fields(grid = source.name()))]
    pub fn ingest_parallel<S>(&self, source: &S) -> Result<PackedGridBuffer>
    where
        S: GridSource,
        S::Node: Sync,
    {
        let (index_to_object, mut builder) = self.prepare(source)?;
        let root = source.root();

        if self.topology.leaf_level() == 1 {
            self.visit_leaf_parent(root, 0, &mut builder)?;
        } else {
            for (origin, value) in root.tiles() {
                builder.push_tile(1, origin, value);
            }

            let children: Vec<&S::Node> = root.children().collect();
            let leaf_voxels = self.topology.leaf_voxels() as usize;
            let parts = children
                .par_iter()
                .map(|child| {
                    let mut part = PackedGridBuilder::unreserved(leaf_voxels);
                    self.visit(*child, 1, &mut part)?;
                    Ok(part)
                })
                .collect::<Result<Vec<_>>>()?;

            for part in parts {
                builder.append(part);
            }
        }

        self.complete(source, builder, index_to_object)
    }

    /// Check compatibility and reserve the output before touching the tree.
    fn prepare<S: GridSource>(&self, source: &S) -> Result<(IndexToObject, PackedGridBuilder)> {
        let expected = self.topology.type_name();
        let found = source.topology_type();
        if found != expected {
            return Err(VolumeError::TopologyMismatch { expected, found });
        }

        let expected = self.topology.domain_log_res();
        let found = source.domain_log_res();
        if found != expected {
            return Err(VolumeError::DomainMismatch { expected, found });
        }

        let index_to_object = source.transform().index_to_object()?;

        let tiles = source.active_tile_count();
        let leaves = source.active_leaf_count();
        let builder = PackedGridBuilder::with_capacity(tiles, leaves, self.topology.leaf_voxels())?;
        debug!(
            grid = source.name(),
            tiles,
            leaves,
            dense_values = builder.reservation().dense_values,
            "Reserved packed buffers"
        );

        Ok((index_to_object, builder))
    }

    fn complete<S: GridSource>(
        &self,
        source: &S,
        builder: PackedGridBuilder,
        index_to_object: IndexToObject,
    ) -> Result<PackedGridBuffer> {
        let reservation = builder.reservation();
        let expected = reservation.nodes as u64;
        let actual = builder.len() as u64;
        if actual != expected {
            return Err(VolumeError::NodeCountMismatch { expected, actual });
        }
        for (what, expected, actual) in [
            ("tile values", reservation.tile_values, builder.tile_count()),
            ("dense values", reservation.dense_values, builder.dense_values()),
        ] {
            if actual != expected {
                return Err(VolumeError::ReservationMismatch {
                    what,
                    expected: expected as u64,
                    actual: actual as u64,
                });
            }
        }

        let buffer = builder.finish(index_to_object, source.value_range());
        info!(
            grid = source.name(),
            nodes = buffer.len(),
            tiles = buffer.tile_count(),
            dense = buffer.dense_count(),
            "Ingested grid"
        );
        Ok(buffer)
    }

    fn visit<N: SourceNode>(&self, node: &N, level: u32, out: &mut PackedGridBuilder) -> Result<()> {
        let next = level + 1;
        if next == self.topology.leaf_level() {
            return self.visit_leaf_parent(node, level, out);
        }

        for (origin, value) in node.tiles() {
            out.push_tile(next, origin, value);
        }
        for child in node.children() {
            self.visit(child, next, out)?;
        }
        Ok(())
    }

    fn visit_leaf_parent<N: SourceNode>(
        &self,
        node: &N,
        level: u32,
        out: &mut PackedGridBuilder,
    ) -> Result<()> {
        let leaf = level + 1;
        let mapper = self.topology.mapper();
        let res = self.topology.storage_res(level);
        let origin = node.origin();

        for x in 0..res {
            for y in 0..res {
                for z in 0..res {
                    let slot = mapper.linear_index_3d(level, x, y, z) as usize;
                    let tile = node.is_tile_active(slot);
                    let child = node.is_child_active(slot);
                    if !tile && !child {
                        continue;
                    }

                    let child_origin = mapper.child_origin(level, origin, UVec3::new(x, y, z));
                    if tile {
                        out.push_tile(leaf, child_origin, node.tile_value(slot));
                    } else if child {
                        let block = node
                            .dense_block(slot)
                            .ok_or(VolumeError::MissingLeafBlock {
                                origin: child_origin,
                            })?;
                        out.push_dense(leaf, child_origin, block)?;
                    }
                }
            }
        }
        Ok(())
    }
}
