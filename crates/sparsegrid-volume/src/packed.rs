//! Packed node buffers handed to the renderer.
//!
//! A [`PackedGridBuffer`] stores every emitted node as parallel sequences
//! (`level`, `origin`, `format`) plus two payload arrays. Tile values and
//! dense blocks are addressed implicitly by emission order: the n-th tile
//! record owns `tile_values[n]`, the n-th dense record owns the n-th
//! leaf-sized block of `dense_data`.

use bytemuck::{Pod, Zeroable};
use glam::IVec3;
use serde::{Deserialize, Serialize};
use sparsegrid_core::{IndexToObject, ValueRange};

use crate::error::{Result, VolumeError};

/// Payload encoding of a node record.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFormat {
    /// One constant value for the whole node region.
    Tile = 0,
    /// A full leaf block of per-voxel values.
    Dense = 1,
}

/// Stable index of an appended node record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    /// Position in emission order.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Capacity reserved before traversal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reservation {
    /// Node records.
    pub nodes: usize,
    /// Tile payload values.
    pub tile_values: usize,
    /// Dense payload values.
    pub dense_values: usize,
}

/// Append-only builder for a [`PackedGridBuffer`].
#[derive(Debug)]
pub struct PackedGridBuilder {
    leaf_voxels: usize,
    levels: Vec<u32>,
    origins: Vec<IVec3>,
    formats: Vec<NodeFormat>,
    tile_values: Vec<f32>,
    dense_data: Vec<f32>,
    reservation: Reservation,
}

fn to_usize(value: u64, what: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| VolumeError::CapacityOverflow { what })
}

fn reserve<T>(vec: &mut Vec<T>, additional: usize, what: &'static str) -> Result<()> {
    vec.try_reserve_exact(additional)
        .map_err(|_| VolumeError::CapacityOverflow { what })
}

impl PackedGridBuilder {
    /// Reserve exactly enough room for `num_tiles + num_leaves` records.
    pub fn with_capacity(num_tiles: u64, num_leaves: u64, leaf_voxels: u64) -> Result<Self> {
        let tiles = to_usize(num_tiles, "tile values")?;
        let leaves = to_usize(num_leaves, "dense blocks")?;
        let leaf_voxels = to_usize(leaf_voxels, "leaf voxels")?;
        let nodes = tiles
            .checked_add(leaves)
            .filter(|&n| u32::try_from(n).is_ok())
            .ok_or(VolumeError::CapacityOverflow {
                what: "node records",
            })?;
        let dense_values = leaves
            .checked_mul(leaf_voxels)
            .ok_or(VolumeError::CapacityOverflow {
                what: "dense values",
            })?;

        let mut builder = Self::unreserved(leaf_voxels);
        reserve(&mut builder.dense_data, dense_values, "dense values")?;
        reserve(&mut builder.tile_values, tiles, "tile values")?;
        reserve(&mut builder.levels, nodes, "node records")?;
        reserve(&mut builder.origins, nodes, "node records")?;
        reserve(&mut builder.formats, nodes, "node records")?;
        builder.reservation = Reservation {
            nodes,
            tile_values: tiles,
            dense_values,
        };
        Ok(builder)
    }

    /// Builder without a reservation, for partial results merged with [`Self::append`].
    pub fn unreserved(leaf_voxels: usize) -> Self {
        Self {
            leaf_voxels,
            levels: Vec::new(),
            origins: Vec::new(),
            formats: Vec::new(),
            tile_values: Vec::new(),
            dense_data: Vec::new(),
            reservation: Reservation::default(),
        }
    }

    /// Number of records appended so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns true if nothing was appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of tile records appended so far.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tile_values.len()
    }

    /// Number of dense records appended so far.
    #[inline]
    pub fn dense_count(&self) -> usize {
        self.dense_data.len() / self.leaf_voxels.max(1)
    }

    /// Number of dense payload values appended so far.
    #[inline]
    pub fn dense_values(&self) -> usize {
        self.dense_data.len()
    }

    /// Capacity reserved at construction.
    #[inline]
    pub const fn reservation(&self) -> Reservation {
        self.reservation
    }

    fn push_record(&mut self, level: u32, origin: IVec3, format: NodeFormat) -> NodeHandle {
        let handle = NodeHandle(self.levels.len() as u32);
        self.levels.push(level);
        self.origins.push(origin);
        self.formats.push(format);
        handle
    }

    /// Append a constant-value node.
    pub fn push_tile(&mut self, level: u32, origin: IVec3, value: f32) -> NodeHandle {
        self.tile_values.push(value);
        self.push_record(level, origin, NodeFormat::Tile)
    }

    /// Append a dense leaf node, copying `block`.
    pub fn push_dense(&mut self, level: u32, origin: IVec3, block: &[f32]) -> Result<NodeHandle> {
        if block.len() != self.leaf_voxels {
            return Err(VolumeError::InvalidLeafBlock {
                origin,
                expected: self.leaf_voxels as u64,
                found: block.len() as u64,
            });
        }
        self.dense_data.extend_from_slice(block);
        Ok(self.push_record(level, origin, NodeFormat::Dense))
    }

    /// Move all records of `other` behind the records already appended.
    pub fn append(&mut self, mut other: Self) {
        self.levels.append(&mut other.levels);
        self.origins.append(&mut other.origins);
        self.formats.append(&mut other.formats);
        self.tile_values.append(&mut other.tile_values);
        self.dense_data.append(&mut other.dense_data);
    }

    /// Seal the records together with the grid-wide scalars.
    pub fn finish(self, index_to_object: IndexToObject, value_range: ValueRange) -> PackedGridBuffer {
        PackedGridBuffer {
            leaf_voxels: self.leaf_voxels,
            levels: self.levels,
            origins: self.origins,
            formats: self.formats,
            tile_values: self.tile_values,
            dense_data: self.dense_data,
            index_to_object,
            value_range,
            reservation: self.reservation,
        }
    }
}

/// Payload of one record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodePayload<'a> {
    Tile(f32),
    Dense(&'a [f32]),
}

/// One node record with its payload resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRecord<'a> {
    pub level: u32,
    pub origin: IVec3,
    pub format: NodeFormat,
    pub payload: NodePayload<'a>,
}

/// Node record layout for a GPU storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuNodeRecord {
    /// Node origin in leaf voxels.
    pub origin: [i32; 3],
    /// Tree level of the node.
    pub level: u32,
    /// [`NodeFormat`] discriminant.
    pub format: u32,
    /// Index into the tile values, or leaf block index into the dense data.
    pub payload_index: u32,
    /// Padding for 32-byte alignment.
    pub _padding: [u32; 2],
}

impl GpuNodeRecord {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Immutable result of one ingestion.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedGridBuffer {
    leaf_voxels: usize,
    levels: Vec<u32>,
    origins: Vec<IVec3>,
    formats: Vec<NodeFormat>,
    tile_values: Vec<f32>,
    dense_data: Vec<f32>,
    index_to_object: IndexToObject,
    value_range: ValueRange,
    reservation: Reservation,
}

impl PackedGridBuffer {
    /// Level of every record.
    #[inline]
    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    /// Origin of every record.
    #[inline]
    pub fn origins(&self) -> &[IVec3] {
        &self.origins
    }

    /// Format of every record.
    #[inline]
    pub fn formats(&self) -> &[NodeFormat] {
        &self.formats
    }

    /// Tile payloads in emission order.
    #[inline]
    pub fn tile_values(&self) -> &[f32] {
        &self.tile_values
    }

    /// Dense payloads in emission order, one leaf block per dense record.
    #[inline]
    pub fn dense_data(&self) -> &[f32] {
        &self.dense_data
    }

    /// Values per dense block.
    #[inline]
    pub const fn leaf_voxels(&self) -> usize {
        self.leaf_voxels
    }

    /// Index-to-object transform in the packed 12-float layout.
    #[inline]
    pub const fn index_to_object(&self) -> &IndexToObject {
        &self.index_to_object
    }

    /// Minimum and maximum value of the source grid.
    #[inline]
    pub const fn value_range(&self) -> ValueRange {
        self.value_range
    }

    /// Capacity reserved before the records were appended.
    #[inline]
    pub const fn reservation(&self) -> Reservation {
        self.reservation
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns true if no record was emitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of tile records.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tile_values.len()
    }

    /// Number of dense records.
    #[inline]
    pub fn dense_count(&self) -> usize {
        self.dense_data.len() / self.leaf_voxels.max(1)
    }

    /// Records with their payloads, in emission order.
    pub fn records(&self) -> impl Iterator<Item = NodeRecord<'_>> + '_ {
        let mut next_tile = 0;
        let mut next_dense = 0;
        self.levels
            .iter()
            .zip(&self.origins)
            .zip(&self.formats)
            .map(move |((&level, &origin), &format)| {
                let payload = match format {
                    NodeFormat::Tile => {
                        let value = self.tile_values[next_tile];
                        next_tile += 1;
                        NodePayload::Tile(value)
                    }
                    NodeFormat::Dense => {
                        let start = next_dense * self.leaf_voxels;
                        next_dense += 1;
                        NodePayload::Dense(&self.dense_data[start..start + self.leaf_voxels])
                    }
                };
                NodeRecord {
                    level,
                    origin,
                    format,
                    payload,
                }
            })
    }

    /// Records flattened into the GPU layout.
    pub fn gpu_nodes(&self) -> Vec<GpuNodeRecord> {
        let mut next_tile = 0u32;
        let mut next_dense = 0u32;
        self.levels
            .iter()
            .zip(&self.origins)
            .zip(&self.formats)
            .map(|((&level, origin), &format)| {
                let counter = match format {
                    NodeFormat::Tile => &mut next_tile,
                    NodeFormat::Dense => &mut next_dense,
                };
                let payload_index = *counter;
                *counter += 1;
                GpuNodeRecord {
                    origin: origin.to_array(),
                    level,
                    format: format as u32,
                    payload_index,
                    _padding: [0; 2],
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PackedGridBuffer {
        let mut builder = PackedGridBuilder::with_capacity(2, 1, 8).unwrap();
        let a = builder.push_tile(1, IVec3::new(0, 0, 0), 1.5);
        let b = builder
            .push_dense(3, IVec3::new(8, 0, 16), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0])
            .unwrap();
        let c = builder.push_tile(2, IVec3::new(128, 0, 0), -2.0);
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        builder.finish(IndexToObject::IDENTITY, ValueRange::new(-2.0, 7.0))
    }

    #[test]
    fn gpu_node_record_size() {
        assert_eq!(GpuNodeRecord::SIZE, 32);
    }

    #[test]
    fn gpu_node_record_layout() {
        assert_eq!(std::mem::offset_of!(GpuNodeRecord, origin), 0);
        assert_eq!(std::mem::offset_of!(GpuNodeRecord, level), 12);
        assert_eq!(std::mem::offset_of!(GpuNodeRecord, format), 16);
        assert_eq!(std::mem::offset_of!(GpuNodeRecord, payload_index), 20);
    }

    #[test]
    fn reservation_is_exact() {
        let buffer = sample();
        assert_eq!(
            buffer.reservation(),
            Reservation {
                nodes: 3,
                tile_values: 2,
                dense_values: 8
            }
        );
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.tile_count(), 2);
        assert_eq!(buffer.dense_count(), 1);
    }

    #[test]
    fn records_resolve_payloads_in_order() {
        let buffer = sample();
        let records: Vec<_> = buffer.records().collect();
        assert_eq!(records[0].payload, NodePayload::Tile(1.5));
        assert_eq!(records[1].format, NodeFormat::Dense);
        match records[1].payload {
            NodePayload::Dense(block) => assert_eq!(block[7], 7.0),
            NodePayload::Tile(_) => panic!("expected dense payload"),
        }
        assert_eq!(records[2].payload, NodePayload::Tile(-2.0));
        assert_eq!(records[2].origin, IVec3::new(128, 0, 0));
    }

    #[test]
    fn gpu_nodes_index_payloads_per_format() {
        let nodes = sample().gpu_nodes();
        assert_eq!(nodes[0].payload_index, 0);
        assert_eq!(nodes[1].payload_index, 0);
        assert_eq!(nodes[1].format, NodeFormat::Dense as u32);
        assert_eq!(nodes[2].payload_index, 1);
        assert_eq!(nodes[1].origin, [8, 0, 16]);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&nodes).len(), 96);
    }

    #[test]
    fn rejects_wrong_block_size() {
        let mut builder = PackedGridBuilder::unreserved(512);
        let err = builder.push_dense(3, IVec3::ZERO, &[0.0; 64]).unwrap_err();
        assert!(matches!(
            err,
            VolumeError::InvalidLeafBlock {
                expected: 512,
                found: 64,
                ..
            }
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn capacity_overflow() {
        assert!(matches!(
            PackedGridBuilder::with_capacity(u64::MAX, 1, 512),
            Err(VolumeError::CapacityOverflow { .. })
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn unallocatable_reservation_is_an_error() {
        // One leaf of 2^62 values fits usize but not the address space.
        assert!(matches!(
            PackedGridBuilder::with_capacity(0, 1, 1 << 62),
            Err(VolumeError::CapacityOverflow {
                what: "dense values"
            })
        ));
    }

    #[test]
    fn append_keeps_order() {
        let mut head = PackedGridBuilder::unreserved(1);
        head.push_tile(1, IVec3::ZERO, 1.0);
        let mut tail = PackedGridBuilder::unreserved(1);
        tail.push_dense(2, IVec3::ONE, &[5.0]).unwrap();
        tail.push_tile(1, IVec3::splat(2), 3.0);
        head.append(tail);

        let buffer = head.finish(IndexToObject::IDENTITY, ValueRange::new(1.0, 5.0));
        assert_eq!(buffer.formats(), [NodeFormat::Tile, NodeFormat::Dense, NodeFormat::Tile]);
        assert_eq!(buffer.tile_values(), [1.0, 3.0]);
        assert_eq!(buffer.dense_data(), [5.0]);
    }
}
