//! In-memory sparse volume tree.
//!
//! Every node, the root included, keeps a tile bitmask, a child bitmask and a
//! sparse slot table ordered by slot index. Nodes one level above the leaves
//! store dense leaf blocks in place of child nodes.

use std::collections::BTreeMap;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use sparsegrid_core::mapping::{linear_index, voxel_from_linear};
use sparsegrid_core::{GridTransform, LevelTopology, ValueRange};

use crate::error::{Result, VolumeError};
use crate::mask::NodeMask;
use crate::source::{GridSource, SourceNode};

/// A node of a [`MemoryGrid`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    level: u32,
    log_res: u32,
    /// Log2 side length of the region behind one slot.
    child_log_res: u32,
    origin: IVec3,
    tile_mask: NodeMask,
    child_mask: NodeMask,
    tiles: BTreeMap<u64, f32>,
    children: BTreeMap<u64, Box<MemoryNode>>,
    leaves: BTreeMap<u64, Box<[f32]>>,
}

impl MemoryNode {
    /// Create an empty node at `level`.
    pub(crate) fn new(topology: &LevelTopology, level: u32, origin: IVec3) -> Self {
        let slots = topology.num_voxels(level);
        Self {
            level,
            log_res: topology.log_res(level),
            child_log_res: topology.total_log_res(level + 1),
            origin,
            tile_mask: NodeMask::new(slots),
            child_mask: NodeMask::new(slots),
            tiles: BTreeMap::new(),
            children: BTreeMap::new(),
            leaves: BTreeMap::new(),
        }
    }

    /// Create a node whose every slot is an active tile of `value`.
    pub(crate) fn filled(topology: &LevelTopology, level: u32, origin: IVec3, value: f32) -> Self {
        let mut node = Self::new(topology, level, origin);
        node.tile_mask.fill();
        node.tiles = (0..node.slot_count()).map(|slot| (slot, value)).collect();
        node
    }

    /// Tree level of this node.
    #[inline]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Number of table slots.
    #[inline]
    pub const fn slot_count(&self) -> u64 {
        self.tile_mask.len()
    }

    /// Origin of the region behind `slot`.
    pub fn slot_origin(&self, slot: u64) -> IVec3 {
        let [x, y, z] = voxel_from_linear(self.log_res, slot);
        self.origin + IVec3::new(x as i32, y as i32, z as i32) * (1 << self.child_log_res)
    }

    /// Slot containing a domain coordinate inside this node.
    pub fn slot_of(&self, coord: IVec3) -> u64 {
        let local = (coord - self.origin) >> self.child_log_res as i32;
        linear_index(self.log_res, local.x as u32, local.y as u32, local.z as u32)
    }

    fn set_tile(&mut self, slot: u64, value: f32) {
        self.children.remove(&slot);
        self.leaves.remove(&slot);
        self.child_mask.set(slot, false);
        self.tile_mask.set(slot, true);
        self.tiles.insert(slot, value);
    }

    fn set_leaf(&mut self, slot: u64, block: Box<[f32]>) {
        self.tiles.remove(&slot);
        self.tile_mask.set(slot, false);
        self.child_mask.set(slot, true);
        self.leaves.insert(slot, block);
    }

    /// Child node behind `slot`, created if missing. A tile in the slot is
    /// expanded into a child filled with the tile value.
    fn ensure_child(&mut self, topology: &LevelTopology, slot: u64) -> &mut Self {
        let level = self.level + 1;
        let origin = self.slot_origin(slot);
        let tile = self.tiles.remove(&slot);
        self.tile_mask.set(slot, false);
        self.child_mask.set(slot, true);
        self.children.entry(slot).or_insert_with(|| {
            Box::new(match tile {
                Some(value) => Self::filled(topology, level, origin, value),
                None => Self::new(topology, level, origin),
            })
        })
    }

    /// Leaf block behind `slot`, created if missing and filled with the slot's
    /// tile value or `background`.
    fn ensure_leaf(&mut self, slot: u64, background: f32, leaf_voxels: usize) -> &mut [f32] {
        let fill = self.tiles.remove(&slot).unwrap_or(background);
        self.tile_mask.set(slot, false);
        self.child_mask.set(slot, true);
        self.leaves
            .entry(slot)
            .or_insert_with(|| vec![fill; leaf_voxels].into_boxed_slice())
    }

    /// Node at `target_level` containing `coord`, creating the path to it.
    fn descend_mut(&mut self, topology: &LevelTopology, coord: IVec3, target_level: u32) -> &mut Self {
        if self.level >= target_level {
            return self;
        }
        let slot = self.slot_of(coord);
        self.ensure_child(topology, slot)
            .descend_mut(topology, coord, target_level)
    }

    fn value_at(&self, coord: IVec3, background: f32) -> f32 {
        let slot = self.slot_of(coord);
        if let Some(&value) = self.tiles.get(&slot) {
            return value;
        }
        if let Some(child) = self.children.get(&slot) {
            return child.value_at(coord, background);
        }
        if let Some(block) = self.leaves.get(&slot) {
            let local = coord - self.slot_origin(slot);
            let index = linear_index(self.child_log_res, local.x as u32, local.y as u32, local.z as u32);
            return block[index as usize];
        }
        background
    }

    fn count_tiles(&self) -> u64 {
        self.tiles.len() as u64 + self.children.values().map(|c| c.count_tiles()).sum::<u64>()
    }

    fn count_leaves(&self) -> u64 {
        self.leaves.len() as u64 + self.children.values().map(|c| c.count_leaves()).sum::<u64>()
    }

    fn accumulate_range(&self, range: &mut ValueRange) {
        for &value in self.tiles.values() {
            range.include(value);
        }
        for block in self.leaves.values() {
            for &value in block.iter() {
                range.include(value);
            }
        }
        for child in self.children.values() {
            child.accumulate_range(range);
        }
    }

    fn collapse_uniform_leaves(&mut self) -> usize {
        let mut collapsed = 0;
        for child in self.children.values_mut() {
            collapsed += child.collapse_uniform_leaves();
        }

        let uniform: Vec<(u64, f32)> = self
            .leaves
            .iter()
            .filter_map(|(&slot, block)| {
                let first = *block.first()?;
                block
                    .iter()
                    .all(|v| v.to_bits() == first.to_bits())
                    .then_some((slot, first))
            })
            .collect();

        for (slot, value) in uniform {
            self.set_tile(slot, value);
            collapsed += 1;
        }
        collapsed
    }

    /// Check the node's invariants against the topology it claims to follow.
    fn validate(
        &self,
        topology: &LevelTopology,
        level: u32,
        origin: IVec3,
    ) -> std::result::Result<(), String> {
        if self.level != level || self.origin != origin {
            return Err(format!(
                "node at {} (level {}) found where level {level} node at {origin} was expected",
                self.origin, self.level
            ));
        }
        if self.log_res != topology.log_res(level)
            || self.child_log_res != topology.total_log_res(level + 1)
        {
            return Err(format!("node at {origin} has a foreign resolution"));
        }

        let slots = topology.num_voxels(level);
        if self.tile_mask.len() != slots
            || self.child_mask.len() != slots
            || !self.tile_mask.is_well_formed()
            || !self.child_mask.is_well_formed()
        {
            return Err(format!("node at {origin} has malformed masks"));
        }

        if self.tile_mask.count_on() != self.tiles.len() as u64
            || self.tiles.keys().any(|&slot| !self.tile_mask.is_on(slot) || self.child_mask.is_on(slot))
        {
            return Err(format!("node at {origin} has tile mask out of sync"));
        }
        let child_slots = self.children.len() + self.leaves.len();
        if self.child_mask.count_on() != child_slots as u64
            || self
                .children
                .keys()
                .chain(self.leaves.keys())
                .any(|&slot| !self.child_mask.is_on(slot))
        {
            return Err(format!("node at {origin} has child mask out of sync"));
        }

        let leaf_parent = level + 1 == topology.leaf_level();
        if leaf_parent && !self.children.is_empty() {
            return Err(format!("node at {origin} holds child nodes above the leaves"));
        }
        if !leaf_parent && !self.leaves.is_empty() {
            return Err(format!("node at {origin} holds leaf blocks above level {level}"));
        }

        let leaf_voxels = topology.leaf_voxels();
        if let Some((slot, block)) = self
            .leaves
            .iter()
            .find(|(_, block)| block.len() as u64 != leaf_voxels)
        {
            return Err(format!(
                "leaf at {} has {} values, expected {leaf_voxels}",
                self.slot_origin(*slot),
                block.len()
            ));
        }

        for (&slot, child) in &self.children {
            child.validate(topology, level + 1, self.slot_origin(slot))?;
        }
        Ok(())
    }
}

impl SourceNode for MemoryNode {
    fn origin(&self) -> IVec3 {
        self.origin
    }

    fn tiles(&self) -> impl Iterator<Item = (IVec3, f32)> + '_ {
        self.tiles
            .iter()
            .map(move |(&slot, &value)| (self.slot_origin(slot), value))
    }

    fn children(&self) -> impl Iterator<Item = &Self> + '_ {
        self.children.values().map(|child| &**child)
    }

    fn is_tile_active(&self, slot: usize) -> bool {
        self.tile_mask.is_on(slot as u64)
    }

    fn is_child_active(&self, slot: usize) -> bool {
        self.child_mask.is_on(slot as u64)
    }

    fn tile_value(&self, slot: usize) -> f32 {
        self.tiles.get(&(slot as u64)).copied().unwrap_or_default()
    }

    fn dense_block(&self, slot: usize) -> Option<&[f32]> {
        self.leaves.get(&(slot as u64)).map(|block| &**block)
    }
}

/// An owned sparse grid with its own topology, transform and background.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryGrid {
    name: String,
    topology: LevelTopology,
    transform: GridTransform,
    background: f32,
    root: MemoryNode,
}

impl MemoryGrid {
    /// Create an empty grid.
    pub fn new(name: impl Into<String>, topology: LevelTopology) -> Self {
        let root = MemoryNode::new(&topology, 0, IVec3::ZERO);
        Self {
            name: name.into(),
            topology,
            transform: GridTransform::IDENTITY,
            background: 0.0,
            root,
        }
    }

    /// Set the index-to-object transform.
    #[must_use]
    pub fn with_transform(mut self, transform: GridTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the value reported outside active regions.
    #[must_use]
    pub fn with_background(mut self, background: f32) -> Self {
        self.background = background;
        self
    }

    /// Rename the grid.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Replace the transform.
    pub fn set_transform(&mut self, transform: GridTransform) {
        self.transform = transform;
    }

    /// Topology the tree is built on.
    #[inline]
    pub fn topology(&self) -> &LevelTopology {
        &self.topology
    }

    /// Value reported outside active regions.
    #[inline]
    pub const fn background(&self) -> f32 {
        self.background
    }

    fn check_coord(&self, coord: IVec3) -> Result<()> {
        let domain_res = self.topology.domain_res(0);
        let inside = coord
            .to_array()
            .iter()
            .all(|&c| c >= 0 && (c as u64) < domain_res);
        if inside {
            Ok(())
        } else {
            Err(VolumeError::OutOfDomain { coord, domain_res })
        }
    }

    /// Make the node-sized region at `level` containing `coord` a constant tile.
    ///
    /// Any finer nodes previously covering the region are dropped.
    pub fn insert_tile(&mut self, level: u32, coord: IVec3, value: f32) -> Result<()> {
        self.topology.check_level(level)?;
        if level == 0 {
            return Err(VolumeError::InvalidLevel {
                level,
                reason: "the root cannot be a tile",
            });
        }
        self.check_coord(coord)?;

        let parent = self.root.descend_mut(&self.topology, coord, level - 1);
        let slot = parent.slot_of(coord);
        parent.set_tile(slot, value);
        Ok(())
    }

    /// Store a dense leaf block (z fastest) for the leaf containing `coord`.
    pub fn insert_leaf(&mut self, coord: IVec3, block: impl Into<Box<[f32]>>) -> Result<()> {
        self.check_coord(coord)?;
        let block = block.into();
        let leaf = self.topology.leaf_level();
        let expected = self.topology.leaf_voxels();
        if block.len() as u64 != expected {
            return Err(VolumeError::InvalidLeafBlock {
                origin: self.topology.mapper().node_origin(leaf, coord),
                expected,
                found: block.len() as u64,
            });
        }

        let parent = self.root.descend_mut(&self.topology, coord, leaf - 1);
        let slot = parent.slot_of(coord);
        parent.set_leaf(slot, block);
        Ok(())
    }

    /// Write a single voxel, expanding any enclosing tile into finer nodes.
    pub fn set_voxel(&mut self, coord: IVec3, value: f32) -> Result<()> {
        self.check_coord(coord)?;
        let leaf = self.topology.leaf_level();
        let index = self.topology.mapper().coord_to_linear(leaf, coord) as usize;
        let leaf_voxels = self.topology.leaf_voxels() as usize;
        let background = self.background;

        let parent = self.root.descend_mut(&self.topology, coord, leaf - 1);
        let slot = parent.slot_of(coord);
        parent.ensure_leaf(slot, background, leaf_voxels)[index] = value;
        Ok(())
    }

    /// Value at a domain coordinate; the background outside active regions.
    pub fn value(&self, coord: IVec3) -> f32 {
        if self.check_coord(coord).is_err() {
            return self.background;
        }
        self.root.value_at(coord, self.background)
    }

    /// Write `value` into every voxel whose center lies inside a sphere.
    ///
    /// Returns the number of voxels written. The sphere is clipped to the domain.
    pub fn fill_sphere(&mut self, center: Vec3, radius: f32, value: f32) -> Result<usize> {
        let size = self.topology.domain_res(0) as f32;
        let r2 = radius * radius;
        let min = (center - radius).floor().clamp(Vec3::ZERO, Vec3::splat(size));
        let max = (center + radius).ceil().clamp(Vec3::ZERO, Vec3::splat(size));

        let mut written = 0;
        for x in min.x as i32..max.x as i32 {
            for y in min.y as i32..max.y as i32 {
                for z in min.z as i32..max.z as i32 {
                    let p = Vec3::new(x as f32, y as f32, z as f32) + 0.5;
                    if p.distance_squared(center) <= r2 {
                        self.set_voxel(IVec3::new(x, y, z), value)?;
                        written += 1;
                    }
                }
            }
        }
        Ok(written)
    }

    /// Replace leaf blocks holding a single value by tiles.
    ///
    /// Returns the number of leaves collapsed.
    pub fn collapse_uniform_leaves(&mut self) -> usize {
        self.root.collapse_uniform_leaves()
    }

    /// Check structural invariants, e.g. after decoding from a file.
    pub fn validate(&self) -> Result<()> {
        self.root
            .validate(&self.topology, 0, IVec3::ZERO)
            .map_err(|reason| VolumeError::CorruptGrid {
                name: self.name.clone(),
                reason,
            })
    }
}

impl GridSource for MemoryGrid {
    type Node = MemoryNode;

    fn name(&self) -> &str {
        &self.name
    }

    fn topology_type(&self) -> String {
        self.topology.type_name()
    }

    fn domain_log_res(&self) -> u32 {
        self.topology.domain_log_res()
    }

    fn active_tile_count(&self) -> u64 {
        self.root.count_tiles()
    }

    fn active_leaf_count(&self) -> u64 {
        self.root.count_leaves()
    }

    fn transform(&self) -> &GridTransform {
        &self.transform
    }

    fn value_range(&self) -> ValueRange {
        let mut range = ValueRange::EMPTY;
        self.root.accumulate_range(&mut range);
        if range.is_empty() {
            ValueRange::splat(self.background)
        } else {
            range
        }
    }

    fn root(&self) -> &MemoryNode {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_topology() -> LevelTopology {
        LevelTopology::new(&[6, 5, 4, 3]).unwrap()
    }

    #[test]
    fn empty_grid() {
        let grid = MemoryGrid::new("density", default_topology()).with_background(-1.0);
        assert_eq!(grid.active_tile_count(), 0);
        assert_eq!(grid.active_leaf_count(), 0);
        assert_eq!(grid.value(IVec3::new(10, 20, 30)), -1.0);
        assert_eq!(grid.value_range(), ValueRange::splat(-1.0));
        assert_eq!(grid.topology_type(), "Tree_float_5_4_3");
        grid.validate().unwrap();
    }

    #[test]
    fn set_and_get_voxels() {
        let mut grid = MemoryGrid::new("density", default_topology());
        grid.set_voxel(IVec3::new(10, 15, 20), 4.0).unwrap();
        grid.set_voxel(IVec3::new(5000, 7, 300), -2.0).unwrap();

        assert_eq!(grid.value(IVec3::new(10, 15, 20)), 4.0);
        assert_eq!(grid.value(IVec3::new(5000, 7, 300)), -2.0);
        assert_eq!(grid.value(IVec3::new(11, 15, 20)), 0.0);
        assert_eq!(grid.active_leaf_count(), 2);
        assert_eq!(grid.active_tile_count(), 0);
        assert_eq!(grid.value_range(), ValueRange::new(-2.0, 4.0));
        grid.validate().unwrap();
    }

    #[test]
    fn tile_covers_its_region() {
        let mut grid = MemoryGrid::new("density", default_topology());
        grid.insert_tile(3, IVec3::new(17, 3, 9), 7.5).unwrap();

        // Leaf-sized tile at origin (16, 0, 8).
        assert_eq!(grid.value(IVec3::new(16, 0, 8)), 7.5);
        assert_eq!(grid.value(IVec3::new(23, 7, 15)), 7.5);
        assert_eq!(grid.value(IVec3::new(24, 7, 15)), 0.0);
        assert_eq!(grid.active_tile_count(), 1);
        let (origin, value) = grid.root().children().next().unwrap().children().next().unwrap().tiles().next().unwrap();
        assert_eq!(origin, IVec3::new(16, 0, 8));
        assert_eq!(value, 7.5);
    }

    #[test]
    fn set_voxel_expands_coarse_tile() {
        let mut grid = MemoryGrid::new("density", default_topology());
        grid.insert_tile(2, IVec3::ZERO, 1.0).unwrap();
        assert_eq!(grid.active_tile_count(), 1);

        grid.set_voxel(IVec3::new(3, 4, 5), 9.0).unwrap();

        // The 16^3 tile table replaces the coarse tile; one slot became a leaf.
        assert_eq!(grid.active_tile_count(), 4095);
        assert_eq!(grid.active_leaf_count(), 1);
        assert_eq!(grid.value(IVec3::new(3, 4, 5)), 9.0);
        assert_eq!(grid.value(IVec3::new(3, 4, 6)), 1.0);
        assert_eq!(grid.value(IVec3::new(127, 127, 127)), 1.0);
        assert_eq!(grid.value(IVec3::new(128, 0, 0)), 0.0);
        grid.validate().unwrap();
    }

    #[test]
    fn insert_tile_drops_finer_nodes() {
        let mut grid = MemoryGrid::new("density", default_topology());
        grid.set_voxel(IVec3::new(1, 1, 1), 3.0).unwrap();
        grid.insert_tile(2, IVec3::ZERO, 2.0).unwrap();
        assert_eq!(grid.active_leaf_count(), 0);
        assert_eq!(grid.active_tile_count(), 1);
        assert_eq!(grid.value(IVec3::new(1, 1, 1)), 2.0);
        grid.validate().unwrap();
    }

    #[test]
    fn rejects_bad_edits() {
        let mut grid = MemoryGrid::new("density", default_topology());
        assert!(matches!(
            grid.set_voxel(IVec3::new(-1, 0, 0), 1.0),
            Err(VolumeError::OutOfDomain { .. })
        ));
        assert!(matches!(
            grid.set_voxel(IVec3::new(0, 262_144, 0), 1.0),
            Err(VolumeError::OutOfDomain { .. })
        ));
        assert!(matches!(
            grid.insert_tile(0, IVec3::ZERO, 1.0),
            Err(VolumeError::InvalidLevel { level: 0, .. })
        ));
        assert!(matches!(
            grid.insert_tile(4, IVec3::ZERO, 1.0),
            Err(VolumeError::Core(_))
        ));
        assert!(matches!(
            grid.insert_leaf(IVec3::new(9, 9, 9), vec![0.0; 100]),
            Err(VolumeError::InvalidLeafBlock {
                expected: 512,
                found: 100,
                ..
            })
        ));
    }

    #[test]
    fn leaf_block_is_z_fastest() {
        let mut grid = MemoryGrid::new("density", default_topology());
        let block: Vec<f32> = (0..512).map(|i| i as f32).collect();
        grid.insert_leaf(IVec3::new(8, 8, 8), block).unwrap();
        assert_eq!(grid.value(IVec3::new(8, 8, 9)), 1.0);
        assert_eq!(grid.value(IVec3::new(8, 9, 8)), 8.0);
        assert_eq!(grid.value(IVec3::new(9, 8, 8)), 64.0);
        assert_eq!(grid.value(IVec3::new(15, 15, 15)), 511.0);
    }

    #[test]
    fn collapse_uniform_leaves_to_tiles() {
        let mut grid = MemoryGrid::new("density", default_topology());
        grid.insert_leaf(IVec3::ZERO, vec![2.0; 512]).unwrap();
        grid.set_voxel(IVec3::new(100, 0, 0), 1.0).unwrap();

        assert_eq!(grid.collapse_uniform_leaves(), 1);
        assert_eq!(grid.active_leaf_count(), 1);
        assert_eq!(grid.active_tile_count(), 1);
        assert_eq!(grid.value(IVec3::new(7, 7, 7)), 2.0);
        grid.validate().unwrap();
    }

    #[test]
    fn fill_sphere_counts_voxels() {
        let topology = LevelTopology::new(&[2, 2, 3]).unwrap();
        let mut grid = MemoryGrid::new("sphere", topology);
        let written = grid.fill_sphere(Vec3::splat(16.0), 4.0, 1.0).unwrap();
        assert!(written > 200 && written < 300);
        assert_eq!(grid.value(IVec3::splat(16)), 1.0);
        assert_eq!(grid.value(IVec3::new(16, 16, 21)), 0.0);
        grid.validate().unwrap();
    }
}
