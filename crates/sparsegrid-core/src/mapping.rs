//! Mapping domain offsets to node voxels and linear indices.
//!
//! Offsets are in domain units (leaf voxel indices). Masking with
//! `domain_res - 1` keeps the part of an offset local to the enclosing node;
//! shifting by the next level's cumulative log-resolution turns that into a
//! voxel index inside the node.
//!
//! ```text
//! |........|........|.x......|  -> mask  -> |.x......|
//! |.x......|                    -> shift -> |x.|   (voxels cover 4 offsets)
//! ```
//!
//! Node voxel tables are laid out with the last axis varying fastest.

use glam::{IVec3, UVec3};

use crate::topology::LevelTopology;

/// Linear index of a voxel inside a node with `log_res` voxels per axis (z fastest).
#[inline]
pub const fn linear_index(log_res: u32, x: u32, y: u32, z: u32) -> u64 {
    ((x as u64) << (2 * log_res)) + ((y as u64) << log_res) + z as u64
}

/// Inverse of [`linear_index`].
#[inline]
pub const fn voxel_from_linear(log_res: u32, index: u64) -> [u32; 3] {
    let mask = (1u64 << log_res) - 1;
    [
        (index >> (2 * log_res)) as u32,
        ((index >> log_res) & mask) as u32,
        (index & mask) as u32,
    ]
}

/// Stateless offset mapping for one topology.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMapper<'a> {
    topology: &'a LevelTopology,
}

impl<'a> CoordinateMapper<'a> {
    /// Create a mapper over `topology`.
    #[inline]
    pub const fn new(topology: &'a LevelTopology) -> Self {
        Self { topology }
    }

    /// The underlying table.
    #[inline]
    pub const fn topology(&self) -> &'a LevelTopology {
        self.topology
    }

    /// Per-axis voxel index, inside a node at `level`, of the voxel containing `offset`.
    #[inline]
    pub fn voxel_index_in_node(&self, level: u32, offset: u64) -> u32 {
        let local = offset & (self.topology.domain_res(level) - 1);
        (local >> self.topology.total_log_res(level + 1)) as u32
    }

    /// Linear index of node voxel `(vx, vy, vz)` at `level`.
    #[inline]
    pub fn linear_index_3d(&self, level: u32, vx: u32, vy: u32, vz: u32) -> u64 {
        linear_index(self.topology.log_res(level), vx, vy, vz)
    }

    /// Node voxel `(vx, vy, vz)` for a linear index at `level`.
    #[inline]
    pub fn voxel_from_linear(&self, level: u32, index: u64) -> UVec3 {
        UVec3::from_array(voxel_from_linear(self.topology.log_res(level), index))
    }

    /// Linear voxel index, inside a node at `level`, for a full domain offset.
    #[inline]
    pub fn domain_offset_to_linear(&self, level: u32, offset: [u64; 3]) -> u64 {
        self.linear_index_3d(
            level,
            self.voxel_index_in_node(level, offset[0]),
            self.voxel_index_in_node(level, offset[1]),
            self.voxel_index_in_node(level, offset[2]),
        )
    }

    /// Node voxel containing a signed domain coordinate.
    ///
    /// Negative coordinates wrap in two's complement, which the mask turns
    /// into the correct position inside the enclosing node.
    #[inline]
    pub fn voxel_in_node(&self, level: u32, coord: IVec3) -> UVec3 {
        UVec3::new(
            self.voxel_index_in_node(level, i64::from(coord.x) as u64),
            self.voxel_index_in_node(level, i64::from(coord.y) as u64),
            self.voxel_index_in_node(level, i64::from(coord.z) as u64),
        )
    }

    /// Linear voxel index, inside a node at `level`, for a signed domain coordinate.
    #[inline]
    pub fn coord_to_linear(&self, level: u32, coord: IVec3) -> u64 {
        let v = self.voxel_in_node(level, coord);
        self.linear_index_3d(level, v.x, v.y, v.z)
    }

    /// Origin of the node at `level` that contains `coord`.
    #[inline]
    pub fn node_origin(&self, level: u32, coord: IVec3) -> IVec3 {
        let mask = !((self.topology.domain_res(level) - 1) as i32);
        coord & IVec3::splat(mask)
    }

    /// Origin of the child region behind voxel `voxel` of a node at `level`.
    #[inline]
    pub fn child_origin(&self, level: u32, node_origin: IVec3, voxel: UVec3) -> IVec3 {
        node_origin + voxel.as_ivec3() * self.topology.child_res(level) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_topology() -> LevelTopology {
        LevelTopology::new(&[6, 5, 4, 3]).unwrap()
    }

    #[test]
    fn voxel_index_stays_in_node() {
        let topology = LevelTopology::new(&[3, 2, 2]).unwrap();
        let mapper = topology.mapper();
        for level in 0..topology.depth() as u32 {
            for offset in 0..topology.domain_res(0) {
                assert!(mapper.voxel_index_in_node(level, offset) < topology.storage_res(level));
            }
        }
    }

    #[test]
    fn voxel_index_per_level() {
        let topology = default_topology();
        let mapper = topology.mapper();
        // 5000 = 1 * 4096 + 7 * 128 + 1 * 8 + 0
        assert_eq!(mapper.voxel_index_in_node(0, 5000), 1);
        assert_eq!(mapper.voxel_index_in_node(1, 5000), 7);
        assert_eq!(mapper.voxel_index_in_node(2, 5000), 1);
        assert_eq!(mapper.voxel_index_in_node(3, 5000), 0);
        assert_eq!(mapper.voxel_index_in_node(3, 5007), 7);
    }

    #[test]
    fn linear_index_is_z_fastest() {
        let topology = default_topology();
        let mapper = topology.mapper();
        assert_eq!(mapper.linear_index_3d(3, 0, 0, 1), 1);
        assert_eq!(mapper.linear_index_3d(3, 0, 1, 0), 8);
        assert_eq!(mapper.linear_index_3d(3, 1, 0, 0), 64);
        assert_eq!(mapper.linear_index_3d(3, 7, 7, 7), 511);
        assert_eq!(mapper.linear_index_3d(2, 1, 2, 3), 256 + 32 + 3);
    }

    #[test]
    fn linear_index_inverse() {
        let topology = default_topology();
        let mapper = topology.mapper();
        for index in [0, 1, 17, 255, 4095] {
            let v = mapper.voxel_from_linear(2, index);
            assert_eq!(mapper.linear_index_3d(2, v.x, v.y, v.z), index);
        }
    }

    #[test]
    fn composite_mapping_matches_components() {
        let topology = default_topology();
        let mapper = topology.mapper();
        let offset = [13u64, 200, 4100];
        let expected = mapper.linear_index_3d(
            3,
            mapper.voxel_index_in_node(3, 13),
            mapper.voxel_index_in_node(3, 200),
            mapper.voxel_index_in_node(3, 4100),
        );
        assert_eq!(mapper.domain_offset_to_linear(3, offset), expected);
        assert_eq!(expected, (5 << 6) + 4);
    }

    #[test]
    fn negative_coords_wrap_into_node() {
        let topology = default_topology();
        let mapper = topology.mapper();
        assert_eq!(mapper.voxel_in_node(3, IVec3::splat(-1)), UVec3::splat(7));
        assert_eq!(mapper.node_origin(3, IVec3::new(-1, 9, 15)), IVec3::new(-8, 8, 8));
    }

    #[test]
    fn node_and_child_origins() {
        let topology = default_topology();
        let mapper = topology.mapper();
        let coord = IVec3::new(300, 5, 4097);
        assert_eq!(mapper.node_origin(2, coord), IVec3::new(256, 0, 4096));
        let origin = mapper.node_origin(2, coord);
        let voxel = mapper.voxel_in_node(2, coord);
        assert_eq!(
            mapper.child_origin(2, origin, voxel),
            mapper.node_origin(3, coord)
        );
    }
}
