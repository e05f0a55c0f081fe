//! Capabilities an external sparse volume tree must expose for ingestion.
//!
//! One implementation exists per supported source format. The ingestor walks
//! internal nodes through [`SourceNode::tiles`] and [`SourceNode::children`];
//! a node one level above the leaves is instead scanned slot by slot through
//! the bitmask tests and [`SourceNode::dense_block`].

use glam::IVec3;
use sparsegrid_core::{GridTransform, ValueRange};

/// A node of a source tree (root included).
pub trait SourceNode {
    /// Node origin in domain (leaf voxel) coordinates.
    fn origin(&self) -> IVec3;

    /// Active constant-value regions, as `(origin, value)`, in slot order.
    fn tiles(&self) -> impl Iterator<Item = (IVec3, f32)> + '_;

    /// Active finer nodes, in slot order. Empty one level above the leaves.
    fn children(&self) -> impl Iterator<Item = &Self> + '_;

    /// Returns true if table slot `slot` holds an active tile.
    fn is_tile_active(&self, slot: usize) -> bool;

    /// Returns true if table slot `slot` holds an active child.
    fn is_child_active(&self, slot: usize) -> bool;

    /// Value stored in table slot `slot`.
    fn tile_value(&self, slot: usize) -> f32;

    /// Contiguous leaf voxels behind slot `slot`, z fastest.
    ///
    /// Only meaningful one level above the leaves.
    fn dense_block(&self, slot: usize) -> Option<&[f32]>;
}

/// One grid of a source container.
pub trait GridSource {
    /// Node type at every level of the tree.
    type Node: SourceNode;

    /// Grid name inside its container.
    fn name(&self) -> &str;

    /// Declared tree type; must equal the configured topology's identifier.
    fn topology_type(&self) -> String;

    /// Log2 side length of the root node's domain.
    fn domain_log_res(&self) -> u32;

    /// Number of active tiles at all levels.
    fn active_tile_count(&self) -> u64;

    /// Number of dense leaf blocks.
    fn active_leaf_count(&self) -> u64;

    /// Index-to-object transform.
    fn transform(&self) -> &GridTransform;

    /// Minimum and maximum over all active values.
    fn value_range(&self) -> ValueRange;

    /// Root node.
    fn root(&self) -> &Self::Node;
}
