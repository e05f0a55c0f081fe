//! Small value types shared across crates.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Minimum and maximum scalar value of a grid.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Range that contains nothing; including any value replaces it.
    pub const EMPTY: Self = Self {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    /// Create a range from its bounds.
    #[inline]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Range holding a single value.
    #[inline]
    pub const fn splat(value: f32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Returns true if no value has been included yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Grow the range to include `value`.
    #[inline]
    pub fn include(&mut self, value: f32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Union of two ranges.
    #[inline]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds as a `(min, max)` pair.
    #[inline]
    pub const fn as_tuple(&self) -> (f32, f32) {
        (self.min, self.max)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_grows_empty_range() {
        let mut range = ValueRange::EMPTY;
        assert!(range.is_empty());
        range.include(2.0);
        range.include(-1.5);
        assert!(!range.is_empty());
        assert_eq!(range.as_tuple(), (-1.5, 2.0));
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let range = ValueRange::new(0.0, 4.0);
        assert_eq!(range.merge(&ValueRange::EMPTY), range);
    }
}
