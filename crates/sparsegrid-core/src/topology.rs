//! Per-level addressing constants for the sparse tree.
//!
//! A topology is derived once from a branching schedule and is read-only
//! afterwards. Level 0 is the root; the last level holds dense leaf blocks.
//! Every per-axis size is a power of two, so all addressing reduces to masks
//! and shifts (see [`crate::mapping`]).

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_LOG_RES, MAX_LEVEL_LOG_RES, MAX_TOTAL_LOG_RES, MIN_DEPTH, TOPOLOGY_TYPE_PREFIX,
};
use crate::error::{Error, Result};
use crate::mapping::CoordinateMapper;

/// Branching schedule of a tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Log2 of the voxels per axis stored at each level, root first.
    pub log_res: Vec<u32>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            log_res: DEFAULT_LOG_RES.to_vec(),
        }
    }
}

impl TopologyConfig {
    /// Create a config from a root-first list of log-resolutions.
    pub fn new(log_res: impl Into<Vec<u32>>) -> Self {
        Self {
            log_res: log_res.into(),
        }
    }

    /// Number of levels in the schedule.
    #[inline]
    pub fn depth(&self) -> usize {
        self.log_res.len()
    }
}

/// Parses a comma separated schedule such as `6,5,4,3`.
impl FromStr for TopologyConfig {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let log_res = s
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { log_res })
    }
}

/// Addressing constants of a single level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LevelInfo {
    /// Log2 of the voxels per axis stored directly in a node of this level.
    pub log_res: u32,
    /// Voxels per axis of a node (`2^log_res`).
    pub storage_res: u32,
    /// Voxels in a node (`storage_res^3`).
    pub num_voxels: u64,
    /// Cumulative log-resolution from this level down to the leaf.
    pub total_log_res: u32,
    /// Side length, in leaf voxels, of the region a node of this level covers.
    pub domain_res: u64,
}

impl LevelInfo {
    fn new(log_res: u32, total_log_res: u32) -> Self {
        Self {
            log_res,
            storage_res: 1 << log_res,
            num_voxels: 1 << (3 * log_res),
            total_log_res,
            domain_res: 1 << total_log_res,
        }
    }
}

/// Immutable per-level table for a configured tree.
///
/// Cheap to clone and safe to share between threads; wrap it in an `Arc`
/// when several ingestions run against the same configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TopologyConfig", into = "TopologyConfig")]
pub struct LevelTopology {
    levels: Vec<LevelInfo>,
}

impl LevelTopology {
    /// Derive the table from a configuration.
    pub fn from_config(config: &TopologyConfig) -> Result<Self> {
        Self::new(&config.log_res)
    }

    /// Derive the table from a root-first list of log-resolutions.
    pub fn new(log_res: &[u32]) -> Result<Self> {
        let depth = log_res.len();
        if depth < MIN_DEPTH {
            return Err(Error::InvalidDepth {
                depth,
                min: MIN_DEPTH,
            });
        }

        for (level, &res) in log_res.iter().enumerate() {
            if res == 0 {
                return Err(Error::InvalidLogRes { level });
            }
            if res > MAX_LEVEL_LOG_RES {
                return Err(Error::LogResTooLarge {
                    level,
                    log_res: res,
                    max: MAX_LEVEL_LOG_RES,
                });
            }
        }

        let total_log_res: u32 = log_res.iter().sum();
        if total_log_res > MAX_TOTAL_LOG_RES {
            return Err(Error::DomainTooLarge {
                total_log_res,
                max: MAX_TOTAL_LOG_RES,
            });
        }

        // Accumulate from the leaf towards the root.
        let mut levels = Vec::with_capacity(depth);
        let mut below = 0;
        for &res in log_res.iter().rev() {
            let total = res + below;
            levels.push(LevelInfo::new(res, total));
            below = total;
        }
        levels.reverse();

        Ok(Self { levels })
    }

    /// Number of levels, root and leaf included.
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Index of the leaf level.
    #[inline]
    pub fn leaf_level(&self) -> u32 {
        (self.levels.len() - 1) as u32
    }

    /// All levels, root first.
    #[inline]
    pub fn levels(&self) -> &[LevelInfo] {
        &self.levels
    }

    /// Constants of one level, or `None` past the leaf.
    #[inline]
    pub fn level(&self, level: u32) -> Option<&LevelInfo> {
        self.levels.get(level as usize)
    }

    /// Fail unless `level` names a level of this tree.
    pub fn check_level(&self, level: u32) -> Result<()> {
        if (level as usize) < self.levels.len() {
            Ok(())
        } else {
            Err(Error::LevelOutOfRange {
                level,
                depth: self.levels.len(),
            })
        }
    }

    /// Log2 voxels per axis stored at `level`.
    ///
    /// # Panics
    /// Panics if `level` is past the leaf.
    #[inline]
    pub fn log_res(&self, level: u32) -> u32 {
        self.levels[level as usize].log_res
    }

    /// Voxels per axis of a node at `level`.
    #[inline]
    pub fn storage_res(&self, level: u32) -> u32 {
        self.levels[level as usize].storage_res
    }

    /// Voxels in a node at `level`.
    #[inline]
    pub fn num_voxels(&self, level: u32) -> u64 {
        self.levels[level as usize].num_voxels
    }

    /// Cumulative log-resolution from `level` to the leaf.
    ///
    /// Returns 0 for the level just past the leaf so callers can shift by the
    /// next level's value without special-casing the leaf.
    #[inline]
    pub fn total_log_res(&self, level: u32) -> u32 {
        self.levels
            .get(level as usize)
            .map_or(0, |info| info.total_log_res)
    }

    /// Side length, in leaf voxels, covered by a node at `level`.
    #[inline]
    pub fn domain_res(&self, level: u32) -> u64 {
        1 << self.total_log_res(level)
    }

    /// Side length, in leaf voxels, covered by one voxel of a node at `level`.
    #[inline]
    pub fn child_res(&self, level: u32) -> u64 {
        1 << self.total_log_res(level + 1)
    }

    /// Log2 side length of the whole domain.
    #[inline]
    pub fn domain_log_res(&self) -> u32 {
        self.levels[0].total_log_res
    }

    /// Scalars in one dense leaf block.
    #[inline]
    pub fn leaf_voxels(&self) -> u64 {
        self.levels[self.levels.len() - 1].num_voxels
    }

    /// Identifier a source tree must declare to be compatible, e.g. `Tree_float_5_4_3`.
    ///
    /// The root level is left out; it is matched through [`Self::domain_log_res`].
    pub fn type_name(&self) -> String {
        let mut name = String::from(TOPOLOGY_TYPE_PREFIX);
        for info in &self.levels[1..] {
            name.push('_');
            name.push_str(&info.log_res.to_string());
        }
        name
    }

    /// The schedule this table was derived from.
    pub fn config(&self) -> TopologyConfig {
        TopologyConfig::new(
            self.levels
                .iter()
                .map(|info| info.log_res)
                .collect::<Vec<_>>(),
        )
    }

    /// Coordinate mapping functions parameterized by this table.
    #[inline]
    pub fn mapper(&self) -> CoordinateMapper<'_> {
        CoordinateMapper::new(self)
    }
}

impl TryFrom<TopologyConfig> for LevelTopology {
    type Error = Error;

    fn try_from(config: TopologyConfig) -> Result<Self> {
        Self::from_config(&config)
    }
}

impl From<LevelTopology> for TopologyConfig {
    fn from(topology: LevelTopology) -> Self {
        topology.config()
    }
}

impl fmt::Display for LevelTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (domain 2^{})", self.type_name(), self.domain_log_res())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_constants() {
        let topology = LevelTopology::from_config(&TopologyConfig::default()).unwrap();

        let total: Vec<u32> = topology.levels().iter().map(|l| l.total_log_res).collect();
        let storage: Vec<u32> = topology.levels().iter().map(|l| l.storage_res).collect();
        assert_eq!(total, [18, 12, 7, 3]);
        assert_eq!(storage, [64, 32, 16, 8]);
        assert_eq!(topology.leaf_voxels(), 512);
        assert_eq!(topology.domain_res(0), 262_144);
        assert_eq!(topology.num_voxels(0), 262_144);
        assert_eq!(topology.domain_res(1), 4096);
        assert_eq!(topology.domain_res(2), 128);
        assert_eq!(topology.leaf_level(), 3);
    }

    #[test]
    fn total_log_res_recurrence() {
        let schedules: [&[u32]; 5] = [&[6, 5, 4, 3], &[3, 3], &[1, 1, 1], &[4, 2, 7, 1, 3], &[10, 10]];
        for schedule in schedules {
            let topology = LevelTopology::new(schedule).unwrap();
            let leaf = topology.leaf_level();
            assert_eq!(topology.total_log_res(leaf), topology.log_res(leaf));
            for level in 0..leaf {
                assert_eq!(
                    topology.total_log_res(level),
                    topology.log_res(level) + topology.total_log_res(level + 1)
                );
                assert!(topology.total_log_res(level) > topology.total_log_res(level + 1));
            }
            assert_eq!(topology.total_log_res(leaf + 1), 0);
        }
    }

    #[test]
    fn child_res_is_next_domain_res() {
        let topology = LevelTopology::new(&[6, 5, 4, 3]).unwrap();
        assert_eq!(topology.child_res(2), 8);
        assert_eq!(topology.child_res(1), 128);
        assert_eq!(topology.child_res(3), 1);
    }

    #[test]
    fn rejects_zero_log_res() {
        assert_eq!(
            LevelTopology::new(&[6, 0, 4, 3]),
            Err(Error::InvalidLogRes { level: 1 })
        );
    }

    #[test]
    fn rejects_shallow_and_oversized_trees() {
        assert!(matches!(
            LevelTopology::new(&[3]),
            Err(Error::InvalidDepth { depth: 1, .. })
        ));
        assert!(matches!(
            LevelTopology::new(&[11, 3]),
            Err(Error::LogResTooLarge { level: 0, .. })
        ));
        assert!(matches!(
            LevelTopology::new(&[8, 8, 8, 8]),
            Err(Error::DomainTooLarge {
                total_log_res: 32,
                ..
            })
        ));
    }

    #[test]
    fn type_name_skips_root() {
        let topology = LevelTopology::new(&[6, 5, 4, 3]).unwrap();
        assert_eq!(topology.type_name(), "Tree_float_5_4_3");
        assert_eq!(topology.config(), TopologyConfig::default());
    }

    #[test]
    fn parse_schedule() {
        let config: TopologyConfig = "6, 5,4,3".parse().unwrap();
        assert_eq!(config, TopologyConfig::default());
        assert!("6,x".parse::<TopologyConfig>().is_err());
    }
}
