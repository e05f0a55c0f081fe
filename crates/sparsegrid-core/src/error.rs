//! Error types for topology configuration and transforms.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Tree has fewer levels than a root and a leaf
    #[error("Invalid tree depth {depth}: at least {min} levels are required")]
    InvalidDepth { depth: usize, min: usize },

    /// A level stores no voxels of its own
    #[error("Invalid log-resolution at level {level}: must be at least 1")]
    InvalidLogRes { level: usize },

    /// A single level is too large to address
    #[error("Log-resolution {log_res} at level {level} exceeds the maximum of {max}")]
    LogResTooLarge { level: usize, log_res: u32, max: u32 },

    /// The root domain does not fit signed 32-bit coordinates
    #[error("Total log-resolution {total_log_res} exceeds the maximum of {max}")]
    DomainTooLarge { total_log_res: u32, max: u32 },

    /// Level index outside the configured tree
    #[error("Level {level} is outside a tree of depth {depth}")]
    LevelOutOfRange { level: u32, depth: usize },

    /// Transform is not an affine map
    #[error("Only linearly transformed volumes are supported (found {kind})")]
    NonLinearTransform { kind: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
