//! On-disk grid container.
//!
//! Layout: 4-byte magic `SGRD`, little-endian `u32` format version, then the
//! bincode-encoded list of grids in declaration order.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, VolumeError};
use crate::memory::MemoryGrid;
use crate::source::GridSource;

/// Container magic.
pub const GRID_FILE_MAGIC: [u8; 4] = *b"SGRD";

/// Container format version written by this crate.
pub const GRID_FILE_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Which grid to take from a container holding several.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum GridSelection {
    /// The last declared grid.
    #[default]
    Last,
    /// The first declared grid.
    First,
    /// The last declared grid with this name.
    Named(String),
}

impl fmt::Display for GridSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last => f.write_str("last"),
            Self::First => f.write_str("first"),
            Self::Named(name) => write!(f, "'{name}'"),
        }
    }
}

/// Grids loaded from one container file.
#[derive(Clone, Debug)]
pub struct GridFile {
    path: PathBuf,
    grids: Vec<MemoryGrid>,
}

impl GridFile {
    /// Read and validate a container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| VolumeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let grids = decode(path, &bytes)?;
        info!("Loaded {} grid(s) from {}", grids.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            grids,
        })
    }

    /// Write `grids` as a new container, replacing any existing file.
    pub fn write(path: impl AsRef<Path>, grids: &[MemoryGrid]) -> Result<()> {
        let path = path.as_ref();
        let bytes = encode(grids).map_err(|source| VolumeError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, bytes).map_err(|source| VolumeError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Wrote {} grid(s) to {}", grids.len(), path.display());
        Ok(())
    }

    /// File the grids were read from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All grids in declaration order.
    #[inline]
    pub fn grids(&self) -> &[MemoryGrid] {
        &self.grids
    }

    /// Grid names in declaration order.
    pub fn grid_names(&self) -> Vec<&str> {
        self.grids.iter().map(GridSource::name).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.grids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Last declared grid called `name`.
    pub fn grid(&self, name: &str) -> Option<&MemoryGrid> {
        self.grids.iter().rev().find(|grid| grid.name() == name)
    }

    /// Pick one grid. Implicit picks among several grids are logged.
    pub fn select(&self, selection: &GridSelection) -> Result<&MemoryGrid> {
        let index = self.position(selection)?;
        Ok(&self.grids[index])
    }

    /// Like [`Self::select`], keeping only the chosen grid.
    pub fn into_grid(mut self, selection: &GridSelection) -> Result<MemoryGrid> {
        let index = self.position(selection)?;
        Ok(self.grids.swap_remove(index))
    }

    fn position(&self, selection: &GridSelection) -> Result<usize> {
        if self.grids.len() > 1 && !matches!(selection, GridSelection::Named(_)) {
            warn!(
                "{} contains {} grids ({}), using the {} one",
                self.path.display(),
                self.grids.len(),
                self.grid_names().join(", "),
                selection
            );
        }

        let index = match selection {
            GridSelection::Last => self.grids.len().checked_sub(1),
            GridSelection::First => (!self.grids.is_empty()).then_some(0),
            GridSelection::Named(name) => self.grids.iter().rposition(|grid| grid.name() == name),
        };

        index.ok_or_else(|| match selection {
            GridSelection::Named(name) => VolumeError::GridNotFound { name: name.clone() },
            _ => VolumeError::EmptyContainer {
                path: self.path.clone(),
            },
        })
    }
}

fn encode(grids: &[MemoryGrid]) -> bincode::Result<Vec<u8>> {
    let payload = bincode::serialize(grids)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&GRID_FILE_MAGIC);
    bytes.extend_from_slice(&GRID_FILE_VERSION.to_le_bytes());
    bytes.extend(payload);
    Ok(bytes)
}

fn decode(path: &Path, bytes: &[u8]) -> Result<Vec<MemoryGrid>> {
    if bytes.len() < HEADER_LEN || bytes[..4] != GRID_FILE_MAGIC {
        return Err(VolumeError::BadMagic {
            path: path.to_path_buf(),
        });
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != GRID_FILE_VERSION {
        return Err(VolumeError::UnsupportedVersion {
            path: path.to_path_buf(),
            version,
        });
    }

    let grids: Vec<MemoryGrid> =
        bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|source| VolumeError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    if grids.is_empty() {
        return Err(VolumeError::EmptyContainer {
            path: path.to_path_buf(),
        });
    }
    for grid in &grids {
        grid.validate()?;
    }
    Ok(grids)
}
