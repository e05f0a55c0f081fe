//! Process-wide topology context.
//!
//! The topology is derived once at startup, before any ingestion, and shared
//! read-only afterwards.

use std::sync::Arc;

use parking_lot::RwLock;
use sparsegrid_core::{LevelTopology, TopologyConfig};

use crate::error::Result;

/// Global topology.
static TOPOLOGY: RwLock<Option<Arc<LevelTopology>>> = RwLock::new(None);

/// Derive and store the process-wide topology.
///
/// Returns `false` without touching the stored topology if it was already
/// initialized. An invalid configuration is rejected and leaves the context
/// uninitialized.
pub fn init(config: &TopologyConfig) -> Result<bool> {
    let mut guard = TOPOLOGY.write();
    if guard.is_some() {
        return Ok(false);
    }
    let topology = LevelTopology::from_config(config)?;
    tracing::info!("Grid topology initialized: {topology}");
    *guard = Some(Arc::new(topology));
    Ok(true)
}

/// The process-wide topology, if initialized.
#[inline]
pub fn topology() -> Option<Arc<LevelTopology>> {
    TOPOLOGY.read().clone()
}

/// Returns true once [`init`] has succeeded.
#[inline]
pub fn is_initialized() -> bool {
    TOPOLOGY.read().is_some()
}

/// Drop the process-wide topology. Ingestors already holding it keep working.
pub fn shutdown() {
    if TOPOLOGY.write().take().is_some() {
        tracing::debug!("Grid topology released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VolumeError;
    use crate::ingest::TreeIngestor;

    // Single test: the context is global to the test binary.
    #[test]
    fn lifecycle() {
        shutdown();
        assert!(!is_initialized());
        assert!(matches!(
            TreeIngestor::from_context(),
            Err(VolumeError::NotInitialized)
        ));

        assert!(init(&TopologyConfig::new(vec![4, 0, 3])).is_err());
        assert!(!is_initialized());

        assert!(init(&TopologyConfig::default()).unwrap());
        assert!(!init(&TopologyConfig::new(vec![3, 3])).unwrap());
        let ingestor = TreeIngestor::from_context().unwrap();
        assert_eq!(ingestor.topology().type_name(), "Tree_float_5_4_3");

        shutdown();
        assert!(topology().is_none());
        assert_eq!(ingestor.topology().depth(), 4);
    }
}
