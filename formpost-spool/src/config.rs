use std::sync::Arc;

use serde::Deserialize;

use crate::{
    backends::{FileBackingStore, MemoryBackingStore},
    r#trait::BackingStore,
};

/// Configuration for the spool backing store
///
/// Selects the backing store implementation at runtime. Config files are
/// read with the `unwrap_variant_newtypes` and `implicit_some` RON
/// extensions enabled, so the variant payload is written inline.
///
/// # Examples
///
/// File-backed spool:
/// ```ron
/// Formpost (
///     spool: File(
///         path: "/var/spool/formpost",
///         stale_claim_secs: 600,
///     ),
/// )
/// ```
///
/// Memory-backed spool with capacity limit:
/// ```ron
/// Formpost (
///     spool: Memory(
///         capacity: 1000,
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum SpoolConfig {
    /// File-based spool (production)
    File(FileBackingStore),
    /// Memory-based spool (testing/development)
    ///
    /// Nothing survives a restart, so only suitable where losing queued
    /// notifications is acceptable.
    Memory(MemoryConfig),
}

/// Configuration for memory-backed spool
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemoryConfig {
    /// Maximum number of messages to store (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::File(FileBackingStore::default())
    }
}

impl SpoolConfig {
    /// Get the filesystem path for file-backed spools, if applicable
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(store) => Some(store.path()),
            Self::Memory(_) => None,
        }
    }

    /// Initialise and convert the configuration into a backing store
    ///
    /// File-backed stores are initialised first: the directory is created,
    /// orphaned temporary files removed and stale claims returned to pending.
    ///
    /// # Errors
    /// Returns an error if file spool initialisation fails (directory
    /// creation, permissions, etc.)
    pub fn into_backing_store(self) -> crate::Result<Arc<dyn BackingStore>> {
        match self {
            Self::File(store) => {
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory(config) => Ok(config.capacity.map_or_else(
                || Arc::new(MemoryBackingStore::new()) as Arc<dyn BackingStore>,
                |capacity| Arc::new(MemoryBackingStore::with_capacity(capacity)),
            )),
        }
    }
}
