//! The interface boundary to the host's metadata catalog (`spec.md` §1's
//! "out of scope" list), used to persist the per-object format string from
//! `spec.md` §6.

use crate::error::Result;

/// A catalog mapping object URIs to their persisted metadata string.
pub trait MetadataCatalog: Send + Sync {
    /// Insert or overwrite the metadata entry for `uri`.
    fn insert(&self, uri: &str, metadata: &str) -> Result<()>;

    /// Look up the metadata entry for `uri`.
    fn get(&self, uri: &str) -> Result<Option<String>>;

    /// Remove the metadata entry for `uri`. Removing an absent entry is not
    /// an error.
    fn remove(&self, uri: &str) -> Result<()>;
}
