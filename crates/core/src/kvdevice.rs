//! The interface boundary to the underlying sorted KV device (`spec.md`
//! §1's "out of scope" list): point get/put/delete, ordered next/prev, and
//! namespace lifecycle plus a coarse flush-to-stable primitive.

use crate::error::Result;

/// A single sorted key/value device offering only the point and ordered
/// traversal primitives this adapter needs. One `KvDevice` backs one
/// Device (`spec.md` §3); all of an object's primary, cache, and (for the
/// owning Device) transaction namespaces live inside the same `KvDevice`.
pub trait KvDevice: Send + Sync {
    /// Create a namespace. Idempotent: creating an existing namespace is
    /// not an error, mirroring the device's own `CREATE` open flag.
    fn create_namespace(&self, name: &str) -> Result<()>;

    /// Drop a namespace and all of its contents.
    fn drop_namespace(&self, name: &str) -> Result<()>;

    /// Rename a namespace in place.
    fn rename_namespace(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Remove all contents of a namespace without dropping it.
    fn truncate_namespace(&self, name: &str) -> Result<()>;

    /// Point lookup. `Ok(None)` means the key is absent.
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Point insert/overwrite.
    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Point delete. Deleting an absent key is not an error.
    fn delete(&self, namespace: &str, key: &[u8]) -> Result<()>;

    /// The smallest key strictly greater than `after` (or the smallest key
    /// in the namespace if `after` is `None`).
    fn next(&self, namespace: &str, after: Option<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// The largest key strictly less than `before` (or the largest key in
    /// the namespace if `before` is `None`).
    fn prev(&self, namespace: &str, before: Option<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// Flush all namespaces on this device to stable storage.
    fn flush(&self) -> Result<()>;

    /// List namespace names currently present on the device, for Recovery's
    /// enumeration step (`spec.md` §4.8). Order is unspecified.
    fn list_namespaces(&self) -> Result<Vec<String>>;
}
