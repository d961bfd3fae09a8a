//! The Object type (`spec.md` §3): a logical table identified by a URI,
//! with exactly one primary and one cache namespace, a reader/writer lock,
//! a cursor reference count, and the two cleaner counters.

use kvs_core::format::{KeyFormat, ValueFormat};
use kvs_core::Uri;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// A table-like object backed by a primary namespace and a cache namespace.
///
/// Shared by every cursor open against it (reference-counted); held
/// write-locked for any operation that mutates a cache chain or bumps
/// `append_recno`, per `spec.md` §5.
pub struct Object {
    uri: Uri,
    key_format: KeyFormat,
    value_format: ValueFormat,
    /// Write-exclusive for chain mutation and `append_recno` bumps;
    /// readers (`search`, `next`/`prev`) do not need it — the underlying
    /// device provides per-key atomicity.
    lock: RwLock<()>,
    refcount: AtomicUsize,
    append_recno: AtomicU64,
    bytes_since_clean: AtomicU64,
    ops_since_clean: AtomicU64,
    /// Set on the object's first modifying operation; `next`/`prev` use
    /// this to bypass the cache namespace entirely until it has ever held
    /// anything (`spec.md` §4.3 step 1).
    cache_inuse: AtomicBool,
}

impl Object {
    /// Create a freshly opened Object. `append_recno` starts at zero;
    /// Recovery re-seeds it from the primary's last key for record-number
    /// objects (`spec.md` §8 scenario 5).
    pub fn new(uri: Uri, key_format: KeyFormat, value_format: ValueFormat) -> Self {
        Object {
            uri,
            key_format,
            value_format,
            lock: RwLock::new(()),
            refcount: AtomicUsize::new(0),
            append_recno: AtomicU64::new(0),
            bytes_since_clean: AtomicU64::new(0),
            ops_since_clean: AtomicU64::new(0),
            cache_inuse: AtomicBool::new(false),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn primary_namespace(&self) -> String {
        self.uri.primary_namespace()
    }

    pub fn cache_namespace(&self) -> String {
        self.uri.cache_namespace()
    }

    pub fn key_format(&self) -> KeyFormat {
        self.key_format
    }

    pub fn value_format(&self) -> &ValueFormat {
        &self.value_format
    }

    /// The object's reader/writer lock, for chain mutation and
    /// `append_recno` bumps.
    pub fn lock(&self) -> &RwLock<()> {
        &self.lock
    }

    /// Increment the cursor reference count; called on `open_cursor`.
    pub fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the cursor reference count; called on cursor `close`.
    pub fn decref(&self) {
        self.refcount.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::SeqCst)
    }

    /// Allocate the next record number for an `append` insert.
    pub fn allocate_append_recno(&self) -> u64 {
        self.append_recno.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advance `append_recno` to at least `recno`, for an explicit
    /// record-number insert/update above the current append point
    /// (`spec.md` §4.3, §9 — intentionally not reverted on failure).
    pub fn advance_append_recno(&self, recno: u64) {
        self.append_recno.fetch_max(recno, Ordering::SeqCst);
    }

    pub fn append_recno(&self) -> u64 {
        self.append_recno.load(Ordering::SeqCst)
    }

    /// Re-seed `append_recno` during recovery (`spec.md` §8 scenario 5).
    pub fn set_append_recno(&self, recno: u64) {
        self.append_recno.store(recno, Ordering::SeqCst);
    }

    /// Record that a write of `bytes` just landed in the cache, for the
    /// Cleaner's byte/ops thresholds (`spec.md` §4.6).
    pub fn note_write(&self, bytes: u64) {
        self.bytes_since_clean.fetch_add(bytes, Ordering::SeqCst);
        self.ops_since_clean.fetch_add(1, Ordering::SeqCst);
        self.cache_inuse.store(true, Ordering::SeqCst);
    }

    pub fn bytes_since_clean(&self) -> u64 {
        self.bytes_since_clean.load(Ordering::SeqCst)
    }

    pub fn ops_since_clean(&self) -> u64 {
        self.ops_since_clean.load(Ordering::SeqCst)
    }

    /// Reset both cleaner counters after a cleaner pass migrates this
    /// object's globally-visible chains.
    pub fn reset_clean_counters(&self) {
        self.bytes_since_clean.store(0, Ordering::SeqCst);
        self.ops_since_clean.store(0, Ordering::SeqCst);
    }

    /// Whether the cache namespace has ever held an entry for this object.
    pub fn cache_in_use(&self) -> bool {
        self.cache_inuse.load(Ordering::SeqCst)
    }

    /// Mark the cache namespace as having been used, without a write going
    /// through `note_write` (Recovery sets this directly when it finds
    /// pre-existing cache entries on startup).
    pub fn mark_cache_inuse(&self) {
        self.cache_inuse.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvs_core::format::ValueFormat;

    fn test_object() -> Object {
        let uri = Uri::parse("table:d/t").unwrap();
        Object::new(uri, KeyFormat::ByteString, ValueFormat::parse("u"))
    }

    #[test]
    fn refcount_tracks_incref_decref() {
        let obj = test_object();
        assert_eq!(obj.refcount(), 0);
        obj.incref();
        obj.incref();
        assert_eq!(obj.refcount(), 2);
        obj.decref();
        assert_eq!(obj.refcount(), 1);
    }

    #[test]
    fn append_recno_allocates_sequentially() {
        let obj = test_object();
        assert_eq!(obj.allocate_append_recno(), 1);
        assert_eq!(obj.allocate_append_recno(), 2);
        assert_eq!(obj.allocate_append_recno(), 3);
    }

    #[test]
    fn advance_append_recno_never_goes_backwards() {
        let obj = test_object();
        obj.advance_append_recno(10);
        obj.advance_append_recno(5);
        assert_eq!(obj.append_recno(), 10);
    }

    #[test]
    fn note_write_updates_counters_and_marks_inuse() {
        let obj = test_object();
        assert!(!obj.cache_in_use());
        obj.note_write(100);
        obj.note_write(50);
        assert_eq!(obj.bytes_since_clean(), 150);
        assert_eq!(obj.ops_since_clean(), 2);
        assert!(obj.cache_in_use());
        obj.reset_clean_counters();
        assert_eq!(obj.bytes_since_clean(), 0);
        assert_eq!(obj.ops_since_clean(), 0);
    }
}
