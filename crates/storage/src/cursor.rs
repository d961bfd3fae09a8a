//! Cursor Engine (`spec.md` §4.3): point operations and merged
//! cache+primary ordered traversal.

use crate::chain;
use crate::object::Object;
use crate::visibility;
use kvs_core::config::CursorConfig;
use kvs_core::context::{TransactionContext, TransactionNotify, TxnResolution};
use kvs_core::error::{Error, Result};
use kvs_core::format::KeyFormat;
use kvs_core::kvdevice::KvDevice;
use kvs_core::limits::MAX_KEY_LEN;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Cursor lifecycle state (`spec.md` §4.3): `new -> positioned <->
/// between-rows -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    New,
    Positioned,
    BetweenRows,
    Closed,
}

/// Which failure a write should report when the caller did not ask for
/// `overwrite` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExistenceRule {
    /// `insert`: fail with `DuplicateKey` if a value is already visible.
    FailIfPresent,
    /// `update`/`remove`: fail with `NotFound` if nothing is visible.
    FailIfAbsent,
    /// Caller passed `overwrite = true`: no existence check at all.
    Ignore,
}

/// A cursor open against one [`Object`], merging its cache and primary
/// namespaces through the `KvDevice`/`TransactionContext` trait boundary.
pub struct Cursor {
    object: Arc<Object>,
    device: Arc<dyn KvDevice>,
    txns: Arc<dyn TxnResolution>,
    notify: Arc<dyn TransactionNotify>,
    ctx: Arc<dyn TransactionContext>,
    key: Vec<u8>,
    state: CursorState,
    append: bool,
    overwrite: bool,
    closed: bool,
}

impl Cursor {
    /// Open a cursor, incrementing the Object's reference count.
    pub fn open(
        object: Arc<Object>,
        device: Arc<dyn KvDevice>,
        txns: Arc<dyn TxnResolution>,
        notify: Arc<dyn TransactionNotify>,
        ctx: Arc<dyn TransactionContext>,
        config: CursorConfig,
    ) -> Result<Self> {
        if config.append && object.key_format() != KeyFormat::RecordNumber {
            return Err(Error::invalid_argument("append is only valid for record-number objects"));
        }
        object.incref();
        Ok(Cursor {
            object,
            device,
            txns,
            notify,
            ctx,
            key: Vec::new(),
            state: CursorState::New,
            append: config.append,
            overwrite: config.overwrite,
            closed: false,
        })
    }

    /// `reset`: the next `next`/`prev` starts from the namespace extreme.
    pub fn reset(&mut self) {
        self.key.clear();
        self.state = CursorState::BetweenRows;
    }

    /// Close the cursor, decrementing the Object's reference count.
    pub fn close(mut self) {
        self.do_close();
    }

    fn do_close(&mut self) {
        if !self.closed {
            self.object.decref();
            self.closed = true;
            self.state = CursorState::Closed;
        }
    }

    fn check_key_len(key: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(Error::invalid_argument(format!(
                "key length {} exceeds maximum {MAX_KEY_LEN}",
                key.len()
            )));
        }
        Ok(())
    }

    /// `search(k)`: cache first, falling through to primary when the cache
    /// holds nothing this transaction can see.
    pub fn search(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        Self::check_key_len(key)?;
        self.key = key.to_vec();

        let cache_ns = self.object.cache_namespace();
        if let Some(raw) = self.device.get(&cache_ns, key)? {
            let entries = chain::parse_chain(&raw).map_err(|_| Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "corrupt update chain",
            )))?;
            if let Some(entry) = visibility::most_recent_visible(&entries, self.txns.as_ref(), self.ctx.as_ref()) {
                self.state = CursorState::Positioned;
                return if entry.removed {
                    Err(Error::NotFound)
                } else {
                    Ok(entry.value.unwrap_or(&[]).to_vec())
                };
            }
        }

        let primary_ns = self.object.primary_namespace();
        match self.device.get(&primary_ns, key)? {
            Some(value) => {
                self.state = CursorState::Positioned;
                Ok(value)
            }
            None => Err(Error::NotFound),
        }
    }

    /// `search_near(k)`: exact search, then next, then prev. Returns the
    /// match direction (`-1`/`0`/`+1`) together with the key and value.
    pub fn search_near(&mut self, key: &[u8]) -> Result<(i32, Vec<u8>, Vec<u8>)> {
        Self::check_key_len(key)?;
        if let Ok(value) = self.search(key) {
            return Ok((0, key.to_vec(), value));
        }

        self.key = key.to_vec();
        self.state = CursorState::Positioned;
        if let Some((k, v)) = self.merged_step(Some(key), true)? {
            self.key = k.clone();
            return Ok((1, k, v));
        }
        self.key = key.to_vec();
        if let Some((k, v)) = self.merged_step(Some(key), false)? {
            self.key = k.clone();
            return Ok((-1, k, v));
        }
        Err(Error::NotFound)
    }

    /// `next`: the smallest visible key greater than the cursor's current
    /// position, merging cache and primary.
    pub fn next(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let baseline = match self.state {
            CursorState::Positioned => Some(self.key.clone()),
            _ => None,
        };
        match self.merged_step(baseline.as_deref(), true)? {
            Some((k, v)) => {
                self.key = k.clone();
                self.state = CursorState::Positioned;
                Ok((k, v))
            }
            None => {
                self.state = CursorState::BetweenRows;
                Err(Error::NotFound)
            }
        }
    }

    /// `prev`: the largest visible key less than the cursor's current
    /// position, merging cache and primary.
    pub fn prev(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let baseline = match self.state {
            CursorState::Positioned => Some(self.key.clone()),
            _ => None,
        };
        match self.merged_step(baseline.as_deref(), false)? {
            Some((k, v)) => {
                self.key = k.clone();
                self.state = CursorState::Positioned;
                Ok((k, v))
            }
            None => {
                self.state = CursorState::BetweenRows;
                Err(Error::NotFound)
            }
        }
    }

    /// `insert(k, v)` for a byte-string key, or an explicit record-number
    /// key above the current append point (`spec.md` §4.3, §9: this
    /// silently advances `append_recno`, which is intentional).
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.advance_recno_if_record_number(key);
        self.write_entry(key, false, Some(value), ExistenceRule::FailIfPresent)
    }

    /// `insert` with `append=true`: allocate the next record number,
    /// returning the allocated id and the packed key actually written.
    /// Record-number packing itself is delegated to the host in
    /// `spec.md` §1; this adapter packs the id as big-endian bytes so the
    /// default byte-wise device ordering matches numeric order.
    pub fn insert_append(&mut self, value: &[u8]) -> Result<(u64, Vec<u8>)> {
        if !self.append || self.object.key_format() != KeyFormat::RecordNumber {
            return Err(Error::invalid_argument("insert_append requires an append cursor on a record-number object"));
        }
        let recno = self.object.allocate_append_recno();
        let key = recno.to_be_bytes().to_vec();
        self.write_entry(&key, false, Some(value), ExistenceRule::Ignore)?;
        Ok((recno, key))
    }

    fn advance_recno_if_record_number(&self, key: &[u8]) {
        if self.object.key_format() == KeyFormat::RecordNumber {
            if let Ok(bytes) = <[u8; 8]>::try_from(key) {
                self.object.advance_append_recno(u64::from_be_bytes(bytes));
            }
        }
    }

    /// `update(k, v)`. Like `insert`, an explicit record-number key above
    /// the current append point silently advances `append_recno`
    /// (`spec.md` §4.3, §9).
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.advance_recno_if_record_number(key);
        let rule = if self.overwrite {
            ExistenceRule::Ignore
        } else {
            ExistenceRule::FailIfAbsent
        };
        self.write_entry(key, false, Some(value), rule)
    }

    /// `remove(k)`. On a single-bit-field value format this is rewritten
    /// as `update` with a zero byte, since there is no tombstone semantics
    /// at the bit level (`spec.md` §4.3).
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        if self.object.value_format().is_bitfield() {
            return self.update(key, &[0u8]);
        }
        let rule = if self.overwrite {
            ExistenceRule::Ignore
        } else {
            ExistenceRule::FailIfAbsent
        };
        self.write_entry(key, true, None, rule)
    }

    fn write_entry(
        &mut self,
        key: &[u8],
        removed: bool,
        value: Option<&[u8]>,
        rule: ExistenceRule,
    ) -> Result<()> {
        Self::check_key_len(key)?;
        let cache_ns = self.object.cache_namespace();
        let primary_ns = self.object.primary_namespace();

        let guard = self.object.lock().write();
        let mut cache_chain = self.device.get(&cache_ns, key)?.unwrap_or_default();

        {
            let entries = chain::parse_chain(&cache_chain).map_err(|_| {
                Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt update chain"))
            })?;

            if visibility::has_conflict(&entries, self.txns.as_ref(), self.ctx.as_ref()) {
                return Err(Error::Deadlock);
            }

            let visible = visibility::most_recent_visible(&entries, self.txns.as_ref(), self.ctx.as_ref());
            match rule {
                ExistenceRule::Ignore => {}
                ExistenceRule::FailIfPresent => {
                    let present = match visible {
                        Some(e) if !e.removed => true,
                        Some(_) => false,
                        None => self.device.get(&primary_ns, key)?.is_some(),
                    };
                    if present {
                        return Err(Error::DuplicateKey);
                    }
                }
                ExistenceRule::FailIfAbsent => {
                    let present = match visible {
                        Some(e) if !e.removed => true,
                        Some(_) => false,
                        None => self.device.get(&primary_ns, key)?.is_some(),
                    };
                    if !present {
                        return Err(Error::NotFound);
                    }
                }
            }
        }

        let txn_id = self.ctx.current_id();
        chain::append_entry(&mut cache_chain, txn_id, removed, value);
        self.device.put(&cache_ns, key, &cache_chain)?;
        self.object.note_write((key.len() + value.map_or(0, |v| v.len())) as u64);
        drop(guard);

        self.ctx.register_commit_notify(txn_id, Arc::clone(&self.notify));
        trace!(key_len = key.len(), removed, "cache chain updated");
        Ok(())
    }

    /// Shared merged-traversal step for `next`/`prev`/`search_near`
    /// (`spec.md` §4.3 steps 1-5).
    fn merged_step(&self, baseline: Option<&[u8]>, forward: bool) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let primary_ns = self.object.primary_namespace();

        if !self.object.cache_in_use() {
            return if forward {
                self.device.next(&primary_ns, baseline)
            } else {
                self.device.prev(&primary_ns, baseline)
            };
        }

        let mut step_baseline = baseline.map(<[u8]>::to_vec);
        loop {
            let cache_hit = self.scan_cache_for_visible(step_baseline.as_deref(), forward)?;
            let primary_hit = if forward {
                self.device.next(&primary_ns, step_baseline.as_deref())?
            } else {
                self.device.prev(&primary_ns, step_baseline.as_deref())?
            };

            let winner = match (cache_hit, primary_hit) {
                (None, None) => return Ok(None),
                (Some(c), None) => Winner::Cache(c),
                (None, Some(p)) => Winner::Primary(p),
                (Some(c), Some(p)) => {
                    let cmp = c.0.cmp(&p.0);
                    let cache_wins = if forward {
                        cmp != Ordering::Greater
                    } else {
                        cmp != Ordering::Less
                    };
                    if cache_wins {
                        Winner::Cache(c)
                    } else {
                        Winner::Primary(p)
                    }
                }
            };

            match winner {
                Winner::Primary((k, v)) => return Ok(Some((k, v))),
                Winner::Cache((k, removed, value)) => {
                    if removed {
                        step_baseline = Some(k);
                        continue;
                    }
                    return Ok(Some((k, value.unwrap_or_default())));
                }
            }
        }
    }

    /// Advance the cache cursor until a chain with a visible entry is
    /// found, or the namespace is exhausted (`spec.md` §4.3 step 2).
    fn scan_cache_for_visible(
        &self,
        baseline: Option<&[u8]>,
        forward: bool,
    ) -> Result<Option<(Vec<u8>, bool, Option<Vec<u8>>)>> {
        let cache_ns = self.object.cache_namespace();
        let mut cursor = baseline.map(<[u8]>::to_vec);
        loop {
            let next = if forward {
                self.device.next(&cache_ns, cursor.as_deref())?
            } else {
                self.device.prev(&cache_ns, cursor.as_deref())?
            };
            match next {
                None => return Ok(None),
                Some((k, raw)) => {
                    let entries = chain::parse_chain(&raw).map_err(|_| {
                        Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt update chain"))
                    })?;
                    if let Some(entry) = visibility::most_recent_visible(&entries, self.txns.as_ref(), self.ctx.as_ref()) {
                        return Ok(Some((k, entry.removed, entry.value.map(<[u8]>::to_vec))));
                    }
                    cursor = Some(k);
                }
            }
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.do_close();
    }
}

enum Winner {
    Cache((Vec<u8>, bool, Option<Vec<u8>>)),
    Primary((Vec<u8>, Vec<u8>)),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvs_core::format::ValueFormat;
    use kvs_core::Uri;
    use kvs_durability::{MemoryKvDevice, TransactionLog};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct TestContext {
        current: std::sync::atomic::AtomicU64,
        oldest: std::sync::atomic::AtomicU64,
        visible_upto: std::sync::atomic::AtomicU64,
        pending: StdMutex<HashMap<u64, Vec<Arc<dyn TransactionNotify>>>>,
    }

    impl TestContext {
        fn new() -> Arc<Self> {
            Arc::new(TestContext {
                current: std::sync::atomic::AtomicU64::new(0),
                oldest: std::sync::atomic::AtomicU64::new(0),
                visible_upto: std::sync::atomic::AtomicU64::new(0),
                pending: StdMutex::new(HashMap::new()),
            })
        }

        fn begin(&self, txn_id: u64) {
            self.current.store(txn_id, std::sync::atomic::Ordering::SeqCst);
        }

        fn commit(&self, txn_id: u64) {
            self.visible_upto.fetch_max(txn_id, std::sync::atomic::Ordering::SeqCst);
            self.oldest.fetch_max(txn_id + 1, std::sync::atomic::Ordering::SeqCst);
            if let Some(notifies) = self.pending.lock().unwrap().remove(&txn_id) {
                for n in notifies {
                    n.on_resolve(txn_id, true);
                }
            }
        }
    }

    impl TransactionContext for TestContext {
        fn current_id(&self) -> u64 {
            self.current.load(std::sync::atomic::Ordering::SeqCst)
        }
        fn oldest_id(&self) -> u64 {
            self.oldest.load(std::sync::atomic::Ordering::SeqCst)
        }
        fn is_visible(&self, txn_id: u64) -> bool {
            txn_id <= self.visible_upto.load(std::sync::atomic::Ordering::SeqCst)
        }
        fn register_commit_notify(&self, txn_id: u64, notify: Arc<dyn TransactionNotify>) {
            self.pending.lock().unwrap().entry(txn_id).or_default().push(notify);
        }
    }

    fn setup() -> (Arc<Object>, Arc<dyn KvDevice>, Arc<TransactionLog>, Arc<TestContext>) {
        let device: Arc<dyn KvDevice> = Arc::new(MemoryKvDevice::new());
        let uri = Uri::parse("table:d/t").unwrap();
        device.create_namespace(&uri.primary_namespace()).unwrap();
        device.create_namespace(&uri.cache_namespace()).unwrap();
        let object = Arc::new(Object::new(uri, KeyFormat::ByteString, ValueFormat::parse("u")));
        let txn_log = Arc::new(TransactionLog::open(Arc::clone(&device)).unwrap());
        let ctx = TestContext::new();
        (object, device, txn_log, ctx)
    }

    fn cursor(
        object: &Arc<Object>,
        device: &Arc<dyn KvDevice>,
        txn_log: &Arc<TransactionLog>,
        ctx: &Arc<TestContext>,
        overwrite: bool,
    ) -> Cursor {
        let config = CursorConfig {
            append: false,
            overwrite,
            collator: None,
        };
        Cursor::open(
            Arc::clone(object),
            Arc::clone(device),
            txn_log.clone() as Arc<dyn TxnResolution>,
            txn_log.clone() as Arc<dyn TransactionNotify>,
            ctx.clone() as Arc<dyn TransactionContext>,
            config,
        )
        .unwrap()
    }

    #[test]
    fn insert_then_search_round_trips() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(10);
        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        c.insert(b"a", b"1").unwrap();
        ctx.commit(10);
        assert_eq!(c.search(b"a").unwrap(), b"1");
    }

    #[test]
    fn insert_then_remove_then_search_not_found() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(10);
        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        c.insert(b"a", b"1").unwrap();
        ctx.commit(10);
        ctx.begin(11);
        c.remove(b"a").unwrap();
        ctx.commit(11);
        assert!(matches!(c.search(b"a"), Err(Error::NotFound)));
    }

    #[test]
    fn insert_then_update_then_search_sees_latest() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(10);
        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        c.insert(b"a", b"1").unwrap();
        ctx.commit(10);
        ctx.begin(11);
        c.update(b"a", b"2").unwrap();
        ctx.commit(11);
        assert_eq!(c.search(b"a").unwrap(), b"2");
    }

    #[test]
    fn duplicate_insert_without_overwrite_fails() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(10);
        let mut c = cursor(&object, &device, &txn_log, &ctx, false);
        c.insert(b"a", b"1").unwrap();
        ctx.commit(10);
        ctx.begin(11);
        assert!(matches!(c.insert(b"a", b"2"), Err(Error::DuplicateKey)));
    }

    #[test]
    fn write_write_conflict_returns_deadlock() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(30);
        let mut c1 = cursor(&object, &device, &txn_log, &ctx, true);
        c1.update(b"a", b"x").unwrap(); // uncommitted

        ctx.begin(31);
        let mut c2 = cursor(&object, &device, &txn_log, &ctx, true);
        assert!(matches!(c2.update(b"a", b"y"), Err(Error::Deadlock)));
    }

    #[test]
    fn next_from_reset_returns_minimum_key() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(1);
        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        c.insert(b"b", b"2").unwrap();
        c.insert(b"a", b"1").unwrap();
        c.insert(b"c", b"3").unwrap();
        ctx.commit(1);

        c.reset();
        let (k, v) = c.next().unwrap();
        assert_eq!(k, b"a");
        assert_eq!(v, b"1");
    }

    #[test]
    fn prev_from_reset_returns_maximum_key() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(1);
        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        c.insert(b"b", b"2").unwrap();
        c.insert(b"a", b"1").unwrap();
        c.insert(b"c", b"3").unwrap();
        ctx.commit(1);

        c.reset();
        let (k, _v) = c.prev().unwrap();
        assert_eq!(k, b"c");
    }

    #[test]
    fn tombstone_suppresses_primary_entry_during_traversal() {
        let (object, device, txn_log, ctx) = setup();
        // Primary already has "b" (simulating a prior cleaner pass).
        device.put(&object.primary_namespace(), b"b", b"old").unwrap();

        ctx.begin(40);
        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        c.remove(b"b").unwrap();
        ctx.commit(40);

        c.reset();
        let (k, _v) = c.next().unwrap();
        assert_ne!(k, b"b");
    }

    #[test]
    fn key_exceeding_max_length_is_rejected() {
        let (object, device, txn_log, ctx) = setup();
        ctx.begin(1);
        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        let huge = vec![0u8; MAX_KEY_LEN + 1];
        assert!(matches!(c.insert(&huge, b"v"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn explicit_recno_update_above_append_point_advances_it() {
        let uri = Uri::parse("table:d/t").unwrap();
        let device: Arc<dyn KvDevice> = Arc::new(MemoryKvDevice::new());
        device.create_namespace(&uri.primary_namespace()).unwrap();
        device.create_namespace(&uri.cache_namespace()).unwrap();
        let object = Arc::new(Object::new(uri, KeyFormat::RecordNumber, ValueFormat::parse("u")));
        let txn_log = Arc::new(TransactionLog::open(Arc::clone(&device)).unwrap());
        let ctx = TestContext::new();
        ctx.begin(1);

        let mut c = cursor(&object, &device, &txn_log, &ctx, true);
        c.update(&5u64.to_be_bytes(), b"v").unwrap();
        ctx.commit(1);

        assert_eq!(object.append_recno(), 5);
    }

    #[test]
    fn append_allocates_sequential_record_numbers() {
        let uri = Uri::parse("table:d/t").unwrap();
        let device: Arc<dyn KvDevice> = Arc::new(MemoryKvDevice::new());
        device.create_namespace(&uri.primary_namespace()).unwrap();
        device.create_namespace(&uri.cache_namespace()).unwrap();
        let object = Arc::new(Object::new(uri, KeyFormat::RecordNumber, ValueFormat::parse("u")));
        let txn_log = Arc::new(TransactionLog::open(Arc::clone(&device)).unwrap());
        let ctx = TestContext::new();

        let config = CursorConfig {
            append: true,
            overwrite: false,
            collator: None,
        };
        let mut c = Cursor::open(
            Arc::clone(&object),
            Arc::clone(&device),
            txn_log.clone() as Arc<dyn TxnResolution>,
            txn_log.clone() as Arc<dyn TransactionNotify>,
            ctx.clone() as Arc<dyn TransactionContext>,
            config,
        )
        .unwrap();

        ctx.begin(1);
        let (r1, _) = c.insert_append(b"x").unwrap();
        let (r2, _) = c.insert_append(b"y").unwrap();
        let (r3, _) = c.insert_append(b"z").unwrap();
        ctx.commit(1);
        assert_eq!((r1, r2, r3), (1, 2, 3));

        c.reset();
        let (k, _v) = c.prev().unwrap();
        assert_eq!(k, 3u64.to_be_bytes().to_vec());
    }
}
