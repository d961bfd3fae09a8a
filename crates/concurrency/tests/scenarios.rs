//! End-to-end scenarios spanning Device, Cursor, Cleaner, and Recovery.

use kvs_core::config::CursorConfig;
use kvs_core::context::TransactionContext;
use kvs_core::error::Error;
use kvs_core::format::{KeyFormat, ValueFormat};
use kvs_core::kvdevice::KvDevice;
use kvs_core::metadata::MetadataCatalog;
use kvs_core::Uri;
use kvs_concurrency::{cleaner, recover, Device, TransactionManager};
use kvs_durability::{MemoryKvDevice, MemoryMetadataCatalog};
use std::sync::Arc;

fn fresh_device() -> Arc<Device> {
    let kv: Arc<dyn KvDevice> = Arc::new(MemoryKvDevice::new());
    let catalog: Arc<dyn MetadataCatalog> = Arc::new(MemoryMetadataCatalog::new());
    Device::open("d", "", kv, catalog, None).unwrap()
}

#[test]
fn scenario_single_writer_then_cleaner_migrates_to_primary() {
    let device = fresh_device();
    let uri = Uri::parse("table:d/t").unwrap();
    device.create(&uri, KeyFormat::ByteString, ValueFormat::parse("u")).unwrap();

    let mgr = TransactionManager::new();
    let ctx = mgr.begin();
    let txn_id = ctx.current_id();
    let mut cursor = device
        .open_cursor(&uri, CursorConfig { overwrite: true, ..Default::default() }, Arc::new(ctx))
        .unwrap();
    cursor.insert(b"a", b"1").unwrap();
    mgr.commit(txn_id);
    assert_eq!(cursor.search(b"a").unwrap(), b"1");
    drop(cursor);

    let object = device.objects().get(&uri).unwrap();
    cleaner::run_pass(&[object], device.kv().as_ref(), device.txn_log(), 11, false).unwrap();

    assert_eq!(device.kv().get(&uri.primary_namespace(), b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(device.kv().get(&uri.cache_namespace(), b"a").unwrap(), None);
}

#[test]
fn scenario_snapshot_isolation_across_readers() {
    let device = fresh_device();
    let uri = Uri::parse("table:d/t").unwrap();
    device.create(&uri, KeyFormat::ByteString, ValueFormat::parse("u")).unwrap();

    let mgr = TransactionManager::new();

    let writer10 = mgr.begin();
    let writer10_id = writer10.current_id();
    let mut c10 = device
        .open_cursor(&uri, CursorConfig { overwrite: true, ..Default::default() }, Arc::new(writer10))
        .unwrap();
    c10.insert(b"a", b"1").unwrap();
    mgr.commit(writer10_id);

    let reader15 = mgr.begin();
    let mut c15 = device.open_cursor(&uri, Default::default(), Arc::new(reader15)).unwrap();
    assert_eq!(c15.search(b"a").unwrap(), b"1");

    let writer20 = mgr.begin();
    let writer20_id = writer20.current_id();
    let mut c20 = device
        .open_cursor(&uri, CursorConfig { overwrite: true, ..Default::default() }, Arc::new(writer20))
        .unwrap();
    c20.update(b"a", b"2").unwrap();

    // Reader started before writer20 committed still sees the old value.
    assert_eq!(c15.search(b"a").unwrap(), b"1");

    mgr.commit(writer20_id);

    let reader25 = mgr.begin();
    let mut c25 = device.open_cursor(&uri, Default::default(), Arc::new(reader25)).unwrap();
    assert_eq!(c25.search(b"a").unwrap(), b"2");
}

#[test]
fn scenario_write_write_conflict_returns_deadlock() {
    let device = fresh_device();
    let uri = Uri::parse("table:d/t").unwrap();
    device.create(&uri, KeyFormat::ByteString, ValueFormat::parse("u")).unwrap();

    let mgr = TransactionManager::new();

    let writer30 = mgr.begin();
    let mut c30 = device
        .open_cursor(&uri, CursorConfig { overwrite: true, ..Default::default() }, Arc::new(writer30))
        .unwrap();
    c30.update(b"a", b"x").unwrap(); // left uncommitted

    let writer31 = mgr.begin();
    let mut c31 = device
        .open_cursor(&uri, CursorConfig { overwrite: true, ..Default::default() }, Arc::new(writer31))
        .unwrap();
    assert!(matches!(c31.update(b"a", b"y"), Err(Error::Deadlock)));
}

#[test]
fn scenario_tombstone_suppresses_primary_entry_until_cleaned() {
    let device = fresh_device();
    let uri = Uri::parse("table:d/t").unwrap();
    device.create(&uri, KeyFormat::ByteString, ValueFormat::parse("u")).unwrap();
    device.kv().put(&uri.primary_namespace(), b"b", b"old").unwrap();

    let mgr = TransactionManager::new();
    let writer40 = mgr.begin();
    let writer40_id = writer40.current_id();
    let mut cursor = device
        .open_cursor(&uri, CursorConfig { overwrite: true, ..Default::default() }, Arc::new(writer40))
        .unwrap();
    cursor.remove(b"b").unwrap();
    mgr.commit(writer40_id);

    cursor.reset();
    let next = cursor.next();
    assert!(next.is_err() || next.unwrap().0 != b"b");
    drop(cursor);

    let object = device.objects().get(&uri).unwrap();
    cleaner::run_pass(&[object], device.kv().as_ref(), device.txn_log(), 41, false).unwrap();
    assert_eq!(device.kv().get(&uri.primary_namespace(), b"b").unwrap(), None);
}

#[test]
fn scenario_record_number_append_survives_recovery() {
    let device = fresh_device();
    let uri = Uri::parse("table:d/t").unwrap();
    device.create(&uri, KeyFormat::RecordNumber, ValueFormat::parse("u")).unwrap();

    let mgr = TransactionManager::new();
    let ctx = mgr.begin();
    let txn_id = ctx.current_id();
    let mut cursor = device
        .open_cursor(&uri, CursorConfig { append: true, ..Default::default() }, Arc::new(ctx))
        .unwrap();
    let (r1, _) = cursor.insert_append(b"x").unwrap();
    let (r2, _) = cursor.insert_append(b"y").unwrap();
    let (r3, _) = cursor.insert_append(b"z").unwrap();
    mgr.commit(txn_id);
    assert_eq!((r1, r2, r3), (1, 2, 3));

    cursor.reset();
    let (k, _) = cursor.prev().unwrap();
    assert_eq!(k, 3u64.to_be_bytes().to_vec());
    drop(cursor);

    recover(&device).unwrap();

    let object = device.objects().get(&uri).unwrap();
    assert_eq!(object.append_recno(), 3);
}

#[test]
fn scenario_cross_namespace_tx_store_shared_between_devices() {
    let kv1: Arc<dyn KvDevice> = Arc::new(MemoryKvDevice::new());
    let kv2: Arc<dyn KvDevice> = Arc::new(MemoryKvDevice::new());
    let catalog: Arc<dyn MetadataCatalog> = Arc::new(MemoryMetadataCatalog::new());

    let device1 = Device::open("d1", "", kv1, Arc::clone(&catalog), None).unwrap();
    let device2 = Device::open("d2", "", kv2, catalog, Some(Arc::clone(device1.txn_log()))).unwrap();

    let uri2 = Uri::parse("table:d2/t").unwrap();
    device2.create(&uri2, KeyFormat::ByteString, ValueFormat::parse("u")).unwrap();

    let mgr = TransactionManager::new();
    let ctx = mgr.begin();
    let txn_id = ctx.current_id();
    let mut cursor = device2
        .open_cursor(&uri2, CursorConfig { overwrite: true, ..Default::default() }, Arc::new(ctx))
        .unwrap();
    cursor.insert(b"a", b"1").unwrap();
    mgr.commit(txn_id);

    // The commit notification went to device1's Transaction Log, the
    // owner, since device2 was handed the same Arc<TransactionLog>.
    assert_eq!(device1.txn_log().lookup(txn_id).unwrap(), Some(true));
}
