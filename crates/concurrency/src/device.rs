//! Device Binding (`spec.md` §4.5): per-device state tying together the KV
//! handle, the Object Registry, the shared Transaction Log, and this
//! Device's cleaner thread.

use crate::cleaner;
use kvs_core::config::{CursorConfig, DeviceConfig};
use kvs_core::context::{TransactionContext, TransactionNotify, TxnResolution};
use kvs_core::error::{Error, Result};
use kvs_core::format::{KeyFormat, ObjectMetadata, ValueFormat};
use kvs_core::kvdevice::KvDevice;
use kvs_core::metadata::MetadataCatalog;
use kvs_core::Uri;
use kvs_durability::TransactionLog;
use kvs_storage::{Cursor, Object, ObjectRegistry, OpenFlags};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

/// A bound backing device: one `KvDevice` handle, this device's Objects,
/// and a pointer to the process-wide Transaction Log (`spec.md` §3).
///
/// Exactly one `Device` in a process creates the Transaction Log; every
/// other `Device` opened afterwards is handed the same `Arc<TransactionLog>`
/// (`spec.md` §4.7, §8 scenario 6).
pub struct Device {
    name: String,
    config: DeviceConfig,
    kv: Arc<dyn KvDevice>,
    catalog: Arc<dyn MetadataCatalog>,
    objects: ObjectRegistry,
    txn_log: Arc<TransactionLog>,
    cleaner_stop: Arc<AtomicBool>,
    cleaner_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    /// Open a Device. Pass `shared_txn_log` when another already-open
    /// Device in this process owns the Transaction Log; pass `None` to
    /// have this Device create and own it.
    pub fn open(
        name: impl Into<String>,
        config_str: &str,
        kv: Arc<dyn KvDevice>,
        catalog: Arc<dyn MetadataCatalog>,
        shared_txn_log: Option<Arc<TransactionLog>>,
    ) -> Result<Arc<Device>> {
        let config = DeviceConfig::parse(config_str)?;
        let txn_log = match shared_txn_log {
            Some(log) => log,
            None => Arc::new(TransactionLog::open(Arc::clone(&kv))?),
        };

        let name = name.into();
        info!(device = %name, "device opened");
        Ok(Arc::new(Device {
            name,
            config,
            kv,
            catalog,
            objects: ObjectRegistry::new(),
            txn_log,
            cleaner_stop: Arc::new(AtomicBool::new(false)),
            cleaner_thread: Mutex::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn kv(&self) -> &Arc<dyn KvDevice> {
        &self.kv
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn catalog(&self) -> &Arc<dyn MetadataCatalog> {
        &self.catalog
    }

    /// The shared Transaction Log, to hand to a second Device that should
    /// reference the same Transaction Namespace (`spec.md` §8 scenario 6).
    pub fn txn_log(&self) -> &Arc<TransactionLog> {
        &self.txn_log
    }

    /// `create(uri, ...)`: open-or-create the Object and persist its format
    /// metadata.
    pub fn create(&self, uri: &Uri, key_format: KeyFormat, value_format: ValueFormat) -> Result<()> {
        self.objects
            .open(uri, OpenFlags::default(), self.kv.as_ref(), self.catalog.as_ref(), key_format, &value_format)?;
        Ok(())
    }

    /// `open_cursor(uri, config)`. Reads format metadata from the catalog
    /// when the Object is not already registered in memory (fresh process,
    /// existing on-device object).
    pub fn open_cursor(&self, uri: &Uri, config: CursorConfig, ctx: Arc<dyn TransactionContext>) -> Result<Cursor> {
        let object = self.resolve_object(uri)?;
        Cursor::open(
            object,
            Arc::clone(&self.kv),
            Arc::clone(&self.txn_log) as Arc<dyn TxnResolution>,
            Arc::clone(&self.txn_log) as Arc<dyn TransactionNotify>,
            ctx,
            config,
        )
    }

    fn resolve_object(&self, uri: &Uri) -> Result<Arc<Object>> {
        if let Some(object) = self.objects.get(uri) {
            return Ok(object);
        }
        let meta_str = self
            .catalog
            .get(&uri.to_string())?
            .ok_or_else(|| Error::invalid_argument(format!("no such object: {uri}")))?;
        let meta = ObjectMetadata::parse(&meta_str)?;
        self.objects.open(
            uri,
            OpenFlags::default(),
            self.kv.as_ref(),
            self.catalog.as_ref(),
            meta.key_format(),
            &meta.value_format(),
        )
    }

    pub fn drop_object(&self, uri: &Uri, key_format: KeyFormat, value_format: &ValueFormat) -> Result<()> {
        self.objects.drop_object(uri, self.kv.as_ref(), self.catalog.as_ref(), key_format, value_format)
    }

    pub fn rename_object(&self, uri: &Uri, new_uri: &Uri, key_format: KeyFormat, value_format: &ValueFormat) -> Result<()> {
        self.objects
            .rename_object(uri, new_uri, self.kv.as_ref(), self.catalog.as_ref(), key_format, value_format)
    }

    pub fn truncate_object(&self, uri: &Uri, key_format: KeyFormat, value_format: &ValueFormat) -> Result<()> {
        self.objects
            .truncate_object(uri, self.kv.as_ref(), self.catalog.as_ref(), key_format, value_format)
    }

    /// `checkpoint`: flush the device to stable storage.
    pub fn checkpoint(&self) -> Result<()> {
        self.kv.flush()
    }

    /// `verify`: intentionally unimplemented (`spec.md` §6, §7).
    pub fn verify(&self, _uri: &Uri) -> Result<()> {
        Err(Error::NotSupported("verify".to_string()))
    }

    /// Spawn this Device's cleaner thread (`spec.md` §4.6).
    pub fn start_cleaner(self: &Arc<Self>, ctx: Arc<dyn TransactionContext>) {
        let device = Arc::clone(self);
        let stop = Arc::clone(&self.cleaner_stop);
        let handle = thread::spawn(move || {
            cleaner::run_loop(
                || device.objects.all(),
                Arc::clone(&device.kv),
                Arc::clone(&device.txn_log),
                ctx,
                stop,
            )
        });
        *self.cleaner_thread.lock() = Some(handle);
    }

    /// Signal the cleaner to drain and stop, then join it.
    pub fn stop_cleaner(&self) {
        self.cleaner_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.cleaner_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop_cleaner();
    }
}
