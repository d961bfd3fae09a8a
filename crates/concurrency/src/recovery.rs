//! Recovery (`spec.md` §4.8): on startup, after every Device has been
//! opened and the Transaction Namespace located, drive the Cleaner in
//! recovery mode over every object found on the device, then truncate the
//! cache and transaction namespaces.

use crate::cleaner;
use crate::device::Device;
use kvs_core::error::Result;
use kvs_core::format::{KeyFormat, ObjectMetadata};
use kvs_core::uri::{RESERVED_PREFIX, TXN_NAMESPACE};
use kvs_core::Uri;
use kvs_storage::OpenFlags;
use std::sync::Arc;
use tracing::{info, warn};

/// Run recovery for `device`. Namespaces whose metadata entry is missing
/// (an object the catalog never recorded, or a catalog that itself did not
/// survive the crash) are logged and skipped rather than treated as fatal —
/// there is nothing safe to reconstruct them from.
pub fn recover(device: &Device) -> Result<()> {
    let names = device.kv().list_namespaces()?;

    for name in names {
        let Some(object_name) = name.strip_prefix(RESERVED_PREFIX) else {
            continue;
        };
        if name == TXN_NAMESPACE || object_name.ends_with(".cache") {
            continue;
        }

        let uri = Uri::parse(&format!("table:{}/{object_name}", device.name()))?;
        let Some(meta_str) = device_metadata(device, &uri)? else {
            warn!(%uri, "no metadata for namespace found during recovery, skipping");
            continue;
        };
        let meta = ObjectMetadata::parse(&meta_str)?;

        let object = device.objects().open(
            &uri,
            OpenFlags::default(),
            device.kv().as_ref(),
            device.catalog().as_ref(),
            meta.key_format(),
            &meta.value_format(),
        )?;

        cleaner::run_pass(&[Arc::clone(&object)], device.kv().as_ref(), device.txn_log(), 0, true)?;

        if meta.key_format() == KeyFormat::RecordNumber {
            if let Some((key, _)) = device.kv().prev(&object.primary_namespace(), None)? {
                if let Ok(bytes) = <[u8; 8]>::try_from(key.as_slice()) {
                    object.set_append_recno(u64::from_be_bytes(bytes));
                }
            }
        }

        device.kv().truncate_namespace(&object.cache_namespace())?;
        info!(%uri, "object recovered");
    }

    device.txn_log().truncate()?;
    Ok(())
}

fn device_metadata(device: &Device, uri: &Uri) -> Result<Option<String>> {
    device.catalog().get(&uri.to_string())
}
