//! Transaction Log (`spec.md` §4.7): the process-wide namespace recording
//! the final committed/aborted state of every transaction ID that has
//! touched a cache.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use kvs_core::context::{TransactionNotify, TxnResolution};
use kvs_core::error::Result;
use kvs_core::kvdevice::KvDevice;
use kvs_core::uri::TXN_NAMESPACE;
use kvs_core::TxnId;
use std::sync::Arc;
use tracing::{debug, warn};

const COMMITTED: u8 = b'C';
const ABORTED: u8 = b'A';

fn encode_key(txn_id: TxnId) -> [u8; 8] {
    let mut buf = [0u8; 8];
    (&mut buf[..]).write_u64::<NativeEndian>(txn_id).expect("fixed-size buffer");
    buf
}

fn decode_key(bytes: &[u8]) -> TxnId {
    let mut cursor = bytes;
    cursor.read_u64::<NativeEndian>().expect("transaction log key is 8 bytes")
}

/// The Transaction Log: `txn_id -> {'C', 'A'}`, shared by every Device in
/// the process (`spec.md` §3, §4.7).
pub struct TransactionLog {
    device: Arc<dyn KvDevice>,
}

impl TransactionLog {
    /// Open (creating if absent) the transaction namespace on `device`.
    pub fn open(device: Arc<dyn KvDevice>) -> Result<Self> {
        device.create_namespace(TXN_NAMESPACE)?;
        Ok(TransactionLog { device })
    }

    /// Record `txn_id`'s resolution. Commits are flushed to stable storage
    /// before returning, per `spec.md` §3's durability invariant; aborts
    /// are not, since an abort that is lost on crash just looks unresolved
    /// again, which recovery already treats safely.
    pub fn set(&self, txn_id: TxnId, committed: bool) -> Result<()> {
        let key = encode_key(txn_id);
        let value = if committed { COMMITTED } else { ABORTED };
        self.device.put(TXN_NAMESPACE, &key, &[value])?;
        if committed {
            self.device.flush()?;
        }
        debug!(txn_id, committed, "transaction resolution recorded");
        Ok(())
    }

    /// Look up `txn_id`'s resolution. `Ok(None)` means unresolved.
    pub fn lookup(&self, txn_id: TxnId) -> Result<Option<bool>> {
        let key = encode_key(txn_id);
        match self.device.get(TXN_NAMESPACE, &key)? {
            None => Ok(None),
            Some(bytes) if bytes.first() == Some(&COMMITTED) => Ok(Some(true)),
            Some(bytes) if bytes.first() == Some(&ABORTED) => Ok(Some(false)),
            Some(_) => Ok(None),
        }
    }

    /// Remove every transaction record with `txn_id < txn_min`
    /// (`spec.md` §4.7, driven by the Cleaner after each pass).
    pub fn clean(&self, txn_min: TxnId) -> Result<()> {
        let mut after: Option<Vec<u8>> = None;
        let mut stale = Vec::new();
        loop {
            match self.device.next(TXN_NAMESPACE, after.as_deref())? {
                None => break,
                Some((key, _value)) => {
                    if decode_key(&key) < txn_min {
                        stale.push(key.clone());
                    }
                    after = Some(key);
                }
            }
        }
        let removed = stale.len();
        for key in stale {
            self.device.delete(TXN_NAMESPACE, &key)?;
        }
        if removed > 0 {
            debug!(removed, txn_min, "transaction log trimmed");
        }
        Ok(())
    }

    /// Discard every transaction record, for Recovery's final step
    /// (`spec.md` §4.8).
    pub fn truncate(&self) -> Result<()> {
        self.device.truncate_namespace(TXN_NAMESPACE)
    }
}

impl TxnResolution for TransactionLog {
    fn state(&self, txn_id: TxnId) -> Option<bool> {
        match self.lookup(txn_id) {
            Ok(state) => state,
            Err(e) => {
                warn!(?e, txn_id, "transaction log read failed, treating as unresolved");
                None
            }
        }
    }
}

impl TransactionNotify for TransactionLog {
    fn on_resolve(&self, txn_id: TxnId, committed: bool) {
        if let Err(e) = self.set(txn_id, committed) {
            warn!(?e, txn_id, "failed to record transaction resolution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_device::MemoryKvDevice;

    fn log() -> TransactionLog {
        TransactionLog::open(Arc::new(MemoryKvDevice::new())).unwrap()
    }

    #[test]
    fn unresolved_txn_reads_as_none() {
        let log = log();
        assert_eq!(log.lookup(1).unwrap(), None);
        assert_eq!(TxnResolution::state(&log, 1), None);
    }

    #[test]
    fn commit_and_abort_round_trip() {
        let log = log();
        log.set(1, true).unwrap();
        log.set(2, false).unwrap();
        assert_eq!(log.lookup(1).unwrap(), Some(true));
        assert_eq!(log.lookup(2).unwrap(), Some(false));
    }

    #[test]
    fn clean_removes_only_entries_below_txn_min() {
        let log = log();
        log.set(1, true).unwrap();
        log.set(2, false).unwrap();
        log.set(10, true).unwrap();
        log.clean(5).unwrap();
        assert_eq!(log.lookup(1).unwrap(), None);
        assert_eq!(log.lookup(2).unwrap(), None);
        assert_eq!(log.lookup(10).unwrap(), Some(true));
    }

    #[test]
    fn notify_trait_records_resolution() {
        let log = log();
        TransactionNotify::on_resolve(&log, 7, true);
        assert_eq!(log.lookup(7).unwrap(), Some(true));
    }

    #[test]
    fn truncate_clears_the_namespace() {
        let log = log();
        log.set(1, true).unwrap();
        log.truncate().unwrap();
        assert_eq!(log.lookup(1).unwrap(), None);
    }
}
