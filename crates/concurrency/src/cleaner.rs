//! Cleaner (`spec.md` §4.6): migrates globally-visible cache chains into
//! the primary namespace, deletes them from the cache, and trims the
//! Transaction Log. Runs as a background thread, one per Device.
//!
//! `spec.md` §9 flags the source's "fake cursor with a null session" used
//! to reuse cursor code paths for this; this walks the cache namespace and
//! objects directly instead, with no `Cursor` in sight.

use kvs_core::context::TransactionContext;
use kvs_core::error::{Error, Result};
use kvs_core::kvdevice::KvDevice;
use kvs_core::limits::{CLEANER_BACKOFF_MAX, CLEANER_BACKOFF_MIN, CLEANER_BYTE_LIMIT, CLEANER_OPS_LIMIT};
use kvs_core::TxnId;
use kvs_durability::TransactionLog;
use kvs_storage::chain;
use kvs_storage::visibility;
use kvs_storage::Object;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

fn corrupt_chain(uri_context: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("corrupt update chain in {uri_context}"),
    ))
}

/// Run one cleaner pass over `objects`. `recovery_mode` selects
/// last-committed over last-not-aborted and treats every chain as eligible
/// regardless of `oldest` (`spec.md` §4.8).
pub fn run_pass(
    objects: &[Arc<Object>],
    device: &dyn KvDevice,
    txn_log: &TransactionLog,
    oldest: TxnId,
    recovery_mode: bool,
) -> Result<()> {
    let mut txn_min_overall: Option<TxnId> = None;
    let mut observe_min = |m: TxnId| {
        txn_min_overall = Some(txn_min_overall.map_or(m, |cur| cur.min(m)));
    };

    for object in objects {
        let cache_ns = object.cache_namespace();
        let primary_ns = object.primary_namespace();
        // Every globally-visible-all chain's key, whether or not it had a
        // winner to migrate — all of them are deleted from the cache below
        // (`spec.md` §4.6 step 4: "for every globally-visible-all chain,
        // delete the cache key," unconditionally).
        let mut eligible_keys = Vec::new();
        let mut after: Option<Vec<u8>> = None;

        loop {
            let Some((key, raw)) = device.next(&cache_ns, after.as_deref())? else {
                break;
            };
            after = Some(key.clone());

            let entries = chain::parse_chain(&raw).map_err(|_| corrupt_chain(&cache_ns))?;
            let eligible = recovery_mode || visibility::globally_visible_all(&entries, oldest);
            if !eligible {
                // Only chains that remain in the cache push the trim floor
                // down; a globally-visible chain is leaving regardless of
                // whether it had a live winner.
                if let Some(m) = visibility::txn_min(&entries) {
                    observe_min(m);
                }
                continue;
            }

            eligible_keys.push(key.clone());

            let winner = if recovery_mode {
                visibility::last_committed(&entries, txn_log)
            } else {
                visibility::last_not_aborted(&entries, txn_log)
            };

            match winner {
                Some(entry) if entry.removed => {
                    device.delete(&primary_ns, &key)?;
                }
                Some(entry) => {
                    device.put(&primary_ns, &key, entry.value.unwrap_or(&[]))?;
                }
                None => {
                    // Every entry in this chain resolved aborted: nothing to
                    // migrate into primary, but the chain is still
                    // globally-visible-all and is deleted below like any
                    // other eligible chain.
                }
            }
        }

        device.flush()?;

        {
            let _guard = object.lock().write();
            for key in &eligible_keys {
                device.delete(&cache_ns, key)?;
            }
        }
        object.reset_clean_counters();

        if !eligible_keys.is_empty() {
            debug!(uri = %object.uri(), cleared = eligible_keys.len(), "cleaner cleared globally-visible cache chains");
        }
    }

    txn_log.clean(txn_min_overall.unwrap_or(oldest))?;
    Ok(())
}

/// The background cleaner loop (`spec.md` §4.6 steps 1 and 6): exponential
/// back-off between 1s and 5s while no Object exceeds the byte or ops
/// threshold, reset to the minimum whenever one does.
pub fn run_loop(
    objects_provider: impl Fn() -> Vec<Arc<Object>>,
    device: Arc<dyn KvDevice>,
    txn_log: Arc<TransactionLog>,
    ctx: Arc<dyn TransactionContext>,
    stop: Arc<AtomicBool>,
) {
    let mut backoff = CLEANER_BACKOFF_MIN;

    loop {
        let objects = objects_provider();
        let over_threshold = objects
            .iter()
            .any(|o| o.bytes_since_clean() >= CLEANER_BYTE_LIMIT || o.ops_since_clean() >= CLEANER_OPS_LIMIT);

        if over_threshold {
            backoff = CLEANER_BACKOFF_MIN;
        } else {
            thread::sleep(backoff);
            backoff = (backoff * 2).min(CLEANER_BACKOFF_MAX);
        }

        let oldest = ctx.oldest_id();
        if let Err(e) = run_pass(&objects, device.as_ref(), &txn_log, oldest, false) {
            warn!(?e, "cleaner pass failed");
        }

        if stop.load(Ordering::SeqCst) {
            let objects = objects_provider();
            let oldest = ctx.oldest_id();
            if let Err(e) = run_pass(&objects, device.as_ref(), &txn_log, oldest, false) {
                warn!(?e, "final cleaner drain failed");
            }
            break;
        }
    }
}
