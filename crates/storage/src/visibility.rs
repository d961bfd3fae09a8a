//! Cache Visibility (`spec.md` §4.2): the snapshot-isolation scan over a
//! parsed update chain.

use crate::chain::ChainEntry;
use kvs_core::context::{TransactionContext, TxnResolution};
use kvs_core::TxnId;

/// True if the transaction store resolved `entry` as aborted.
pub fn is_aborted(entry: &ChainEntry<'_>, txns: &dyn TxnResolution) -> bool {
    txns.state(entry.txn_id) == Some(false)
}

/// Scan back-to-front for the first non-aborted entry the current
/// transaction's visibility predicate admits. `None` if nothing qualifies.
pub fn most_recent_visible<'a>(
    entries: &[ChainEntry<'a>],
    txns: &dyn TxnResolution,
    ctx: &dyn TransactionContext,
) -> Option<ChainEntry<'a>> {
    entries
        .iter()
        .rev()
        .find(|e| !is_aborted(e, txns) && ctx.is_visible(e.txn_id))
        .copied()
}

/// True iff every entry's `txn_id` is strictly less than `oldest_id` — no
/// running transaction could still need to see any of them.
pub fn globally_visible_all(entries: &[ChainEntry<'_>], oldest_id: TxnId) -> bool {
    entries.iter().all(|e| e.txn_id < oldest_id)
}

/// Scan back-to-front for the first entry the transaction store resolved
/// as committed. Used only by Recovery, where unresolved entries must be
/// treated as though they never existed.
pub fn last_committed<'a>(
    entries: &[ChainEntry<'a>],
    txns: &dyn TxnResolution,
) -> Option<ChainEntry<'a>> {
    entries
        .iter()
        .rev()
        .find(|e| txns.state(e.txn_id) == Some(true))
        .copied()
}

/// Scan back-to-front for the first non-aborted entry. Safe only when
/// `globally_visible_all` is already known to hold, since then every entry
/// is resolved one way or the other (`spec.md` §4.2).
pub fn last_not_aborted<'a>(
    entries: &[ChainEntry<'a>],
    txns: &dyn TxnResolution,
) -> Option<ChainEntry<'a>> {
    entries.iter().rev().find(|e| !is_aborted(e, txns)).copied()
}

/// The smallest `txn_id` across all entries in the chain.
pub fn txn_min(entries: &[ChainEntry<'_>]) -> Option<TxnId> {
    entries.iter().map(|e| e.txn_id).min()
}

/// Snapshot-isolation write/write conflict check (`spec.md` §4.2,
/// "update-check"): true if any entry is neither aborted nor visible to
/// the current transaction, meaning a concurrent, not-yet-resolved writer
/// has touched this key and the caller must abort and retry.
pub fn has_conflict(
    entries: &[ChainEntry<'_>],
    txns: &dyn TxnResolution,
    ctx: &dyn TransactionContext,
) -> bool {
    entries
        .iter()
        .any(|e| !is_aborted(e, txns) && !ctx.is_visible(e.txn_id))
}
