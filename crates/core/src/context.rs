//! The interface boundary to the host's transaction-ID service (`spec.md`
//! §1's "out of scope" list) and the commit/abort notification hook it
//! drives (`spec.md` §4.5/§4.6's `transaction_notify`).

use std::sync::Arc;

/// A transaction identifier, as assigned by the host.
pub type TxnId = u64;

/// The visibility and identity operations the host's transaction-ID
/// service must provide.
///
/// Implementations must be safe to call concurrently from any number of
/// cursor and cleaner threads.
pub trait TransactionContext: Send + Sync {
    /// The current transaction's ID, used to stamp new chain entries.
    fn current_id(&self) -> TxnId;

    /// The oldest transaction ID any running transaction could still need
    /// to see. Used by the Cleaner's globally-visible-all test.
    fn oldest_id(&self) -> TxnId;

    /// Whether `txn_id` is visible to the current transaction, per the
    /// host's snapshot-isolation predicate.
    fn is_visible(&self, txn_id: TxnId) -> bool;

    /// Register a callback to be invoked once `current_id()`'s transaction
    /// resolves (commits or aborts). The Device registers exactly one of
    /// these per write, per `spec.md` §4.5.
    fn register_commit_notify(&self, txn_id: TxnId, notify: Arc<dyn TransactionNotify>);
}

/// A commit/abort notification sink. `spec.md` §7: "Notifier failures do
/// not fail the triggering operation — they are logged and the operation
/// keeps its prior result," so implementations should not panic.
pub trait TransactionNotify: Send + Sync {
    /// Called once, when `txn_id` resolves.
    fn on_resolve(&self, txn_id: TxnId, committed: bool);
}

/// Read access to the Transaction Namespace's resolution state
/// (`spec.md` §3, §4.7), consumed by Cache Visibility without needing to
/// depend on the durability crate that implements it.
pub trait TxnResolution: Send + Sync {
    /// `Some(true)` committed, `Some(false)` aborted, `None` unresolved.
    fn state(&self, txn_id: TxnId) -> Option<bool>;
}
