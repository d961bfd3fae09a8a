//! Reference `TransactionContext` (`spec.md` §9's "callback-structured
//! transaction notify" note): a process-local transaction manager, for
//! standalone embedding and tests where there is no real host transaction
//! service.
//!
//! `TransactionManager` is the shared, multi-session state; `begin()` hands
//! out an `InMemoryTransactionContext` per session, each carrying its own
//! frozen snapshot of the committed set so concurrent sessions see
//! consistent point-in-time views even when commits land out of id order.

use kvs_core::context::{TransactionContext, TransactionNotify};
use kvs_core::TxnId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Shared {
    next_id: AtomicU64,
    running: Mutex<HashSet<TxnId>>,
    committed: Mutex<HashSet<TxnId>>,
    notifies: Mutex<HashMap<TxnId, Vec<Arc<dyn TransactionNotify>>>>,
}

/// Owns transaction-id allocation and resolution for every session in a
/// process. Not itself a `TransactionContext` — call `begin()` to get one.
pub struct TransactionManager {
    shared: Arc<Shared>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager {
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(0),
                running: Mutex::new(HashSet::new()),
                committed: Mutex::new(HashSet::new()),
                notifies: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Allocate a new transaction id and open a session view onto it.
    pub fn begin(&self) -> InMemoryTransactionContext {
        let txn_id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.running.lock().insert(txn_id);
        let snapshot = self.shared.committed.lock().clone();
        InMemoryTransactionContext {
            shared: Arc::clone(&self.shared),
            txn_id,
            snapshot,
        }
    }

    /// Resolve `txn_id` as committed, firing any notifies registered against it.
    pub fn commit(&self, txn_id: TxnId) {
        self.resolve(txn_id, true);
    }

    /// Resolve `txn_id` as aborted, firing any notifies registered against it.
    pub fn abort(&self, txn_id: TxnId) {
        self.resolve(txn_id, false);
    }

    fn resolve(&self, txn_id: TxnId, committed: bool) {
        self.shared.running.lock().remove(&txn_id);
        if committed {
            self.shared.committed.lock().insert(txn_id);
        }
        let notifies = self.shared.notifies.lock().remove(&txn_id).unwrap_or_default();
        for notify in notifies {
            notify.on_resolve(txn_id, committed);
        }
    }

    /// The oldest id any currently-running session could still need to see,
    /// for the Cleaner's globally-visible-all test (`spec.md` §4.6).
    pub fn oldest_id(&self) -> TxnId {
        self.shared
            .running
            .lock()
            .iter()
            .copied()
            .min()
            .unwrap_or_else(|| self.shared.next_id.load(Ordering::SeqCst) + 1)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One session's view of the transaction manager: its own id, plus a
/// snapshot of the committed set frozen at `begin()`.
pub struct InMemoryTransactionContext {
    shared: Arc<Shared>,
    txn_id: TxnId,
    snapshot: HashSet<TxnId>,
}

impl TransactionContext for InMemoryTransactionContext {
    fn current_id(&self) -> TxnId {
        self.txn_id
    }

    fn oldest_id(&self) -> TxnId {
        self.shared
            .running
            .lock()
            .iter()
            .copied()
            .min()
            .unwrap_or(self.txn_id)
    }

    fn is_visible(&self, txn_id: TxnId) -> bool {
        txn_id == self.txn_id || self.snapshot.contains(&txn_id)
    }

    fn register_commit_notify(&self, txn_id: TxnId, notify: Arc<dyn TransactionNotify>) {
        self.shared.notifies.lock().entry(txn_id).or_default().push(notify);
    }
}
