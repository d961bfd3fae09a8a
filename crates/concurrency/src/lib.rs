//! Process-wide composition: Device Binding, the background Cleaner,
//! Recovery, and a reference `TransactionContext` for standalone embedding
//! (`spec.md` §4.5-§4.8).
//!
//! Depends on all three lower crates: `kvs-core` for the shared traits,
//! `kvs-storage` for the Cursor Engine and Object Registry, `kvs-durability`
//! for the Transaction Log.

pub mod cleaner;
pub mod context;
pub mod device;
pub mod recovery;

pub use context::{InMemoryTransactionContext, TransactionManager};
pub use device::Device;
pub use recovery::recover;
