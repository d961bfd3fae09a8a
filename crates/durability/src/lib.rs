//! The Transaction Log (`spec.md` §4.7) plus the reference `KvDevice` and
//! `MetadataCatalog` implementations standalone embedding and the test
//! suite use in place of a real host.
//!
//! Depends only on `kvs-core`, mirroring the teacher workspace's
//! `strata-durability` sitting beside (not above) `strata-storage` in the
//! dependency graph.

pub mod memory_device;
pub mod metadata_catalog;
pub mod transaction_log;

pub use memory_device::MemoryKvDevice;
pub use metadata_catalog::MemoryMetadataCatalog;
pub use transaction_log::TransactionLog;
