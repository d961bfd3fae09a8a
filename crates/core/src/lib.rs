//! Foundation crate for the transactional KV adapter: errors, the URI
//! grammar, key/value format metadata, configuration parsing, size limits,
//! and the trait boundaries to the host's external collaborators
//! (`KvDevice`, `TransactionContext`, `TransactionNotify`, `MetadataCatalog`).
//!
//! This crate has no dependency on `kvs-storage`, `kvs-durability`, or
//! `kvs-concurrency` — everything here is shared vocabulary the other three
//! crates build on.

pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod kvdevice;
pub mod limits;
pub mod metadata;
pub mod uri;

pub use context::{TransactionContext, TransactionNotify, TxnId, TxnResolution};
pub use error::{Error, Result};
pub use format::{KeyFormat, ObjectMetadata, ValueFormat};
pub use kvdevice::KvDevice;
pub use metadata::MetadataCatalog;
pub use uri::Uri;
