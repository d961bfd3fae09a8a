//! Error types returned by the adapter to its host.
//!
//! The variants here are exactly the error kinds `spec.md` §7 calls out,
//! with one exception: the `panic` kind is not modeled as a variant. Its
//! own description ("post-condition violations... unrecoverable, host must
//! treat the process as corrupt") is a real Rust panic, not a `Result`,
//! and callers that hit it (see `kvs_storage::registry`) call `panic!`
//! directly rather than returning an `Error`.

use std::io;
use thiserror::Error;

/// Result type alias used throughout the adapter.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced to the host, per `spec.md` §7.
#[derive(Debug, Error)]
pub enum Error {
    /// No such key visible to the caller.
    #[error("not found")]
    NotFound,

    /// Insert collided with an existing visible entry and `overwrite` was false.
    #[error("duplicate key")]
    DuplicateKey,

    /// Snapshot-isolation update conflict; the host is expected to abort and retry.
    #[error("conflict between concurrent transactions")]
    Deadlock,

    /// Drop/rename/truncate target still has open cursors.
    #[error("object is busy")]
    Busy,

    /// Bad URI, key too long, or unknown configuration key.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is recognized but intentionally unimplemented (e.g. `verify`).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Any underlying device failure that is not one of the above.
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Construct an [`Error::InvalidArgument`] from anything `Display`-able.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True for the one error kind the host is expected to retry by re-issuing
    /// the transaction from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Deadlock)
    }

    /// Propagation policy from `spec.md` §7: the first error wins, except that
    /// `DuplicateKey` and `NotFound` yield to any "harder" error.
    ///
    /// `panic` is not represented here — it dominates by actually unwinding,
    /// so there is nothing for this function to compare it against.
    pub fn combine(self, other: Error) -> Error {
        match (&self, &other) {
            (Error::NotFound | Error::DuplicateKey, _) => other,
            _ => self,
        }
    }
}
