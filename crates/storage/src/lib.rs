//! Per-object storage mechanics: the update-chain codec, cache visibility
//! predicates, the Object type and its registry, and the Cursor Engine that
//! ties them together (`spec.md` §3-§4.4).
//!
//! Depends only on `kvs-core`. Sits beside, not above, `kvs-durability` in
//! the workspace graph; test fixtures borrow `kvs-durability`'s in-memory
//! `KvDevice`/`MetadataCatalog` as a dev-dependency only.

pub mod chain;
pub mod cursor;
pub mod object;
pub mod registry;
pub mod visibility;

pub use chain::{ChainCodecError, ChainEntry};
pub use cursor::{Cursor, CursorState};
pub use object::Object;
pub use registry::{ObjectRegistry, OpenFlags};
