//! Storage tier for kaifs.
//!
//! Two stores live here, both dumb on purpose:
//!
//! - [`BlobStore`] — content-addressed bytes for binary file bodies, keyed by
//!   SHA-256 and fanned out over two-level directories.
//! - [`DocStorage`] — opaque block persistence for CRDT documents. The engine
//!   saves incremental change blocks through it and reassembles a document by
//!   loading every block back. Any store that preserves bytes suffices;
//!   [`FsDocStorage`] writes files, [`MemoryDocStorage`] keeps a map.
//!
//! [`layout`] pins the on-disk data-dir shape that hosts rely on to reopen a
//! filesystem across restarts.

pub mod blob;
pub mod error;
pub mod layout;
pub mod storage;

pub use blob::BlobStore;
pub use error::{StoreError, StoreResult};
pub use storage::{DocStorage, FsDocStorage, MemoryDocStorage};
