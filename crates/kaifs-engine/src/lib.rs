//! kaifs-engine: the versioned virtual filesystem.
//!
//! An in-memory file hierarchy whose every mutation is recorded by CRDT
//! documents, so any prior state of any file can be reconstructed, diffed,
//! and restored. Three storage tiers:
//!
//! ```text
//! VersionedFs
//!     ↓ tree ops                ↓ text bodies            ↓ binary bodies
//! root document (Automerge) → per-file documents  →  BlobStore (sha-256)
//!     ↓                          ↓
//! DocumentRepo ───────────── DocStorage (opaque blocks)
//! ```
//!
//! - The **root document** holds a flat `path → entry` map ([`tree`]); it is
//!   the sole source of truth for the hierarchy, and its id is the
//!   filesystem's durable handle.
//! - Each **text file** gets its own document whose `content` text object is
//!   updated by character-level splices ([`body`]), so the file's full edit
//!   history is queryable and concurrent edits merge per character.
//! - **Binary bodies** are routed to the content-addressed [`BlobStore`],
//!   written before the tree entry that references them.
//!
//! [`FsFacade`] projects the engine as the [`Filesystem`] interface an
//! external shell interpreter consumes.
//!
//! [`BlobStore`]: kaifs_store::BlobStore

pub mod body;
pub mod engine;
pub mod facade;
pub mod paths;
pub mod repo;
pub mod tree;

pub use engine::VersionedFs;
pub use facade::{Filesystem, FsFacade};
pub use repo::DocumentRepo;
pub use tree::{FileBody, TreeEntry};

pub use kaifs_types::{
    DirEntry, DocId, EntryKind, FileStat, FsError, FsResult, HistoryEntry, Snapshot,
};

/// A point in a document's history. A set of these identifies a version.
pub type ChangeId = automerge::ChangeHash;

/// Structural change between two version points of a document.
pub use automerge::Patch;

/// Map a CRDT substrate error onto the engine's error type.
pub(crate) fn am(err: automerge::AutomergeError) -> FsError {
    FsError::Storage(err.to_string())
}
