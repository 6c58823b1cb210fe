//! Pure data types for kaifs — errors, directory entries, history records.
//!
//! This crate is a leaf dependency with no CRDT substrate, no async runtime,
//! no I/O. It exists so that consumers (RPC glue, shell interpreters) can
//! work with kaifs's type system without pulling the engine's deps.

pub mod doc_id;
pub mod entry;
pub mod error;
pub mod history;

// Flat re-exports for convenience
pub use doc_id::*;
pub use entry::*;
pub use error::*;
pub use history::*;
