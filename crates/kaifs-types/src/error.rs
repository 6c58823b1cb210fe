//! Filesystem engine errors.
//!
//! These are semantic kinds, not a type hierarchy: every operation on the
//! engine reports failure through [`FsError`], and callers match on the kind.

use thiserror::Error;

/// Result type for engine operations.
pub type FsResult<T> = Result<T, FsError>;

/// Filesystem engine errors.
#[derive(Debug, Clone, Error)]
pub enum FsError {
    /// Path, or a required parent, does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A path step that must be a directory is a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// Target is a directory where a file is required.
    #[error("is a directory: {0}")]
    IsADirectory(String),
    /// Cannot create a directory where a file already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Out-of-scope behavior (symlinks, directory moves).
    #[error("not supported: {0}")]
    NotSupported(String),
    /// Underlying storage or blob I/O failure.
    #[error("storage fault: {0}")]
    Storage(String),
    /// A referenced document handle cannot be loaded — indicates corruption.
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    /// Operation invoked after `close()`.
    #[error("engine is closed")]
    Closed,
}

impl FsError {
    /// Shorthand for a `NotFound` at a path.
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound(path.into())
    }

    /// Shorthand for a `Storage` fault with context.
    pub fn storage(msg: impl Into<String>) -> Self {
        FsError::Storage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_path() {
        let err = FsError::not_found("/missing.txt");
        assert_eq!(err.to_string(), "not found: /missing.txt");

        let err = FsError::IsADirectory("/dir".into());
        assert_eq!(err.to_string(), "is a directory: /dir");
    }
}
