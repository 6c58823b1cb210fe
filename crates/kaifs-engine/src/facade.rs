//! Filesystem facade for the shell interpreter.
//!
//! The in-process shell consumes a plain filesystem interface and knows
//! nothing about documents or blobs. [`FsFacade`] is that translation layer:
//! it owns no state beyond a handle to the engine and serializes access
//! through one lock, preserving the engine's single-writer model. There are
//! no symlinks in this namespace, so `lstat` is `stat` and the link calls
//! fail `NotSupported`.

use std::sync::Arc;

use async_trait::async_trait;
use kaifs_types::{DirEntry, FileStat, FsError, FsResult};
use tokio::sync::Mutex;

use crate::engine::VersionedFs;
use crate::paths;

/// Abstract filesystem interface, shaped to what a shell interpreter
/// expects. All paths are absolute within the engine's namespace.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Read a file as UTF-8 text.
    async fn read_text(&self, path: &str) -> FsResult<String>;

    /// Read a file's raw bytes.
    async fn read_bytes(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Write a file body; text-versus-binary routing happens downstream.
    async fn write(&self, path: &str, data: &[u8]) -> FsResult<()>;

    /// Append text to a file, creating it if absent.
    async fn append(&self, path: &str, text: &str) -> FsResult<()>;

    /// Check if a path exists. Never fails.
    async fn exists(&self, path: &str) -> bool;

    /// Get metadata for a path.
    async fn stat(&self, path: &str) -> FsResult<FileStat>;

    /// Same as `stat`: there are no symlinks to not-follow.
    async fn lstat(&self, path: &str) -> FsResult<FileStat> {
        self.stat(path).await
    }

    /// Create a directory, with parents when `recursive`.
    async fn mkdir(&self, path: &str, recursive: bool) -> FsResult<()>;

    /// List a directory.
    async fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>>;

    /// Remove a file, or a subtree with `recursive`.
    async fn rm(&self, path: &str, recursive: bool) -> FsResult<()>;

    /// Copy a file, or a subtree with `recursive`.
    async fn cp(&self, src: &str, dst: &str, recursive: bool) -> FsResult<()>;

    /// Move a file.
    async fn mv(&self, src: &str, dst: &str) -> FsResult<()>;

    /// Update permissions (stored, not enforced).
    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Update timestamps; only `mtime` is persisted.
    async fn utimes(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()>;

    /// Resolve `rel` against `base`. Pure path computation.
    fn resolve_path(&self, base: &str, rel: &str) -> String {
        paths::join(base, rel)
    }

    /// Canonicalize a path without probing existence.
    fn realpath(&self, path: &str) -> String {
        paths::normalize(path)
    }

    /// Symlinks are out of scope for this namespace.
    async fn read_link(&self, path: &str) -> FsResult<String> {
        Err(FsError::NotSupported(format!("readlink {path}")))
    }

    /// Symlinks are out of scope for this namespace.
    async fn symlink(&self, _target: &str, link: &str) -> FsResult<()> {
        Err(FsError::NotSupported(format!("symlink {link}")))
    }

    /// Hard links are out of scope for this namespace.
    async fn hard_link(&self, _target: &str, link: &str) -> FsResult<()> {
        Err(FsError::NotSupported(format!("link {link}")))
    }
}

/// [`Filesystem`] adapter over a shared [`VersionedFs`].
#[derive(Clone)]
pub struct FsFacade {
    engine: Arc<Mutex<VersionedFs>>,
}

impl FsFacade {
    pub fn new(engine: Arc<Mutex<VersionedFs>>) -> Self {
        Self { engine }
    }

    /// Wrap an engine, taking ownership.
    pub fn from_engine(engine: VersionedFs) -> Self {
        Self::new(Arc::new(Mutex::new(engine)))
    }

    /// The shared engine, for callers that also need history operations.
    pub fn engine(&self) -> Arc<Mutex<VersionedFs>> {
        self.engine.clone()
    }
}

#[async_trait]
impl Filesystem for FsFacade {
    async fn read_text(&self, path: &str) -> FsResult<String> {
        self.engine.lock().await.read_text(path).await
    }

    async fn read_bytes(&self, path: &str) -> FsResult<Vec<u8>> {
        self.engine.lock().await.read(path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.engine.lock().await.write(path, data).await
    }

    async fn append(&self, path: &str, text: &str) -> FsResult<()> {
        self.engine.lock().await.append(path, text).await
    }

    async fn exists(&self, path: &str) -> bool {
        self.engine.lock().await.exists(path).await
    }

    async fn stat(&self, path: &str) -> FsResult<FileStat> {
        self.engine.lock().await.stat(path).await
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> FsResult<()> {
        self.engine.lock().await.mkdir(path, recursive).await
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        self.engine.lock().await.readdir(path).await
    }

    async fn rm(&self, path: &str, recursive: bool) -> FsResult<()> {
        self.engine.lock().await.rm(path, recursive).await
    }

    async fn cp(&self, src: &str, dst: &str, recursive: bool) -> FsResult<()> {
        self.engine.lock().await.cp(src, dst, recursive).await
    }

    async fn mv(&self, src: &str, dst: &str) -> FsResult<()> {
        self.engine.lock().await.mv(src, dst).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.engine.lock().await.chmod(path, mode).await
    }

    async fn utimes(&self, path: &str, atime: i64, mtime: i64) -> FsResult<()> {
        self.engine.lock().await.utimes(path, atime, mtime).await
    }
}
