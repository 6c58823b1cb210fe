//! The versioned filesystem engine.
//!
//! `VersionedFs` is single-writer: all operations take `&mut self` and run
//! on one logical task stream. Mutations follow a fixed discipline — bodies
//! first, tree second — so a reader never observes a tree entry pointing at
//! a blob that has not been written. Structural operations commit exactly
//! one change on the root document and tag it with the operation, giving the
//! root history human-readable provenance.

use kaifs_store::BlobStore;
use kaifs_types::{DirEntry, DocId, FileStat, FsError, FsResult, HistoryEntry, Snapshot};
use tracing::debug;

use crate::body::{self, Classified, WritePayload};
use crate::paths;
use crate::repo::{store_err, unix_now, DocumentRepo};
use crate::tree::{self, FileBody, TreeEntry};
use crate::{ChangeId, Patch};

/// The public engine over one root document.
#[derive(Debug)]
pub struct VersionedFs {
    repo: DocumentRepo,
    blobs: BlobStore,
    root: DocId,
    open: bool,
}

impl VersionedFs {
    /// Create a fresh filesystem: allocates a root document and seeds the
    /// tree with `/` (mode `0o755`, timestamps now).
    pub async fn open_new(mut repo: DocumentRepo, blobs: BlobStore) -> FsResult<Self> {
        let root = repo.create();
        let now = unix_now();
        repo.change(&root, Some("init"), |tx| {
            tree::init(tx)?;
            tree::put(tx, &TreeEntry::directory("/", 0o755, now))
        })
        .await?;
        debug!(root = %root, "filesystem created");
        Ok(Self {
            repo,
            blobs,
            root,
            open: true,
        })
    }

    /// Reopen a filesystem by its root handle. No tree mutation.
    pub async fn open_existing(
        mut repo: DocumentRepo,
        blobs: BlobStore,
        root: DocId,
    ) -> FsResult<Self> {
        repo.find(&root).await?;
        repo.with_doc(&root, |doc| match tree::get(doc, "/")? {
            Some(entry) if entry.is_dir() => Ok(()),
            _ => Err(FsError::Storage(format!(
                "document {root} is not a filesystem root"
            ))),
        })
        .await?;
        debug!(root = %root, "filesystem opened");
        Ok(Self {
            repo,
            blobs,
            root,
            open: true,
        })
    }

    /// The durable identifier callers persist to reopen this filesystem.
    pub fn root_handle(&self) -> &DocId {
        &self.root
    }

    /// Stop accepting operations. Terminal.
    pub fn close(&mut self) {
        self.open = false;
    }

    fn ensure_open(&self) -> FsResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(FsError::Closed)
        }
    }

    async fn entry(&mut self, path: &str) -> FsResult<Option<TreeEntry>> {
        self.repo
            .with_doc(&self.root, |doc| tree::get(doc, path))
            .await
    }

    async fn required(&mut self, path: &str) -> FsResult<TreeEntry> {
        self.entry(path)
            .await?
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn children_of(&mut self, path: &str) -> FsResult<Vec<TreeEntry>> {
        self.repo
            .with_doc(&self.root, |doc| tree::children(doc, path))
            .await
    }

    // ─── Filesystem operations ──────────────────────────────────────────

    /// Read a file's bytes: raw blob bytes for binary bodies, the UTF-8
    /// encoding of the current text for text bodies.
    pub async fn read(&mut self, path: &str) -> FsResult<Vec<u8>> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        let entry = self.required(&path).await?;
        if entry.is_dir() {
            return Err(FsError::IsADirectory(path));
        }
        match entry.body {
            Some(FileBody::Text(id)) => {
                let text = self.repo.with_doc(&id, body::text_of).await?;
                Ok(text.into_bytes())
            }
            Some(FileBody::Blob(hash)) => self
                .blobs
                .get(&hash)
                .await
                .map_err(store_err)?
                .ok_or_else(|| FsError::Storage(format!("blob {hash} missing for {path}"))),
            None => Err(FsError::Storage(format!("file entry {path} has no body"))),
        }
    }

    /// Read a file as UTF-8 text.
    pub async fn read_text(&mut self, path: &str) -> FsResult<String> {
        let path = paths::normalize(path);
        let bytes = self.read(&path).await?;
        String::from_utf8(bytes)
            .map_err(|_| FsError::NotSupported(format!("not valid utf-8: {path}")))
    }

    /// Write a file body. Strings and UTF-8 bytes land in the file's text
    /// document via a character-level merge; other bytes land in the blob
    /// store. The parent must already exist as a directory.
    pub async fn write(&mut self, path: &str, payload: impl Into<WritePayload>) -> FsResult<()> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        if path == "/" {
            return Err(FsError::IsADirectory(path));
        }
        let parent = paths::parent(&path);
        match self.entry(&parent).await? {
            None => return Err(FsError::NotFound(parent)),
            Some(entry) if entry.is_file() => return Err(FsError::NotADirectory(parent)),
            Some(_) => {}
        }
        let existing = self.entry(&path).await?;
        if let Some(entry) = &existing {
            if entry.is_dir() {
                return Err(FsError::IsADirectory(path));
            }
        }
        let now = unix_now();
        let mode = existing.as_ref().map(|e| e.mode).unwrap_or(0o644);
        let ctime = existing.as_ref().map(|e| e.ctime).unwrap_or(now);
        let old_body = existing.and_then(|e| e.body);

        match payload.into().classify() {
            Classified::Binary(bytes) => {
                // Blob lands before the tree entry that references it.
                let hash = BlobStore::digest(&bytes);
                self.blobs.set(&hash, &bytes).await.map_err(store_err)?;
                let size = bytes.len() as u64;
                let entry =
                    TreeEntry::file(&path, FileBody::Blob(hash.clone()), size, mode, now, ctime);
                self.repo
                    .change(&self.root, Some(&format!("write {path}")), |tx| {
                        tree::put(tx, &entry)
                    })
                    .await?;
                match old_body {
                    // The text document survives for history; only the
                    // cached handle goes.
                    Some(FileBody::Text(id)) => self.repo.evict(&id),
                    Some(FileBody::Blob(old)) if old != hash => {
                        self.blobs.delete(&old).await.map_err(store_err)?;
                    }
                    _ => {}
                }
                debug!(%path, size, "binary body written");
            }
            Classified::Text(text) => {
                let size = text.len() as u64;
                let doc_id = match &old_body {
                    Some(FileBody::Text(id)) => {
                        let id = id.clone();
                        self.repo
                            .change(&id, None, |tx| body::update_content(tx, &text))
                            .await?;
                        id
                    }
                    // First text write here (or a binary body is being
                    // replaced): fresh document, fresh history.
                    _ => {
                        let id = self.repo.create();
                        self.repo
                            .change(&id, None, |tx| body::update_content(tx, &text))
                            .await?;
                        id
                    }
                };
                let entry =
                    TreeEntry::file(&path, FileBody::Text(doc_id), size, mode, now, ctime);
                self.repo
                    .change(&self.root, Some(&format!("write {path}")), |tx| {
                        tree::put(tx, &entry)
                    })
                    .await?;
                if let Some(FileBody::Blob(old)) = old_body {
                    self.blobs.delete(&old).await.map_err(store_err)?;
                }
                debug!(%path, size, "text body written");
            }
        }
        Ok(())
    }

    /// Append text to a file, creating it if absent. Only the suffix is a
    /// real insertion in the file's history.
    pub async fn append(&mut self, path: &str, text: &str) -> FsResult<()> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        match self.entry(&path).await? {
            None => self.write(&path, text).await,
            Some(entry) if entry.is_dir() => Err(FsError::IsADirectory(path)),
            Some(entry) => match entry.body {
                Some(FileBody::Text(_)) => {
                    let current = self.read_text(&path).await?;
                    self.write(&path, format!("{current}{text}")).await
                }
                _ => Err(FsError::NotSupported(format!(
                    "append to binary file: {path}"
                ))),
            },
        }
    }

    /// Metadata for a path.
    pub async fn stat(&mut self, path: &str) -> FsResult<FileStat> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        let entry = self.required(&path).await?;
        Ok(FileStat {
            kind: entry.kind,
            size: entry.size,
            mode: entry.mode,
            mtime: entry.mtime,
            ctime: entry.ctime,
        })
    }

    /// Whether a path exists. Never fails.
    pub async fn exists(&mut self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// List a directory. Order is unspecified.
    pub async fn readdir(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        let entry = self.required(&path).await?;
        if entry.is_file() {
            return Err(FsError::NotADirectory(path));
        }
        let children = self.children_of(&path).await?;
        Ok(children
            .into_iter()
            .map(|child| DirEntry {
                name: child.name,
                kind: child.kind,
                size: child.size,
                mode: child.mode,
                mtime: child.mtime,
            })
            .collect())
    }

    /// Create a directory. Idempotent when the target is already a
    /// directory; `recursive` creates missing parents in one atomic change.
    pub async fn mkdir(&mut self, path: &str, recursive: bool) -> FsResult<()> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        if path == "/" {
            return Ok(());
        }
        match self.entry(&path).await? {
            Some(entry) if entry.is_dir() => return Ok(()),
            Some(_) => return Err(FsError::AlreadyExists(path)),
            None => {}
        }

        let mut chain = Vec::new();
        let mut cursor = path.clone();
        while cursor != "/" {
            chain.push(cursor.clone());
            cursor = paths::parent(&cursor);
        }
        chain.reverse();

        let now = unix_now();
        let target = path.clone();
        self.repo
            .change(&self.root, Some(&format!("mkdir {path}")), |tx| {
                for step in &chain {
                    match tree::get(&*tx, step)? {
                        Some(entry) if entry.is_dir() => {}
                        Some(_) => return Err(FsError::NotADirectory(step.clone())),
                        None => {
                            if *step != target && !recursive {
                                return Err(FsError::NotFound(step.clone()));
                            }
                            tree::put(tx, &TreeEntry::directory(step, 0o755, now))?;
                        }
                    }
                }
                Ok(())
            })
            .await
    }

    /// Remove a file, or a whole subtree with `recursive`. The tree change
    /// is atomic; body cleanup (blob deletion, handle eviction) follows it.
    pub async fn rm(&mut self, path: &str, recursive: bool) -> FsResult<()> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        if path == "/" {
            return Err(FsError::NotSupported("cannot remove root".into()));
        }
        let entry = self.required(&path).await?;
        let doomed: Vec<TreeEntry> = if entry.is_file() {
            vec![entry]
        } else if !recursive {
            return Err(FsError::IsADirectory(path));
        } else {
            self.repo
                .with_doc(&self.root, |doc| {
                    let mut subtree = Vec::new();
                    for p in tree::all_paths(doc)? {
                        if p == path || paths::is_under(&p, &path) {
                            if let Some(entry) = tree::get(doc, &p)? {
                                subtree.push(entry);
                            }
                        }
                    }
                    Ok(subtree)
                })
                .await?
        };

        self.repo
            .change(&self.root, Some(&format!("rm {path}")), |tx| {
                for entry in &doomed {
                    tree::remove(tx, &entry.path)?;
                }
                Ok(())
            })
            .await?;

        for entry in &doomed {
            match &entry.body {
                Some(FileBody::Text(id)) => self.repo.evict(id),
                Some(FileBody::Blob(hash)) => {
                    self.blobs.delete(hash).await.map_err(store_err)?;
                }
                None => {}
            }
        }
        debug!(%path, removed = doomed.len(), "removed");
        Ok(())
    }

    /// Move a file. The body pointer travels with it, so a text file's
    /// history survives the rename. Directories do not move.
    pub async fn mv(&mut self, src: &str, dst: &str) -> FsResult<()> {
        self.ensure_open()?;
        let src = paths::normalize(src);
        let dst = paths::normalize(dst);
        if src == "/" {
            return Err(FsError::NotSupported("cannot move root".into()));
        }
        if src == dst {
            return Ok(());
        }
        let entry = self.required(&src).await?;
        if entry.is_dir() {
            return Err(FsError::NotSupported(format!("directory move: {src}")));
        }
        let parent = paths::parent(&dst);
        match self.entry(&parent).await? {
            None => return Err(FsError::NotFound(parent)),
            Some(p) if p.is_file() => return Err(FsError::NotADirectory(parent)),
            Some(_) => {}
        }
        let displaced = match self.entry(&dst).await? {
            Some(d) if d.is_dir() => return Err(FsError::IsADirectory(dst)),
            Some(d) => d.body,
            None => None,
        };

        let body = entry.body.clone().expect("file entry has a body");
        let moved = TreeEntry::file(&dst, body, entry.size, entry.mode, unix_now(), entry.ctime);
        self.repo
            .change(&self.root, Some(&format!("mv {src} {dst}")), |tx| {
                tree::remove(tx, &src)?;
                tree::put(tx, &moved)
            })
            .await?;

        match displaced {
            Some(FileBody::Text(id)) => self.repo.evict(&id),
            Some(FileBody::Blob(hash)) => {
                // Identical bytes dedup to one blob; keep it in that case.
                if entry.body != Some(FileBody::Blob(hash.clone())) {
                    self.blobs.delete(&hash).await.map_err(store_err)?;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Copy a file (fresh body, fresh history) or, with `recursive`, a
    /// directory subtree.
    pub async fn cp(&mut self, src: &str, dst: &str, recursive: bool) -> FsResult<()> {
        self.ensure_open()?;
        let src = paths::normalize(src);
        let dst = paths::normalize(dst);
        let entry = self.required(&src).await?;
        if entry.is_dir() && !recursive {
            return Err(FsError::IsADirectory(src));
        }

        let mut work = vec![(src, dst)];
        while let Some((from, to)) = work.pop() {
            let entry = self.required(&from).await?;
            if entry.is_file() {
                let bytes = self.read(&from).await?;
                self.write(&to, bytes).await?;
            } else {
                self.mkdir(&to, false).await?;
                for child in self.children_of(&from).await? {
                    work.push((
                        paths::join(&from, &child.name),
                        paths::join(&to, &child.name),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Update permissions. Metadata only; nothing is enforced.
    pub async fn chmod(&mut self, path: &str, mode: u32) -> FsResult<()> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        let mut entry = self.required(&path).await?;
        entry.mode = mode;
        self.repo
            .change(&self.root, Some(&format!("chmod {path}")), |tx| {
                tree::put(tx, &entry)
            })
            .await
    }

    /// Update timestamps. Only `mtime` is persisted.
    pub async fn utimes(&mut self, path: &str, _atime: i64, mtime: i64) -> FsResult<()> {
        self.ensure_open()?;
        let path = paths::normalize(path);
        let mut entry = self.required(&path).await?;
        entry.mtime = mtime;
        self.repo
            .change(&self.root, Some(&format!("utimes {path}")), |tx| {
                tree::put(tx, &entry)
            })
            .await
    }

    // ─── History operations ─────────────────────────────────────────────

    /// Frontier of the root document.
    pub async fn root_heads(&mut self) -> FsResult<Vec<ChangeId>> {
        self.ensure_open()?;
        self.repo.heads(&self.root).await
    }

    async fn text_doc(&mut self, path: &str) -> FsResult<Option<DocId>> {
        let path = paths::normalize(path);
        Ok(match self.entry(&path).await? {
            Some(TreeEntry {
                body: Some(FileBody::Text(id)),
                ..
            }) => Some(id),
            _ => None,
        })
    }

    /// Frontier of a file's text document; empty if the path is absent or
    /// carries a binary body.
    pub async fn file_heads(&mut self, path: &str) -> FsResult<Vec<ChangeId>> {
        self.ensure_open()?;
        match self.text_doc(path).await? {
            Some(id) => self.repo.heads(&id).await,
            None => Ok(Vec::new()),
        }
    }

    /// A file's full edit history in causal order; empty for binary or
    /// absent paths.
    pub async fn file_history(&mut self, path: &str) -> FsResult<Vec<HistoryEntry>> {
        self.ensure_open()?;
        match self.text_doc(path).await? {
            Some(id) => self.repo.history(&id).await,
            None => Ok(Vec::new()),
        }
    }

    /// The file's text at a specific set of heads. Empty string for binary
    /// or absent paths and for heads this file does not know.
    pub async fn view_at(&mut self, path: &str, heads: &[ChangeId]) -> FsResult<String> {
        self.ensure_open()?;
        match self.text_doc(path).await? {
            Some(id) => {
                self.repo
                    .with_doc(&id, |doc| {
                        if !DocumentRepo::heads_known(doc, heads) {
                            return Ok(String::new());
                        }
                        body::text_at(doc, heads)
                    })
                    .await
            }
            None => Ok(String::new()),
        }
    }

    /// Structural patches between two version points of a file's text.
    pub async fn diff(
        &mut self,
        path: &str,
        from: &[ChangeId],
        to: &[ChangeId],
    ) -> FsResult<Vec<Patch>> {
        self.ensure_open()?;
        match self.text_doc(path).await? {
            Some(id) => self.repo.diff(&id, from, to).await,
            None => Ok(Vec::new()),
        }
    }

    /// Current root heads plus an annotation the caller stores externally.
    pub async fn snapshot(&mut self, label: Option<&str>) -> FsResult<Snapshot> {
        self.ensure_open()?;
        let heads = self.repo.heads(&self.root).await?;
        Ok(Snapshot {
            heads: heads.iter().map(|h| h.to_string()).collect(),
            label: label.map(str::to_string),
            timestamp: unix_now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaifs_store::MemoryDocStorage;
    use std::sync::Arc;

    async fn engine() -> (tempfile::TempDir, VersionedFs) {
        let dir = tempfile::tempdir().unwrap();
        let repo = DocumentRepo::new(Arc::new(MemoryDocStorage::new()));
        let blobs = BlobStore::new(dir.path().join("blobs"));
        let fs = VersionedFs::open_new(repo, blobs).await.unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn closed_engine_rejects_operations() {
        let (_dir, mut fs) = engine().await;
        fs.close();
        assert!(matches!(fs.read("/x").await, Err(FsError::Closed)));
        assert!(matches!(fs.write("/x", "y").await, Err(FsError::Closed)));
        assert!(matches!(fs.mkdir("/d", false).await, Err(FsError::Closed)));
        // exists never fails; on a closed engine it reports false.
        assert!(!fs.exists("/").await);
    }

    #[tokio::test]
    async fn write_into_missing_parent_fails() {
        let (_dir, mut fs) = engine().await;
        let err = fs.write("/no/such/file.txt", "x").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn write_with_file_parent_fails() {
        let (_dir, mut fs) = engine().await;
        fs.write("/f", "a file").await.unwrap();
        let err = fs.write("/f/child", "x").await.unwrap_err();
        assert!(matches!(err, FsError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn read_of_directory_fails() {
        let (_dir, mut fs) = engine().await;
        fs.mkdir("/d", false).await.unwrap();
        assert!(matches!(fs.read("/d").await, Err(FsError::IsADirectory(_))));
    }

    #[tokio::test]
    async fn mkdir_over_file_fails() {
        let (_dir, mut fs) = engine().await;
        fs.write("/f", "x").await.unwrap();
        let err = fs.mkdir("/f", false).await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn mkdir_without_recursive_needs_parent() {
        let (_dir, mut fs) = engine().await;
        let err = fs.mkdir("/a/b", false).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
        // Nothing was created by the failed change.
        assert!(!fs.exists("/a").await);
    }

    #[tokio::test]
    async fn rm_directory_without_recursive_fails() {
        let (_dir, mut fs) = engine().await;
        fs.mkdir("/d", false).await.unwrap();
        let err = fs.rm("/d", false).await.unwrap_err();
        assert!(matches!(err, FsError::IsADirectory(_)));
    }

    #[tokio::test]
    async fn mv_of_directory_is_refused() {
        let (_dir, mut fs) = engine().await;
        fs.mkdir("/d", false).await.unwrap();
        let err = fs.mv("/d", "/e").await.unwrap_err();
        assert!(matches!(err, FsError::NotSupported(_)));
    }

    #[tokio::test]
    async fn mv_onto_directory_is_refused() {
        let (_dir, mut fs) = engine().await;
        fs.write("/f", "x").await.unwrap();
        fs.mkdir("/d", false).await.unwrap();
        let err = fs.mv("/f", "/d").await.unwrap_err();
        assert!(matches!(err, FsError::IsADirectory(_)));
    }

    #[tokio::test]
    async fn append_to_binary_is_refused() {
        let (_dir, mut fs) = engine().await;
        fs.write("/b", vec![0x00u8, 0xff]).await.unwrap();
        let err = fs.append("/b", "tail").await.unwrap_err();
        assert!(matches!(err, FsError::NotSupported(_)));
    }

    #[tokio::test]
    async fn append_creates_missing_file() {
        let (_dir, mut fs) = engine().await;
        fs.append("/log.txt", "line one\n").await.unwrap();
        fs.append("/log.txt", "line two\n").await.unwrap();
        assert_eq!(
            fs.read_text("/log.txt").await.unwrap(),
            "line one\nline two\n"
        );
    }

    #[tokio::test]
    async fn chmod_and_utimes_update_metadata_only() {
        let (_dir, mut fs) = engine().await;
        fs.write("/f", "body").await.unwrap();
        fs.chmod("/f", 0o600).await.unwrap();
        fs.utimes("/f", 1, 42).await.unwrap();

        let stat = fs.stat("/f").await.unwrap();
        assert_eq!(stat.mode, 0o600);
        assert_eq!(stat.mtime, 42);
        assert_eq!(fs.read_text("/f").await.unwrap(), "body");
    }

    #[tokio::test]
    async fn snapshot_returns_current_heads() {
        let (_dir, mut fs) = engine().await;
        fs.write("/f", "x").await.unwrap();
        let snap = fs.snapshot(Some("checkpoint")).await.unwrap();
        assert!(!snap.heads.is_empty());
        assert_eq!(snap.label.as_deref(), Some("checkpoint"));

        let heads = fs.root_heads().await.unwrap();
        let hex: Vec<String> = heads.iter().map(|h| h.to_string()).collect();
        assert_eq!(snap.heads, hex);
    }
}
