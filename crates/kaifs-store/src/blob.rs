//! Content-addressed blob store.
//!
//! Binary file bodies land here, keyed by the lowercase hex SHA-256 of their
//! bytes. Layout is `<root>/<aa>/<rest>` where `aa` is the first two hex
//! chars; identical bytes naturally dedup to one file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StoreResult;

/// Content-addressed byte store.
///
/// All operations are idempotent: `set` may overwrite, `delete` of an absent
/// blob is a no-op, `get` reports absence rather than erroring.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// SHA-256 of `bytes`, lowercase hex — the store's key function.
    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// On-disk location for a hash.
    ///
    /// Hashes shorter than two chars (never produced by SHA-256, but the
    /// store accepts them) live whole under the `"00"` bucket.
    fn blob_path(&self, hash: &str) -> PathBuf {
        if hash.len() < 2 {
            self.root.join("00").join(hash)
        } else {
            self.root.join(&hash[..2]).join(&hash[2..])
        }
    }

    /// Fetch stored bytes, or `None` if the hash is absent.
    pub async fn get(&self, hash: &str) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.blob_path(hash)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Store bytes under `hash`. Overwrite is permitted.
    ///
    /// The write goes through a temp file renamed into place, so a crashed
    /// write never leaves a truncated blob at its final path.
    pub async fn set(&self, hash: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.blob_path(hash);
        let bucket = path.parent().expect("blob path has a bucket parent");
        tokio::fs::create_dir_all(bucket).await?;

        let file = if hash.len() < 2 { hash } else { &hash[2..] };
        let tmp = bucket.join(format!(".{file}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(%hash, size = bytes.len(), "blob stored");
        Ok(())
    }

    /// Check whether a hash is present.
    pub async fn has(&self, hash: &str) -> bool {
        tokio::fs::try_exists(self.blob_path(hash))
            .await
            .unwrap_or(false)
    }

    /// Delete a blob. Deleting an absent hash is a no-op.
    pub async fn delete(&self, hash: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => {
                debug!(%hash, "blob deleted");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Enumerate every stored hash. Empty when the store is fresh.
    pub async fn list(&self) -> StoreResult<Vec<String>> {
        let mut hashes = Vec::new();
        let mut buckets = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(hashes),
            Err(err) => return Err(err.into()),
        };
        while let Some(bucket) = buckets.next_entry().await? {
            if !bucket.file_type().await?.is_dir() {
                continue;
            }
            let prefix = bucket.file_name().to_string_lossy().into_owned();
            let mut files = tokio::fs::read_dir(bucket.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = file.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                // Sub-2-char hashes are stored whole under "00".
                if prefix == "00" && name.len() < 2 {
                    hashes.push(name);
                } else {
                    hashes.push(format!("{prefix}{name}"));
                }
            }
        }
        Ok(hashes)
    }
}
