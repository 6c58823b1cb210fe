//! Opaque block storage for CRDT documents.
//!
//! A document is persisted as an unordered set of byte blocks: the engine
//! appends a block per committed change (or a compacted full save) and
//! reassembles the document by loading every block back. Block ids are
//! content hashes, so re-saving the same block is harmless. The store does
//! not interpret block contents.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use kaifs_types::DocId;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StoreResult;

/// Persistence contract for CRDT document blocks.
///
/// `save` is durable after return; `load` returns every block saved for the
/// document, or `None` if the document id is unknown to the backend.
#[async_trait]
pub trait DocStorage: Send + Sync + std::fmt::Debug {
    async fn save(&self, doc: &DocId, block: &str, data: &[u8]) -> StoreResult<()>;
    async fn load(&self, doc: &DocId) -> StoreResult<Option<Vec<Vec<u8>>>>;
}

/// Block id for a chunk of bytes — a truncated content hash, so identical
/// blocks collide harmlessly.
pub fn block_id(data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    digest[..16].to_string()
}

/// Filesystem-backed block storage.
///
/// Layout: `<root>/<doc-id>/<block-id>.bin`. The root is typically the
/// `automerge/` directory of a data dir (see [`crate::layout`]).
#[derive(Debug, Clone)]
pub struct FsDocStorage {
    root: PathBuf,
}

impl FsDocStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn doc_dir(&self, doc: &DocId) -> PathBuf {
        self.root.join(doc.as_str())
    }
}

#[async_trait]
impl DocStorage for FsDocStorage {
    async fn save(&self, doc: &DocId, block: &str, data: &[u8]) -> StoreResult<()> {
        let dir = self.doc_dir(doc);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{block}.bin"));
        let tmp = dir.join(format!(".{block}.tmp"));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(doc = %doc, %block, size = data.len(), "doc block saved");
        Ok(())
    }

    async fn load(&self, doc: &DocId) -> StoreResult<Option<Vec<Vec<u8>>>> {
        let dir = self.doc_dir(doc);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        // Sorted for deterministic reassembly; the CRDT substrate accepts
        // blocks in any order regardless.
        let mut named: BTreeMap<String, PathBuf> = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".bin") {
                named.insert(name, entry.path());
            }
        }

        let mut blocks = Vec::with_capacity(named.len());
        for path in named.values() {
            blocks.push(tokio::fs::read(path).await?);
        }
        Ok(Some(blocks))
    }
}

/// In-memory block storage for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryDocStorage {
    blocks: Mutex<HashMap<DocId, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryDocStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocStorage for MemoryDocStorage {
    async fn save(&self, doc: &DocId, block: &str, data: &[u8]) -> StoreResult<()> {
        let mut blocks = self.blocks.lock().expect("storage lock poisoned");
        blocks
            .entry(doc.clone())
            .or_default()
            .insert(block.to_string(), data.to_vec());
        Ok(())
    }

    async fn load(&self, doc: &DocId) -> StoreResult<Option<Vec<Vec<u8>>>> {
        let blocks = self.blocks.lock().expect("storage lock poisoned");
        Ok(blocks
            .get(doc)
            .map(|named| named.values().cloned().collect()))
    }
}
