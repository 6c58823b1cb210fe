//! Document repository: ownership and persistence of CRDT documents.
//!
//! One [`automerge::Automerge`] per document, keyed by [`DocId`] and loaded
//! lazily from the block store. Every committed change is written back as an
//! incremental block, so reopening a document replays its blocks in any
//! order. Mutators run inside a transaction: a mutator that fails leaves the
//! document unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use automerge::patches::TextRepresentation;
use automerge::transaction::{CommitOptions, Transaction};
use automerge::{ActorId, Automerge, ChangeHash, Patch, ReadDoc};
use kaifs_store::storage::block_id;
use kaifs_store::{DocStorage, StoreError};
use kaifs_types::{DocId, FsError, FsResult, HistoryEntry};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::am;

pub(crate) fn store_err(err: StoreError) -> FsError {
    FsError::Storage(err.to_string())
}

/// Unix seconds, for entry metadata and commit timestamps.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Owns CRDT documents and their persistence.
#[derive(Debug)]
pub struct DocumentRepo {
    storage: Arc<dyn DocStorage>,
    docs: HashMap<DocId, Automerge>,
}

impl DocumentRepo {
    pub fn new(storage: Arc<dyn DocStorage>) -> Self {
        Self {
            storage,
            docs: HashMap::new(),
        }
    }

    /// Allocate a fresh document with empty state and a unique id.
    pub fn create(&mut self) -> DocId {
        let id = DocId::new(Uuid::new_v4().to_string());
        let doc = Automerge::new().with_actor(ActorId::random());
        self.docs.insert(id.clone(), doc);
        debug!(doc = %id, "document created");
        id
    }

    /// Ensure the document is loaded, fetching blocks from storage on a miss.
    ///
    /// Fails with `DocumentNotFound` if the id is unknown to the backend.
    pub async fn find(&mut self, id: &DocId) -> FsResult<()> {
        if self.docs.contains_key(id) {
            return Ok(());
        }
        let blocks = self
            .storage
            .load(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| FsError::DocumentNotFound(id.to_string()))?;
        if blocks.is_empty() {
            return Err(FsError::DocumentNotFound(id.to_string()));
        }
        let mut doc = Automerge::new().with_actor(ActorId::random());
        for block in &blocks {
            doc.load_incremental(block).map_err(am)?;
        }
        trace!(doc = %id, blocks = blocks.len(), "document loaded");
        self.docs.insert(id.clone(), doc);
        Ok(())
    }

    /// Whether the document is currently cached in memory.
    pub fn is_cached(&self, id: &DocId) -> bool {
        self.docs.contains_key(id)
    }

    /// Drop the cached handle. The document's persisted state is untouched;
    /// a later `find` reloads it.
    pub fn evict(&mut self, id: &DocId) {
        if self.docs.remove(id).is_some() {
            trace!(doc = %id, "document handle evicted");
        }
    }

    /// Apply a mutator atomically and persist the committed change.
    ///
    /// The commit carries this repo's actor, a monotonic sequence, the
    /// current wall-clock time, and `message` if given; all are visible in
    /// `history`. A mutator that errors rolls the document back.
    pub async fn change<T, F>(&mut self, id: &DocId, message: Option<&str>, f: F) -> FsResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> FsResult<T>,
    {
        self.find(id).await?;
        let now = unix_now();
        let message = message.map(str::to_string);
        let doc = self.docs.get_mut(id).expect("document cached by find");
        let heads_before = doc.get_heads();

        let result = doc
            .transact_with(
                |_| {
                    let mut opts = CommitOptions::default().with_time(now);
                    if let Some(msg) = message {
                        opts = opts.with_message(msg);
                    }
                    opts
                },
                f,
            )
            .map_err(|failure| failure.error)?
            .result;

        let bytes = doc.save_after(&heads_before);
        if !bytes.is_empty() {
            self.storage
                .save(id, &block_id(&bytes), &bytes)
                .await
                .map_err(store_err)?;
        }
        Ok(result)
    }

    /// Run a read-only closure against the document.
    pub async fn with_doc<T>(
        &mut self,
        id: &DocId,
        f: impl FnOnce(&Automerge) -> FsResult<T>,
    ) -> FsResult<T> {
        self.find(id).await?;
        f(self.docs.get(id).expect("document cached by find"))
    }

    /// Current frontier change ids.
    pub async fn heads(&mut self, id: &DocId) -> FsResult<Vec<ChangeHash>> {
        self.with_doc(id, |doc| Ok(doc.get_heads())).await
    }

    /// Full change history in causal order.
    pub async fn history(&mut self, id: &DocId) -> FsResult<Vec<HistoryEntry>> {
        self.with_doc(id, |doc| {
            Ok(doc
                .get_changes(&[])
                .iter()
                .map(|change| HistoryEntry {
                    hash: change.hash().to_string(),
                    actor: change.actor_id().to_hex_string(),
                    seq: change.seq(),
                    timestamp: change.timestamp(),
                    message: change.message().cloned(),
                })
                .collect())
        })
        .await
    }

    /// True when every head is a change this document knows.
    pub fn heads_known(doc: &Automerge, heads: &[ChangeHash]) -> bool {
        heads.iter().all(|h| doc.get_change_by_hash(h).is_some())
    }

    /// Structural patches between two version points. Unknown heads yield an
    /// empty list rather than an error, so history browsers can probe freely.
    pub async fn diff(
        &mut self,
        id: &DocId,
        from: &[ChangeHash],
        to: &[ChangeHash],
    ) -> FsResult<Vec<Patch>> {
        self.find(id).await?;
        let doc = self.docs.get_mut(id).expect("document cached by find");
        if !Self::heads_known(doc, from) || !Self::heads_known(doc, to) {
            return Ok(Vec::new());
        }
        Ok(doc.diff(from, to, TextRepresentation::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automerge::transaction::Transactable;
    use automerge::ROOT;
    use kaifs_store::MemoryDocStorage;

    fn repo() -> DocumentRepo {
        DocumentRepo::new(Arc::new(MemoryDocStorage::new()))
    }

    #[tokio::test]
    async fn create_change_reload() {
        let storage = Arc::new(MemoryDocStorage::new());
        let mut repo = DocumentRepo::new(storage.clone());
        let id = repo.create();
        repo.change(&id, Some("seed"), |tx| {
            tx.put(ROOT, "greeting", "hello").map_err(am)?;
            Ok(())
        })
        .await
        .unwrap();

        // A second repo over the same storage sees the committed state.
        let mut other = DocumentRepo::new(storage);
        other.find(&id).await.unwrap();
        let greeting = other
            .with_doc(&id, |doc| {
                use automerge::{ReadDoc, ScalarValue, Value};
                Ok(match doc.get(ROOT, "greeting").map_err(am)? {
                    Some((Value::Scalar(s), _)) => match s.as_ref() {
                        ScalarValue::Str(s) => s.to_string(),
                        _ => String::new(),
                    },
                    _ => String::new(),
                })
            })
            .await
            .unwrap();
        assert_eq!(greeting, "hello");
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let mut repo = repo();
        let err = repo.find(&DocId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, FsError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn failing_mutator_rolls_back() {
        let mut repo = repo();
        let id = repo.create();
        repo.change(&id, None, |tx| {
            tx.put(ROOT, "kept", "yes").map_err(am)?;
            Ok(())
        })
        .await
        .unwrap();

        let err = repo
            .change::<(), _>(&id, None, |tx| {
                tx.put(ROOT, "kept", "clobbered").map_err(am)?;
                Err(FsError::NotSupported("abort".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::NotSupported(_)));

        let heads_after = repo.heads(&id).await.unwrap();
        assert_eq!(heads_after.len(), 1);
        assert_eq!(repo.history(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_carries_message_and_actor() {
        let mut repo = repo();
        let id = repo.create();
        repo.change(&id, Some("first write"), |tx| {
            tx.put(ROOT, "n", 1_u64).map_err(am)?;
            Ok(())
        })
        .await
        .unwrap();

        let history = repo.history(&id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message.as_deref(), Some("first write"));
        assert_eq!(history[0].seq, 1);
        assert!(!history[0].actor.is_empty());
    }

    #[tokio::test]
    async fn diff_with_unknown_heads_is_empty() {
        let mut repo = repo();
        let id = repo.create();
        repo.change(&id, None, |tx| {
            tx.put(ROOT, "n", 1_u64).map_err(am)?;
            Ok(())
        })
        .await
        .unwrap();
        let heads = repo.heads(&id).await.unwrap();

        // A head from a different document is unknown here.
        let other = repo.create();
        repo.change(&other, None, |tx| {
            tx.put(ROOT, "n", 2_u64).map_err(am)?;
            Ok(())
        })
        .await
        .unwrap();
        let foreign = repo.heads(&other).await.unwrap();

        let patches = repo.diff(&id, &foreign, &heads).await.unwrap();
        assert!(patches.is_empty());
    }

    #[tokio::test]
    async fn eviction_keeps_persisted_state() {
        let mut repo = repo();
        let id = repo.create();
        repo.change(&id, None, |tx| {
            tx.put(ROOT, "n", 7_u64).map_err(am)?;
            Ok(())
        })
        .await
        .unwrap();

        repo.evict(&id);
        assert!(!repo.is_cached(&id));
        repo.find(&id).await.unwrap();
        assert_eq!(repo.history(&id).await.unwrap().len(), 1);
    }
}
