//! On-disk data-dir layout.
//!
//! A filesystem's durable state lives under one data directory:
//!
//! | Path | Contents |
//! |------|----------|
//! | `<data_dir>/automerge/` | CRDT document blocks ([`crate::FsDocStorage`]) |
//! | `<data_dir>/blobs/<aa>/<rest>` | binary bodies ([`crate::BlobStore`]) |
//! | `<data_dir>/root-doc-id` | the root document handle, UTF-8, one line |
//!
//! Hosts write `root-doc-id` once after creating a filesystem and read it
//! back on later starts to reopen the same tree.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kaifs_types::DocId;

use crate::error::StoreResult;

/// Directory holding CRDT document blocks.
pub fn automerge_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("automerge")
}

/// Directory holding content-addressed blobs.
pub fn blobs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("blobs")
}

/// Location of the root handle bootstrap file.
pub fn root_doc_id_path(data_dir: &Path) -> PathBuf {
    data_dir.join("root-doc-id")
}

/// Read the persisted root handle, stripping trailing whitespace.
///
/// Returns `None` when no filesystem has been created under this data dir.
pub async fn read_root_doc_id(data_dir: &Path) -> StoreResult<Option<DocId>> {
    match tokio::fs::read_to_string(root_doc_id_path(data_dir)).await {
        Ok(contents) => {
            let id = contents.trim_end();
            if id.is_empty() {
                Ok(None)
            } else {
                Ok(Some(DocId::new(id)))
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Persist the root handle. Written once after `open_new`.
pub async fn write_root_doc_id(data_dir: &Path, id: &DocId) -> StoreResult<()> {
    tokio::fs::create_dir_all(data_dir).await?;
    tokio::fs::write(root_doc_id_path(data_dir), format!("{id}\n")).await?;
    Ok(())
}
