//! Tree model: the flat `path → entry` map inside the root document.
//!
//! The root document's only logical field is a map under [`TREE_KEY`] whose
//! keys are normalized paths. All mutations here run inside a single change
//! on the root document, so post-conditions are atomic with respect to
//! readers. Nothing in this module touches file bodies; that is the body
//! router's job.
//!
//! Invariants the callers maintain: root `/` always exists as a directory
//! with no parent; every non-root entry's parent exists and is a directory;
//! a file entry carries exactly one body field, a directory none.

use automerge::{transaction::Transactable, ObjId, ObjType, ReadDoc, ScalarValue, Value, ROOT};
use kaifs_types::{DocId, EntryKind, FsError, FsResult};

use crate::{am, paths};

/// Key of the tree map at the root document's root.
pub const TREE_KEY: &str = "tree";

/// A file's body pointer — exactly one per file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileBody {
    /// Handle to a per-file CRDT text document.
    Text(DocId),
    /// Lowercase hex SHA-256 of bytes in the blob store.
    Blob(String),
}

/// The record stored at each normalized path.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    /// Normalized parent path; absent only for root.
    pub parent: Option<String>,
    /// Basename, stored so listings need no re-parsing.
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub ctime: i64,
    /// Body pointer for files, `None` for directories.
    pub body: Option<FileBody>,
}

impl TreeEntry {
    /// A directory entry at `path` with both timestamps set to `now`.
    pub fn directory(path: &str, mode: u32, now: i64) -> Self {
        Self {
            parent: parent_of(path),
            name: paths::basename(path),
            path: path.to_string(),
            kind: EntryKind::Directory,
            size: 0,
            mode,
            mtime: now,
            ctime: now,
            body: None,
        }
    }

    /// A file entry at `path` pointing at `body`.
    pub fn file(path: &str, body: FileBody, size: u64, mode: u32, mtime: i64, ctime: i64) -> Self {
        Self {
            parent: parent_of(path),
            name: paths::basename(path),
            path: path.to_string(),
            kind: EntryKind::File,
            size,
            mode,
            mtime,
            ctime,
            body: Some(body),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        None
    } else {
        Some(paths::parent(path))
    }
}

/// Create the tree map in a fresh root document.
pub fn init<T: Transactable>(tx: &mut T) -> FsResult<()> {
    tx.put_object(ROOT, TREE_KEY, ObjType::Map).map_err(am)?;
    Ok(())
}

fn tree_obj<D: ReadDoc>(doc: &D) -> FsResult<ObjId> {
    match doc.get(ROOT, TREE_KEY).map_err(am)? {
        Some((Value::Object(ObjType::Map), id)) => Ok(id),
        _ => Err(FsError::Storage("root document has no tree map".into())),
    }
}

/// Fetch the entry at a normalized path, or `None`.
pub fn get<D: ReadDoc>(doc: &D, path: &str) -> FsResult<Option<TreeEntry>> {
    let tree = tree_obj(doc)?;
    let entry_id = match doc.get(&tree, path).map_err(am)? {
        Some((Value::Object(ObjType::Map), id)) => id,
        Some(_) => return Err(FsError::Storage(format!("corrupt tree entry at {path}"))),
        None => return Ok(None),
    };
    read_entry(doc, path, &entry_id).map(Some)
}

/// Insert or replace the entry at its path.
pub fn put<T: Transactable>(tx: &mut T, entry: &TreeEntry) -> FsResult<()> {
    let tree = tree_obj(&*tx)?;
    let id = tx
        .put_object(&tree, entry.path.as_str(), ObjType::Map)
        .map_err(am)?;
    tx.put(&id, "kind", entry.kind.as_str()).map_err(am)?;
    if let Some(parent) = &entry.parent {
        tx.put(&id, "parent", parent.as_str()).map_err(am)?;
    }
    tx.put(&id, "name", entry.name.as_str()).map_err(am)?;
    tx.put(&id, "size", entry.size).map_err(am)?;
    tx.put(&id, "mode", entry.mode as u64).map_err(am)?;
    tx.put(&id, "mtime", entry.mtime).map_err(am)?;
    tx.put(&id, "ctime", entry.ctime).map_err(am)?;
    match &entry.body {
        Some(FileBody::Text(doc_id)) => {
            tx.put(&id, "text_doc_id", doc_id.as_str()).map_err(am)?;
        }
        Some(FileBody::Blob(hash)) => {
            tx.put(&id, "blob_hash", hash.as_str()).map_err(am)?;
        }
        None => {}
    }
    Ok(())
}

/// Remove the entry at `path` only; recursion is a caller concern.
pub fn remove<T: Transactable>(tx: &mut T, path: &str) -> FsResult<()> {
    let tree = tree_obj(&*tx)?;
    if tx.get(&tree, path).map_err(am)?.is_some() {
        tx.delete(&tree, path).map_err(am)?;
    }
    Ok(())
}

/// Entries whose parent is `path`. Order is unspecified but stable within
/// one snapshot.
pub fn children<D: ReadDoc>(doc: &D, path: &str) -> FsResult<Vec<TreeEntry>> {
    let tree = tree_obj(doc)?;
    let mut out = Vec::new();
    for key in doc.keys(&tree) {
        if key == path {
            continue;
        }
        if let Some(entry) = get(doc, &key)? {
            if entry.parent.as_deref() == Some(path) {
                out.push(entry);
            }
        }
    }
    Ok(out)
}

/// Every key in the tree map.
pub fn all_paths<D: ReadDoc>(doc: &D) -> FsResult<Vec<String>> {
    let tree = tree_obj(doc)?;
    Ok(doc.keys(&tree).collect())
}

fn read_entry<D: ReadDoc>(doc: &D, path: &str, entry: &ObjId) -> FsResult<TreeEntry> {
    let kind = match field_str(doc, entry, "kind")?.as_deref() {
        Some("file") => EntryKind::File,
        Some("directory") => EntryKind::Directory,
        other => {
            return Err(FsError::Storage(format!(
                "tree entry {path} has invalid kind {other:?}"
            )))
        }
    };
    let body = if kind == EntryKind::File {
        if let Some(id) = field_str(doc, entry, "text_doc_id")? {
            Some(FileBody::Text(DocId::new(id)))
        } else if let Some(hash) = field_str(doc, entry, "blob_hash")? {
            Some(FileBody::Blob(hash))
        } else {
            return Err(FsError::Storage(format!("file entry {path} has no body")));
        }
    } else {
        None
    };
    Ok(TreeEntry {
        path: path.to_string(),
        kind,
        parent: field_str(doc, entry, "parent")?,
        name: field_str(doc, entry, "name")?.unwrap_or_else(|| paths::basename(path)),
        size: field_u64(doc, entry, "size")?.unwrap_or(0),
        mode: field_u64(doc, entry, "mode")?.unwrap_or(0) as u32,
        mtime: field_i64(doc, entry, "mtime")?.unwrap_or(0),
        ctime: field_i64(doc, entry, "ctime")?.unwrap_or(0),
        body,
    })
}

fn field_str<D: ReadDoc>(doc: &D, obj: &ObjId, key: &str) -> FsResult<Option<String>> {
    Ok(match doc.get(obj, key).map_err(am)? {
        Some((Value::Scalar(value), _)) => match value.as_ref() {
            ScalarValue::Str(s) => Some(s.to_string()),
            _ => None,
        },
        _ => None,
    })
}

fn field_u64<D: ReadDoc>(doc: &D, obj: &ObjId, key: &str) -> FsResult<Option<u64>> {
    Ok(match doc.get(obj, key).map_err(am)? {
        Some((Value::Scalar(value), _)) => match value.as_ref() {
            ScalarValue::Uint(n) => Some(*n),
            ScalarValue::Int(n) => Some(*n as u64),
            _ => None,
        },
        _ => None,
    })
}

fn field_i64<D: ReadDoc>(doc: &D, obj: &ObjId, key: &str) -> FsResult<Option<i64>> {
    Ok(match doc.get(obj, key).map_err(am)? {
        Some((Value::Scalar(value), _)) => match value.as_ref() {
            ScalarValue::Int(n) => Some(*n),
            ScalarValue::Uint(n) => Some(*n as i64),
            _ => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use automerge::Automerge;

    fn seeded_doc() -> Automerge {
        let mut doc = Automerge::new();
        doc.transact::<_, _, FsError>(|tx| {
            init(tx)?;
            put(tx, &TreeEntry::directory("/", 0o755, 100))?;
            put(tx, &TreeEntry::directory("/src", 0o755, 100))?;
            put(
                tx,
                &TreeEntry::file(
                    "/src/main.rs",
                    FileBody::Text(DocId::new("doc-main")),
                    42,
                    0o644,
                    101,
                    100,
                ),
            )?;
            put(
                tx,
                &TreeEntry::file(
                    "/logo.png",
                    FileBody::Blob("abcd".into()),
                    4,
                    0o644,
                    102,
                    102,
                ),
            )?;
            Ok(())
        })
        .unwrap();
        doc
    }

    #[test]
    fn get_round_trips_fields() {
        let doc = seeded_doc();
        let entry = get(&doc, "/src/main.rs").unwrap().unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.parent.as_deref(), Some("/src"));
        assert_eq!(entry.name, "main.rs");
        assert_eq!(entry.size, 42);
        assert_eq!(entry.mode, 0o644);
        assert_eq!(entry.mtime, 101);
        assert_eq!(entry.ctime, 100);
        assert_eq!(entry.body, Some(FileBody::Text(DocId::new("doc-main"))));
    }

    #[test]
    fn root_has_no_parent() {
        let doc = seeded_doc();
        let root = get(&doc, "/").unwrap().unwrap();
        assert!(root.is_dir());
        assert!(root.parent.is_none());
        assert_eq!(root.name, "/");
    }

    #[test]
    fn absent_path_is_none() {
        let doc = seeded_doc();
        assert!(get(&doc, "/nope").unwrap().is_none());
    }

    #[test]
    fn blob_body_round_trips() {
        let doc = seeded_doc();
        let entry = get(&doc, "/logo.png").unwrap().unwrap();
        assert_eq!(entry.body, Some(FileBody::Blob("abcd".into())));
    }

    #[test]
    fn children_filters_by_parent() {
        let doc = seeded_doc();
        let kids = children(&doc, "/").unwrap();
        let mut names: Vec<_> = kids.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["logo.png", "src"]);

        let kids = children(&doc, "/src").unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].path, "/src/main.rs");
    }

    #[test]
    fn remove_deletes_only_the_named_entry() {
        let mut doc = seeded_doc();
        doc.transact::<_, _, FsError>(|tx| remove(tx, "/src"))
            .unwrap();
        assert!(get(&doc, "/src").unwrap().is_none());
        // Recursion is the caller's concern: the child key survives.
        assert!(get(&doc, "/src/main.rs").unwrap().is_some());
    }

    #[test]
    fn remove_of_absent_path_is_a_no_op() {
        let mut doc = seeded_doc();
        doc.transact::<_, _, FsError>(|tx| remove(tx, "/ghost"))
            .unwrap();
        assert_eq!(all_paths(&doc).unwrap().len(), 4);
    }

    #[test]
    fn put_replaces_an_existing_entry() {
        let mut doc = seeded_doc();
        doc.transact::<_, _, FsError>(|tx| {
            put(
                tx,
                &TreeEntry::file(
                    "/src/main.rs",
                    FileBody::Blob("ffff".into()),
                    9,
                    0o600,
                    200,
                    100,
                ),
            )
        })
        .unwrap();
        let entry = get(&doc, "/src/main.rs").unwrap().unwrap();
        assert_eq!(entry.body, Some(FileBody::Blob("ffff".into())));
        assert_eq!(entry.size, 9);
        assert_eq!(entry.mode, 0o600);
    }

    #[test]
    fn all_paths_lists_every_key() {
        let doc = seeded_doc();
        let mut paths = all_paths(&doc).unwrap();
        paths.sort();
        assert_eq!(paths, vec!["/", "/logo.png", "/src", "/src/main.rs"]);
    }
}
