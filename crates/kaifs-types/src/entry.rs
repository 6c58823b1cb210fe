//! Directory entry and stat types.

use serde::{Deserialize, Serialize};

/// Kind of tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }
}

/// A directory listing entry.
///
/// Returned by `readdir`; carries enough metadata for a shell `ls -l`
/// without a stat call per child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    /// Kind of entry.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Unix permissions (e.g. 0o644). Stored, not enforced.
    pub mode: u32,
    /// Last modification time (Unix seconds).
    pub mtime: i64,
}

impl DirEntry {
    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns true if this entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Metadata for a single path, as returned by `stat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStat {
    pub kind: EntryKind,
    /// Body byte length at the time of the last write; 0 for directories.
    pub size: u64,
    /// Unix permissions. Stored, not enforced.
    pub mode: u32,
    /// Last modification time (Unix seconds).
    pub mtime: i64,
    /// Creation time (Unix seconds).
    pub ctime: i64,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        assert_eq!(EntryKind::File.as_str(), "file");
        assert_eq!(EntryKind::Directory.as_str(), "directory");
    }

    #[test]
    fn dir_entry_predicates() {
        let entry = DirEntry {
            name: "notes.txt".into(),
            kind: EntryKind::File,
            size: 12,
            mode: 0o644,
            mtime: 0,
        };
        assert!(entry.is_file());
        assert!(!entry.is_dir());
    }
}
