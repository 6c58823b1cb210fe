//! History and snapshot records.

use serde::{Deserialize, Serialize};

/// One committed change in a document's history, in causal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Change hash, hex-encoded.
    pub hash: String,
    /// Actor that authored the change.
    pub actor: String,
    /// Actor-local sequence number.
    pub seq: u64,
    /// Wall-clock commit time (Unix seconds).
    pub timestamp: i64,
    /// Optional commit message (structural ops tag their commits).
    pub message: Option<String>,
}

/// A point-in-time marker over the whole filesystem.
///
/// The heads pin the root document's version. The label is an annotation for
/// the caller to store externally — the engine does not persist it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Root document heads, hex-encoded.
    pub heads: Vec<String>,
    pub label: Option<String>,
    /// Unix seconds at snapshot time.
    pub timestamp: i64,
}
