//! File body routing: text versus binary.
//!
//! A write payload is classified by strict UTF-8 decoding. Text bodies live
//! in a per-file CRDT document under a `content` text object; updates are
//! applied as a minimal sequence of character splices computed from a Myers
//! diff, never as a whole-string replacement — replacing the field would
//! reduce concurrent edits to last-writer-wins. Binary bodies are hashed and
//! stored in the blob store by the engine before the tree entry that
//! references them is written.

use automerge::{transaction::Transactable, ObjType, ReadDoc, Value, ROOT};
use kaifs_types::FsResult;
use similar::{DiffOp, TextDiff};

use crate::am;

/// Key of the text object inside a per-file document.
pub const CONTENT_KEY: &str = "content";

/// Content handed to `write`, before classification.
#[derive(Debug, Clone)]
pub enum WritePayload {
    /// Caller passed a string; always classified as text.
    Text(String),
    /// Caller passed bytes; classified by strict UTF-8 decoding.
    Bytes(Vec<u8>),
}

impl From<&str> for WritePayload {
    fn from(text: &str) -> Self {
        WritePayload::Text(text.to_string())
    }
}

impl From<String> for WritePayload {
    fn from(text: String) -> Self {
        WritePayload::Text(text)
    }
}

impl From<&[u8]> for WritePayload {
    fn from(bytes: &[u8]) -> Self {
        WritePayload::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for WritePayload {
    fn from(bytes: Vec<u8>) -> Self {
        WritePayload::Bytes(bytes)
    }
}

/// Classified payload: decoded text, or opaque bytes.
#[derive(Debug, Clone)]
pub enum Classified {
    Text(String),
    Binary(Vec<u8>),
}

impl WritePayload {
    /// Route the payload: strings are text; bytes are text only when they
    /// decode as strict UTF-8.
    pub fn classify(self) -> Classified {
        match self {
            WritePayload::Text(text) => Classified::Text(text),
            WritePayload::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Classified::Text(text),
                Err(err) => Classified::Binary(err.into_bytes()),
            },
        }
    }
}

/// Rewrite a document's content to equal `target` via minimal splices.
///
/// Creates the content text object on first use. Positions are Unicode
/// scalar values, matching the substrate's text indexing.
pub fn update_content<T: Transactable>(tx: &mut T, target: &str) -> FsResult<()> {
    let content = match tx.get(ROOT, CONTENT_KEY).map_err(am)? {
        Some((Value::Object(ObjType::Text), id)) => id,
        _ => tx.put_object(ROOT, CONTENT_KEY, ObjType::Text).map_err(am)?,
    };
    let current = tx.text(&content).map_err(am)?;
    if current == target {
        return Ok(());
    }

    let diff = TextDiff::from_chars(current.as_str(), target);
    let mut pos = 0usize;
    for op in diff.ops() {
        match *op {
            DiffOp::Equal { len, .. } => pos += len,
            DiffOp::Delete { old_len, .. } => {
                tx.splice_text(&content, pos, old_len as isize, "")
                    .map_err(am)?;
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                let chunk: String = target.chars().skip(new_index).take(new_len).collect();
                tx.splice_text(&content, pos, 0, &chunk).map_err(am)?;
                pos += new_len;
            }
            DiffOp::Replace {
                old_len,
                new_index,
                new_len,
                ..
            } => {
                let chunk: String = target.chars().skip(new_index).take(new_len).collect();
                tx.splice_text(&content, pos, old_len as isize, &chunk)
                    .map_err(am)?;
                pos += new_len;
            }
        }
    }
    Ok(())
}

/// Current content of a per-file document; empty if never initialized.
pub fn text_of<D: ReadDoc>(doc: &D) -> FsResult<String> {
    match doc.get(ROOT, CONTENT_KEY).map_err(am)? {
        Some((Value::Object(ObjType::Text), id)) => doc.text(&id).map_err(am),
        _ => Ok(String::new()),
    }
}

/// Content of a per-file document at a specific set of heads.
pub fn text_at<D: ReadDoc>(doc: &D, heads: &[automerge::ChangeHash]) -> FsResult<String> {
    match doc.get_at(ROOT, CONTENT_KEY, heads).map_err(am)? {
        Some((Value::Object(ObjType::Text), id)) => doc.text_at(&id, heads).map_err(am),
        _ => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automerge::Automerge;
    use kaifs_types::FsError;

    fn set_text(doc: &mut Automerge, target: &str) {
        doc.transact::<_, _, FsError>(|tx| update_content(tx, target))
            .unwrap();
    }

    #[test]
    fn bytes_decode_to_text_when_utf8() {
        let payload = WritePayload::Bytes("Hello 世界 🌍".as_bytes().to_vec());
        match payload.classify() {
            Classified::Text(text) => assert_eq!(text, "Hello 世界 🌍"),
            Classified::Binary(_) => panic!("valid utf-8 classified as binary"),
        }
    }

    #[test]
    fn invalid_utf8_is_binary() {
        let payload = WritePayload::Bytes(vec![0x00, 0x01, 0x02, 0xff]);
        match payload.classify() {
            Classified::Binary(bytes) => assert_eq!(bytes, vec![0x00, 0x01, 0x02, 0xff]),
            Classified::Text(_) => panic!("invalid utf-8 classified as text"),
        }
    }

    #[test]
    fn update_reaches_the_target_text() {
        let mut doc = Automerge::new();
        set_text(&mut doc, "version one");
        assert_eq!(text_of(&doc).unwrap(), "version one");

        set_text(&mut doc, "version two");
        assert_eq!(text_of(&doc).unwrap(), "version two");
    }

    #[test]
    fn update_splices_instead_of_replacing() {
        let mut doc = Automerge::new();
        set_text(&mut doc, "the quick brown fox");
        let before = doc.get_heads();

        // Only the changed word should produce ops; the rest of the string
        // keeps its identity across the edit.
        set_text(&mut doc, "the quick red fox");
        let after = doc.get_heads();
        assert_ne!(before, after);
        assert_eq!(text_of(&doc).unwrap(), "the quick red fox");

        // A concurrent branch editing the tail merges with the word swap.
        let mut fork = doc.fork();
        set_text(&mut doc, "the quick red fox jumps");
        fork.transact::<_, _, FsError>(|tx| update_content(tx, "the QUICK red fox"))
            .unwrap();
        doc.merge(&mut fork).unwrap();
        assert_eq!(text_of(&doc).unwrap(), "the QUICK red fox jumps");
    }

    #[test]
    fn unicode_edits_use_scalar_positions() {
        let mut doc = Automerge::new();
        set_text(&mut doc, "héllo 世界");
        set_text(&mut doc, "héllo 世界 🌍");
        assert_eq!(text_of(&doc).unwrap(), "héllo 世界 🌍");

        set_text(&mut doc, "héllo 界");
        assert_eq!(text_of(&doc).unwrap(), "héllo 界");
    }

    #[test]
    fn text_at_reads_historic_content() {
        let mut doc = Automerge::new();
        set_text(&mut doc, "first");
        let h1 = doc.get_heads();
        set_text(&mut doc, "second");
        let h2 = doc.get_heads();

        assert_eq!(text_at(&doc, &h1).unwrap(), "first");
        assert_eq!(text_at(&doc, &h2).unwrap(), "second");
    }

    #[test]
    fn empty_document_reads_as_empty_text() {
        let doc = Automerge::new();
        assert_eq!(text_of(&doc).unwrap(), "");
    }
}
