use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Whether a revision belongs to a mutable draft line or a committed document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocType {
    /// An uncommitted, editable line of revisions.
    Draft,
    /// A committed, immutable revision tree.
    Document,
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Document => write!(f, "doc"),
        }
    }
}

/// Identifies exactly one revision.
///
/// `document` is the draft number for drafts and the document number for
/// committed documents; `version` indexes the revision within that line.
///
/// Display format: `draft:3.1` / `doc:0.7`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId {
    pub kind: DocType,
    pub document: u32,
    pub version: u32,
}

impl DocId {
    /// Create a revision id with explicit values.
    pub const fn new(kind: DocType, document: u32, version: u32) -> Self {
        Self {
            kind,
            document,
            version,
        }
    }

    /// Shorthand for a draft revision.
    pub const fn draft(draft: u32, version: u32) -> Self {
        Self::new(DocType::Draft, draft, version)
    }

    /// Shorthand for a committed document revision.
    pub const fn document(document: u32, version: u32) -> Self {
        Self::new(DocType::Document, document, version)
    }

    pub fn is_draft(&self) -> bool {
        self.kind == DocType::Draft
    }

    pub fn is_document(&self) -> bool {
        self.kind == DocType::Document
    }

    /// Returns `true` if both ids name revisions of the same draft or document.
    pub fn same_doc(&self, other: &DocId) -> bool {
        self.kind == other.kind && self.document == other.document
    }

    /// The same line, at another version.
    pub fn with_version(&self, version: u32) -> Self {
        Self { version, ..*self }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.kind, self.document, self.version)
    }
}

impl FromStr for DocId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidDocId(s.to_string());
        let (kind, rest) = s.split_once(':').ok_or_else(invalid)?;
        let kind = match kind {
            "draft" => DocType::Draft,
            "doc" => DocType::Document,
            _ => return Err(invalid()),
        };
        let (document, version) = rest.split_once('.').ok_or_else(invalid)?;
        let document = document.parse().map_err(|_| invalid())?;
        let version = version.parse().map_err(|_| invalid())?;
        Ok(Self::new(kind, document, version))
    }
}

/// Lifecycle state of a stored revision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevisionState {
    Deleted,
    #[default]
    Normal,
    /// Announced by a peer but not yet fully received.
    Pending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_doc_ignores_version() {
        let a = DocId::draft(3, 0);
        let b = DocId::draft(3, 9);
        let c = DocId::document(3, 0);
        assert!(a.same_doc(&b));
        assert!(!a.same_doc(&c));
    }

    #[test]
    fn display_format() {
        assert_eq!(DocId::draft(3, 1).to_string(), "draft:3.1");
        assert_eq!(DocId::document(0, 7).to_string(), "doc:0.7");
    }

    #[test]
    fn parse_roundtrip() {
        let id = DocId::document(12, 4);
        let parsed: DocId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("draft3.1".parse::<DocId>().is_err());
        assert!("page:1.1".parse::<DocId>().is_err());
        assert!("doc:1".parse::<DocId>().is_err());
        assert!("doc:x.1".parse::<DocId>().is_err());
    }

    #[test]
    fn with_version_keeps_line() {
        let id = DocId::draft(2, 0).with_version(5);
        assert_eq!(id, DocId::draft(2, 5));
    }

    #[test]
    fn default_state_is_normal() {
        assert_eq!(RevisionState::default(), RevisionState::Normal);
    }

    #[test]
    fn serde_roundtrip() {
        let id = DocId::draft(1, 2);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: DocId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
