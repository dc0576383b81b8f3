//! The revision graph: documents, drafts, and their parent/child trees.
//!
//! [`RevisionGraph`] resolves [`DocId`] values to stored [`Revision`]s.
//! Documents hold committed, frozen revisions. Drafts hold a mutable line of
//! revisions that may branch off a document revision (their origin).
//!
//! # Invariants
//!
//! - Every parent reference resolves, and the parent lists the child.
//! - Committed revisions are frozen.
//! - Ordering questions are answered by ancestor reachability, never by date.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use rvt_types::{DocId, DocType, NodeRef, RevisionState, VersionId};

use crate::error::{HistoryError, HistoryResult};
use crate::revision::{NewRevision, Revision};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct DocumentLine {
    revisions: Vec<Revision>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DraftLine {
    /// Revision this draft branched from, if any.
    origin: Option<DocId>,
    revisions: Vec<Revision>,
    /// Version index of the live edit point.
    head: u32,
    /// Document revision produced by committing this draft.
    committed: Option<DocId>,
}

fn corrupt(di: DocId) -> HistoryError {
    error!(revision = %di, "revision does not resolve");
    HistoryError::CorruptHistory(di)
}

/// Parent/child trees for every document and draft.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RevisionGraph {
    documents: Vec<DocumentLine>,
    drafts: Vec<DraftLine>,
}

impl RevisionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn draft_count(&self) -> usize {
        self.drafts.len()
    }

    /// Total number of stored revisions.
    pub fn len(&self) -> usize {
        self.documents.iter().map(|d| d.revisions.len()).sum::<usize>()
            + self.drafts.iter().map(|d| d.revisions.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.drafts.is_empty()
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    fn lookup(&self, di: DocId) -> Option<&Revision> {
        let revisions = match di.kind {
            DocType::Draft => &self.drafts.get(di.document as usize)?.revisions,
            DocType::Document => &self.documents.get(di.document as usize)?.revisions,
        };
        revisions.get(di.version as usize)
    }

    fn lookup_mut(&mut self, di: DocId) -> HistoryResult<&mut Revision> {
        let revisions = match di.kind {
            DocType::Draft => self.drafts.get_mut(di.document as usize).map(|d| &mut d.revisions),
            DocType::Document => self
                .documents
                .get_mut(di.document as usize)
                .map(|d| &mut d.revisions),
        };
        revisions
            .and_then(|r| r.get_mut(di.version as usize))
            .ok_or_else(|| corrupt(di))
    }

    /// Resolve a revision.
    pub fn revision(&self, di: DocId) -> HistoryResult<&Revision> {
        self.lookup(di).ok_or_else(|| corrupt(di))
    }

    pub fn contains(&self, di: DocId) -> bool {
        self.lookup(di).is_some()
    }

    /// The revision that writes into node store slot `version`. A committed
    /// document revision shares its draft's slot and is preferred.
    pub fn owner_of_version(&self, version: VersionId) -> Option<DocId> {
        self.all_revisions()
            .find(|rev| rev.version == version)
            .map(|rev| rev.id)
    }

    fn draft_line(&self, draft: u32) -> HistoryResult<&DraftLine> {
        self.drafts
            .get(draft as usize)
            .ok_or(HistoryError::UnknownDraft(draft))
    }

    fn draft_line_mut(&mut self, draft: u32) -> HistoryResult<&mut DraftLine> {
        self.drafts
            .get_mut(draft as usize)
            .ok_or(HistoryError::UnknownDraft(draft))
    }

    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// Start a new document whose root revision is `content`.
    pub fn create_document_root(&mut self, content: NewRevision, label: &str) -> DocId {
        let id = DocId::document(self.documents.len() as u32, 0);
        let mut rev = Revision::new(id, None, content);
        rev.label = label.to_string();
        rev.frozen = true;
        self.documents.push(DocumentLine {
            revisions: vec![rev],
        });
        info!(revision = %id, "created document");
        id
    }

    /// Start a new draft, optionally branching from `origin`.
    pub fn create_draft(&mut self, origin: Option<DocId>, content: NewRevision) -> HistoryResult<DocId> {
        if let Some(origin) = origin {
            self.revision(origin)?;
        }
        let id = DocId::draft(self.drafts.len() as u32, 0);
        self.drafts.push(DraftLine {
            origin,
            revisions: vec![Revision::new(id, origin, content)],
            head: 0,
            committed: None,
        });
        if let Some(origin) = origin {
            self.lookup_mut(origin)?.children.push(id);
        }
        debug!(revision = %id, origin = ?origin, "created draft");
        Ok(id)
    }

    /// Append a draft revision whose parent is `parent_version` of the same
    /// draft. The new revision becomes the draft head.
    pub fn add_draft_version(
        &mut self,
        draft: u32,
        parent_version: u32,
        content: NewRevision,
    ) -> HistoryResult<DocId> {
        let line = self.draft_line(draft)?;
        if line.committed.is_some() {
            return Err(HistoryError::DraftCommitted(draft));
        }
        let parent = DocId::draft(draft, parent_version);
        self.revision(parent)?;

        let id = DocId::draft(draft, line.revisions.len() as u32);
        let line = self.draft_line_mut(draft)?;
        line.revisions.push(Revision::new(id, Some(parent), content));
        line.head = id.version;
        self.lookup_mut(parent)?.children.push(id);
        debug!(revision = %id, parent = %parent, "added draft version");
        Ok(id)
    }

    /// Commit a draft revision as a document revision.
    ///
    /// The new revision's parent is the draft's origin when that origin is a
    /// document revision; otherwise a new document is started. The draft
    /// revision is frozen and the draft accepts no further versions.
    pub fn commit(
        &mut self,
        draft_version: DocId,
        label: &str,
        description: &str,
        date: DateTime<Utc>,
    ) -> HistoryResult<DocId> {
        if !draft_version.is_draft() {
            return Err(HistoryError::NotDraft(draft_version));
        }
        if self.draft_line(draft_version.document)?.committed.is_some() {
            return Err(HistoryError::DraftCommitted(draft_version.document));
        }
        let source = self.revision(draft_version)?.clone();
        let origin = self.draft_line(draft_version.document)?.origin;

        let content = NewRevision {
            head: source.head,
            props: source.props,
            version: source.version,
            author: source.author.clone(),
            date,
        };
        let id = match origin.filter(DocId::is_document) {
            Some(parent) => {
                let line = self
                    .documents
                    .get_mut(parent.document as usize)
                    .ok_or(HistoryError::UnknownDocument(parent.document))?;
                let id = DocId::document(parent.document, line.revisions.len() as u32);
                let mut rev = Revision::new(id, Some(parent), content);
                rev.label = label.to_string();
                rev.description = description.to_string();
                rev.frozen = true;
                line.revisions.push(rev);
                self.lookup_mut(parent)?.children.push(id);
                id
            }
            None => {
                let id = self.create_document_root(content, label);
                self.lookup_mut(id)?.description = description.to_string();
                id
            }
        };

        self.lookup_mut(draft_version)?.frozen = true;
        self.draft_line_mut(draft_version.document)?.committed = Some(id);
        info!(draft = %draft_version, revision = %id, label, "committed draft");
        Ok(id)
    }

    // ---------------------------------------------------------------
    // Heads and origins
    // ---------------------------------------------------------------

    /// The live edit point of a draft.
    pub fn draft_head(&self, draft: u32) -> HistoryResult<DocId> {
        Ok(DocId::draft(draft, self.draft_line(draft)?.head))
    }

    /// Move a draft's live edit point to one of its existing versions.
    pub fn set_draft_head(&mut self, draft: u32, version: u32) -> HistoryResult<()> {
        self.revision(DocId::draft(draft, version))?;
        self.draft_line_mut(draft)?.head = version;
        debug!(draft, version, "moved draft head");
        Ok(())
    }

    pub fn draft_origin(&self, draft: u32) -> HistoryResult<Option<DocId>> {
        Ok(self.draft_line(draft)?.origin)
    }

    /// The document revision produced by committing `draft`, if any.
    pub fn draft_commit(&self, draft: u32) -> HistoryResult<Option<DocId>> {
        Ok(self.draft_line(draft)?.committed)
    }

    /// The latest committed revision of a document.
    pub fn document_head(&self, doc: u32) -> HistoryResult<DocId> {
        let line = self
            .documents
            .get(doc as usize)
            .ok_or(HistoryError::UnknownDocument(doc))?;
        Ok(DocId::document(doc, line.revisions.len() as u32 - 1))
    }

    // ---------------------------------------------------------------
    // Tree queries
    // ---------------------------------------------------------------

    /// Parent of a revision. A root revision is its own parent.
    pub fn doc_parent(&self, di: DocId) -> HistoryResult<DocId> {
        Ok(self.revision(di)?.parent.unwrap_or(di))
    }

    pub fn child_count(&self, di: DocId) -> HistoryResult<usize> {
        Ok(self.revision(di)?.children.len())
    }

    pub fn child_id(&self, di: DocId, pos: usize) -> HistoryResult<Option<DocId>> {
        Ok(self.revision(di)?.children.get(pos).copied())
    }

    /// Children in creation order.
    pub fn children(&self, di: DocId) -> HistoryResult<Vec<DocId>> {
        Ok(self.revision(di)?.children.clone())
    }

    /// Path from the parent of `di` up to its root. `di` itself is not
    /// included.
    pub fn ancestors(&self, di: DocId) -> HistoryResult<Vec<DocId>> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(di);
        let mut current = self.revision(di)?.parent;
        while let Some(parent) = current {
            if !visited.insert(parent) {
                return Err(HistoryError::Inconsistent(format!("cycle through {parent}")));
            }
            result.push(parent);
            current = self.revision(parent)?.parent;
        }
        Ok(result)
    }

    /// Root of the tree containing `di`.
    pub fn root_of(&self, di: DocId) -> HistoryResult<DocId> {
        Ok(self.ancestors(di)?.last().copied().unwrap_or(di))
    }

    /// `true` if `d1` is a proper ancestor of `d2`.
    pub fn is_earlier(&self, d1: DocId, d2: DocId) -> HistoryResult<bool> {
        self.revision(d1)?;
        Ok(self.ancestors(d2)?.contains(&d1))
    }

    /// `true` if `d1` is a proper descendant of `d2`.
    pub fn is_later(&self, d1: DocId, d2: DocId) -> HistoryResult<bool> {
        self.is_earlier(d2, d1)
    }

    /// `true` if both revisions descend from the same root.
    pub fn in_same_history(&self, d1: DocId, d2: DocId) -> HistoryResult<bool> {
        Ok(self.root_of(d1)? == self.root_of(d2)?)
    }

    // ---------------------------------------------------------------
    // Mutation of existing revisions
    // ---------------------------------------------------------------

    fn editable_mut(&mut self, di: DocId) -> HistoryResult<&mut Revision> {
        if !di.is_draft() {
            return Err(HistoryError::NotDraft(di));
        }
        let rev = self.lookup_mut(di)?;
        if rev.frozen {
            return Err(HistoryError::Frozen(di));
        }
        Ok(rev)
    }

    /// Replace the text head of an unfrozen draft revision.
    pub fn set_head(&mut self, di: DocId, head: NodeRef) -> HistoryResult<()> {
        self.editable_mut(di)?.head = head;
        Ok(())
    }

    /// Replace the property list of an unfrozen draft revision.
    pub fn set_properties(&mut self, di: DocId, props: NodeRef) -> HistoryResult<()> {
        self.editable_mut(di)?.props = props;
        Ok(())
    }

    /// Freeze a revision. Freezing twice is a no-op.
    pub fn freeze(&mut self, di: DocId) -> HistoryResult<()> {
        let rev = self.lookup_mut(di)?;
        if !rev.frozen {
            rev.frozen = true;
            debug!(revision = %di, "froze revision");
        }
        Ok(())
    }

    pub fn set_state(&mut self, di: DocId, state: RevisionState) -> HistoryResult<()> {
        self.lookup_mut(di)?.state = state;
        Ok(())
    }

    pub fn set_label(&mut self, di: DocId, label: &str) -> HistoryResult<()> {
        self.lookup_mut(di)?.label = label.to_string();
        Ok(())
    }

    pub fn set_description(&mut self, di: DocId, description: &str) -> HistoryResult<()> {
        self.lookup_mut(di)?.description = description.to_string();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Validation & serialization
    // ---------------------------------------------------------------

    fn all_revisions(&self) -> impl Iterator<Item = &Revision> {
        self.documents
            .iter()
            .flat_map(|d| d.revisions.iter())
            .chain(self.drafts.iter().flat_map(|d| d.revisions.iter()))
    }

    /// Check that every parent resolves and lists its child, every child
    /// points back at its parent, and committed revisions are frozen.
    pub fn validate(&self) -> HistoryResult<()> {
        for rev in self.all_revisions() {
            if let Some(parent) = rev.parent {
                let parent_rev = self.lookup(parent).ok_or_else(|| {
                    HistoryError::Inconsistent(format!("{} has dangling parent {parent}", rev.id))
                })?;
                if !parent_rev.children.contains(&rev.id) {
                    return Err(HistoryError::Inconsistent(format!(
                        "{parent} does not list child {}",
                        rev.id
                    )));
                }
            }
            for child in &rev.children {
                let child_rev = self.lookup(*child).ok_or_else(|| {
                    HistoryError::Inconsistent(format!("{} has dangling child {child}", rev.id))
                })?;
                if child_rev.parent != Some(rev.id) {
                    return Err(HistoryError::Inconsistent(format!(
                        "{child} does not point back at {}",
                        rev.id
                    )));
                }
            }
            if rev.id.is_document() && !rev.frozen {
                return Err(HistoryError::Inconsistent(format!("{} is not frozen", rev.id)));
            }
        }
        for (n, line) in self.drafts.iter().enumerate() {
            if line.head as usize >= line.revisions.len() {
                return Err(HistoryError::Inconsistent(format!(
                    "draft {n} head {} out of range",
                    line.head
                )));
            }
        }
        Ok(())
    }

    /// Serialize the graph with bincode.
    pub fn to_bytes(&self) -> HistoryResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| HistoryError::Serialization(e.to_string()))
    }

    /// Deserialize a graph previously produced by [`RevisionGraph::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> HistoryResult<Self> {
        bincode::deserialize(bytes).map_err(|e| HistoryError::Serialization(e.to_string()))
    }
}
