use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rvt_types::{DocId, NodeRef, RevisionState, VersionId};

/// One stored revision of a draft or document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: DocId,
    /// `None` for the root of a document tree.
    pub parent: Option<DocId>,
    pub author: String,
    pub date: DateTime<Utc>,
    pub label: String,
    pub description: String,
    /// Root of the text tree.
    pub head: NodeRef,
    /// Root of the property list.
    pub props: NodeRef,
    pub state: RevisionState,
    pub frozen: bool,
    /// Node store slot this revision writes into.
    pub version: VersionId,
    /// Child revisions, in creation order.
    pub children: Vec<DocId>,
}

impl Revision {
    pub(crate) fn new(id: DocId, parent: Option<DocId>, content: NewRevision) -> Self {
        Self {
            id,
            parent,
            author: content.author,
            date: content.date,
            label: String::new(),
            description: String::new(),
            head: content.head,
            props: content.props,
            state: RevisionState::Normal,
            frozen: false,
            version: content.version,
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Content of a revision about to be stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRevision {
    pub head: NodeRef,
    pub props: NodeRef,
    pub version: VersionId,
    pub author: String,
    pub date: DateTime<Utc>,
}

impl NewRevision {
    pub fn new(head: NodeRef, props: NodeRef, version: VersionId, author: impl Into<String>) -> Self {
        Self {
            head,
            props,
            version,
            author: author.into(),
            date: Utc::now(),
        }
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }
}
