use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of an edit to a live draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Bytes were inserted at a position.
    Insertion,
    /// A byte range was removed.
    Deletion,
    /// The revision behind the draft was replaced wholesale (undo to an
    /// earlier version, reload from disk). Position data is meaningless.
    VersionChange,
}

impl ChangeKind {
    /// All kinds, in declaration order.
    pub const ALL: [ChangeKind; 3] = [
        ChangeKind::Insertion,
        ChangeKind::Deletion,
        ChangeKind::VersionChange,
    ];
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insertion => "Insertion",
            Self::Deletion => "Deletion",
            Self::VersionChange => "VersionChange",
        };
        write!(f, "{s}")
    }
}
