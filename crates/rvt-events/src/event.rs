use std::fmt;

use serde::{Deserialize, Serialize};

use rvt_types::ChangeKind;

/// An edit to a live draft, as seen by anyone watching it.
///
/// `pos` and `len` are byte offsets in the draft's text after the previous
/// event was applied. They carry no meaning for [`ChangeKind::VersionChange`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub draft: u32,
    pub kind: ChangeKind,
    pub pos: usize,
    pub len: usize,
}

impl ChangeEvent {
    pub fn insertion(draft: u32, pos: usize, len: usize) -> Self {
        Self {
            draft,
            kind: ChangeKind::Insertion,
            pos,
            len,
        }
    }

    pub fn deletion(draft: u32, pos: usize, len: usize) -> Self {
        Self {
            draft,
            kind: ChangeKind::Deletion,
            pos,
            len,
        }
    }

    pub fn version_change(draft: u32) -> Self {
        Self {
            draft,
            kind: ChangeKind::VersionChange,
            pos: 0,
            len: 0,
        }
    }

    /// Zero-length insertions and deletions change nothing.
    pub fn is_noop(&self) -> bool {
        self.kind != ChangeKind::VersionChange && self.len == 0
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeKind::VersionChange => write!(f, "draft {}: {}", self.draft, self.kind),
            _ => write!(
                f,
                "draft {}: {} {}+{}",
                self.draft, self.kind, self.pos, self.len
            ),
        }
    }
}
