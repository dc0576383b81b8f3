use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rvt_types::{NodeRef, VersionId};

/// Inline payload of a `Data` leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataValue {
    Text(Vec<u8>),
    /// Named entries pointing at other leaves (revision properties).
    List(BTreeMap<String, NodeRef>),
    Boolean(bool),
    Number(i64),
}

/// A node in the append-only arena. Nodes are never mutated once pushed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Ordered children. `ends[i]` is the cumulative text offset at which
    /// child `i` ends.
    Branch {
        children: Vec<NodeRef>,
        ends: Vec<usize>,
    },
    Data(DataValue),
    /// A window `[offset, offset + len)` into another node's text.
    Part {
        target: NodeRef,
        offset: usize,
        len: usize,
    },
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Branch { .. } => "branch",
            Self::Data(_) => "data",
            Self::Part { .. } => "part",
        }
    }
}

/// An arena slot: the node plus cached text length and lookup depth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub version: VersionId,
    pub node: Node,
    pub len: usize,
    pub depth: u32,
}

/// A contiguous run of bytes inside a `Text` leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Piece {
    pub data: NodeRef,
    pub offset: usize,
    pub len: usize,
}

impl Piece {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Returns `true` if `next` continues this piece in the same leaf.
    pub fn joins(&self, next: &Piece) -> bool {
        self.data == next.data && self.end() == next.offset
    }
}
