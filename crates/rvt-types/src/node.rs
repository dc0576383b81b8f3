use std::fmt;

use serde::{Deserialize, Serialize};

/// A node store version slot.
///
/// Every revision that writes nodes owns one slot. Freezing a slot makes all
/// nodes written under it immutable for editing purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(pub u32);

/// Index of a node in the append-only node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Addresses a node within a version's tree.
///
/// Two revisions whose head `NodeRef`s are equal share the exact same text
/// without any comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub version_id: VersionId,
    pub node_id: NodeId,
}

impl NodeRef {
    pub const fn new(version_id: VersionId, node_id: NodeId) -> Self {
        Self {
            version_id,
            node_id,
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version_id, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let nr = NodeRef::new(VersionId(4), NodeId(17));
        assert_eq!(nr.to_string(), "v4/n17");
    }

    #[test]
    fn equality_needs_both_fields() {
        let a = NodeRef::new(VersionId(1), NodeId(2));
        let b = NodeRef::new(VersionId(2), NodeId(2));
        assert_ne!(a, b);
        assert_eq!(a, NodeRef::new(VersionId(1), NodeId(2)));
    }

    #[test]
    fn node_index() {
        assert_eq!(NodeId(9).index(), 9);
    }
}
