use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use rvt_types::{NodeId, NodeRef, VersionId};

use crate::error::{StoreError, StoreResult};
use crate::node::{DataValue, Node, NodeEntry, Piece};

/// Pieces allowed in a consolidated tree before it collapses to one leaf.
pub const DEFAULT_MAX_PIECES: usize = 4096;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct VersionSlot {
    frozen: bool,
}

/// Append-only arena of text nodes shared by every revision.
///
/// Each edit layers a `Branch` of at most three children over the previous
/// head: a `Part` before the edit, the new `Data`, and a `Part` after it.
/// Untouched text is never copied. Revisions hold [`NodeRef`] handles into
/// the arena.
#[derive(Clone, Serialize, Deserialize)]
pub struct NodeStore {
    nodes: Vec<NodeEntry>,
    versions: Vec<VersionSlot>,
    max_pieces: usize,
}

impl NodeStore {
    /// Create an empty store with the default piece budget.
    pub fn new() -> Self {
        Self::with_max_pieces(DEFAULT_MAX_PIECES)
    }

    /// Create an empty store; consolidation collapses trees with more than
    /// `max_pieces` pieces into a single leaf.
    pub fn with_max_pieces(max_pieces: usize) -> Self {
        Self {
            nodes: Vec::new(),
            versions: Vec::new(),
            max_pieces: max_pieces.max(1),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn max_pieces(&self) -> usize {
        self.max_pieces
    }

    // -----------------------------------------------------------------------
    // Version slots
    // -----------------------------------------------------------------------

    /// Allocate a version slot for a new revision.
    pub fn open_version(&mut self) -> VersionId {
        let id = VersionId(self.versions.len() as u32);
        self.versions.push(VersionSlot::default());
        debug!(version = %id, "opened version slot");
        id
    }

    /// Mark a version slot immutable. Freezing twice is a no-op.
    pub fn freeze(&mut self, version: VersionId) -> StoreResult<()> {
        let slot = self
            .versions
            .get_mut(version.0 as usize)
            .ok_or(StoreError::UnknownVersion(version))?;
        slot.frozen = true;
        debug!(version = %version, "froze version slot");
        Ok(())
    }

    pub fn is_frozen(&self, version: VersionId) -> StoreResult<bool> {
        self.versions
            .get(version.0 as usize)
            .map(|slot| slot.frozen)
            .ok_or(StoreError::UnknownVersion(version))
    }

    pub(crate) fn check_writable(&self, version: VersionId) -> StoreResult<()> {
        if self.is_frozen(version)? {
            return Err(StoreError::Frozen(version));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Arena access
    // -----------------------------------------------------------------------

    /// Resolve a node reference. A reference whose index or owning version
    /// does not match the arena is corrupt history.
    pub fn entry(&self, nr: NodeRef) -> StoreResult<&NodeEntry> {
        match self.nodes.get(nr.node_id.index()) {
            Some(entry) if entry.version == nr.version_id => Ok(entry),
            _ => Err(self.corrupt(nr)),
        }
    }

    pub fn node(&self, nr: NodeRef) -> StoreResult<&Node> {
        self.entry(nr).map(|e| &e.node)
    }

    pub(crate) fn corrupt(&self, nr: NodeRef) -> StoreError {
        error!(node = %nr, arena = self.nodes.len(), "node reference does not resolve");
        StoreError::CorruptHistory(nr)
    }

    /// Append a node under `version`, computing its cached length and depth.
    pub(crate) fn push(&mut self, version: VersionId, node: Node) -> StoreResult<NodeRef> {
        self.check_writable(version)?;
        let (len, depth) = match &node {
            Node::Data(DataValue::Text(bytes)) => (bytes.len(), 1),
            Node::Data(_) => (0, 1),
            Node::Part { target, offset, len } => {
                let target_entry = self.entry(*target)?;
                if offset + len > target_entry.len {
                    return Err(StoreError::OutOfRange {
                        pos: offset + len,
                        len: target_entry.len,
                    });
                }
                (*len, target_entry.depth + 1)
            }
            Node::Branch { children, ends } => {
                let mut depth = 0;
                for child in children {
                    depth = depth.max(self.entry(*child)?.depth);
                }
                (ends.last().copied().unwrap_or(0), depth + 1)
            }
        };
        let nr = NodeRef::new(version, NodeId(self.nodes.len() as u32));
        self.nodes.push(NodeEntry {
            version,
            node,
            len,
            depth,
        });
        Ok(nr)
    }

    fn push_branch(&mut self, version: VersionId, children: Vec<NodeRef>) -> StoreResult<NodeRef> {
        let mut ends = Vec::with_capacity(children.len());
        let mut total = 0;
        for child in &children {
            total += self.entry(*child)?.len;
            ends.push(total);
        }
        self.push(version, Node::Branch { children, ends })
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    /// Store `bytes` as a fresh text leaf.
    pub fn create_text(&mut self, version: VersionId, bytes: &[u8]) -> StoreResult<NodeRef> {
        self.push(version, Node::Data(DataValue::Text(bytes.to_vec())))
    }

    /// Text length of the tree rooted at `head`.
    pub fn length(&self, head: NodeRef) -> StoreResult<usize> {
        self.entry(head).map(|e| e.len)
    }

    /// Lookup depth of the tree rooted at `head`.
    pub fn depth(&self, head: NodeRef) -> StoreResult<u32> {
        self.entry(head).map(|e| e.depth)
    }

    pub(crate) fn check_range(&self, head: NodeRef, start: usize, end: usize) -> StoreResult<usize> {
        let len = self.length(head)?;
        check_range(start, end, len)?;
        Ok(len)
    }

    /// Insert `text` at `pos`, returning the new head.
    pub fn insert(
        &mut self,
        version: VersionId,
        head: NodeRef,
        pos: usize,
        text: &[u8],
    ) -> StoreResult<NodeRef> {
        self.check_writable(version)?;
        let len = self.check_range(head, pos, pos)?;
        if text.is_empty() {
            return Ok(head);
        }
        if len == 0 {
            return self.create_text(version, text);
        }

        let mut children = Vec::with_capacity(3);
        if pos > 0 {
            children.push(self.push(version, Node::Part { target: head, offset: 0, len: pos })?);
        }
        children.push(self.create_text(version, text)?);
        if pos < len {
            children.push(self.push(
                version,
                Node::Part { target: head, offset: pos, len: len - pos },
            )?);
        }
        let new_head = self.push_branch(version, children)?;
        debug!(version = %version, pos, len = text.len(), head = %new_head, "inserted text");
        Ok(new_head)
    }

    /// Remove `[start, end)`, returning the new head.
    pub fn delete(
        &mut self,
        version: VersionId,
        head: NodeRef,
        start: usize,
        end: usize,
    ) -> StoreResult<NodeRef> {
        self.check_writable(version)?;
        let len = self.check_range(head, start, end)?;
        if start == end {
            return Ok(head);
        }

        let mut children = Vec::with_capacity(2);
        if start > 0 {
            children.push(self.push(version, Node::Part { target: head, offset: 0, len: start })?);
        }
        if end < len {
            children.push(self.push(
                version,
                Node::Part { target: head, offset: end, len: len - end },
            )?);
        }
        let new_head = match children.len() {
            0 => self.create_text(version, b"")?,
            1 => children[0],
            _ => self.push_branch(version, children)?,
        };
        debug!(version = %version, start, end, head = %new_head, "deleted text");
        Ok(new_head)
    }

    /// Move `[start, end)` so it lands at `dest`, given in pre-move
    /// coordinates. The moved text is one `Part` over the old head, so no
    /// bytes are copied. A destination inside the range is a no-op.
    pub fn move_range(
        &mut self,
        version: VersionId,
        head: NodeRef,
        start: usize,
        end: usize,
        dest: usize,
    ) -> StoreResult<NodeRef> {
        self.check_writable(version)?;
        let len = self.check_range(head, start, end)?;
        if dest > len {
            return Err(StoreError::OutOfRange { pos: dest, len });
        }
        if start == end || (start..=end).contains(&dest) {
            return Ok(head);
        }

        let windows = if dest < start {
            [(0, dest), (start, end), (dest, start), (end, len)]
        } else {
            [(0, start), (end, dest), (start, end), (dest, len)]
        };
        let mut children = Vec::with_capacity(4);
        for (offset, to) in windows {
            if offset < to {
                children.push(self.push(
                    version,
                    Node::Part { target: head, offset, len: to - offset },
                )?);
            }
        }
        let new_head = self.push_branch(version, children)?;
        debug!(version = %version, start, end, dest, head = %new_head, "moved text");
        Ok(new_head)
    }

    /// Bytes in `[start, end)`.
    pub fn text_part(&self, head: NodeRef, start: usize, end: usize) -> StoreResult<Vec<u8>> {
        self.check_range(head, start, end)?;
        let mut pieces = Vec::new();
        self.collect_pieces(head, start, end, &mut pieces)?;
        let mut out = Vec::with_capacity(end - start);
        for piece in pieces {
            match self.node(piece.data)? {
                Node::Data(DataValue::Text(bytes)) => {
                    out.extend_from_slice(&bytes[piece.offset..piece.end()]);
                }
                _ => return Err(StoreError::NotText(piece.data)),
            }
        }
        Ok(out)
    }

    /// The whole text.
    pub fn text(&self, head: NodeRef) -> StoreResult<Vec<u8>> {
        let len = self.length(head)?;
        self.text_part(head, 0, len)
    }

    /// Leaf pieces covering `[start, end)` of `head`, in order, with adjacent
    /// runs of the same leaf merged.
    pub fn pieces(&self, head: NodeRef, start: usize, end: usize) -> StoreResult<Vec<Piece>> {
        self.check_range(head, start, end)?;
        let mut pieces = Vec::new();
        self.collect_pieces(head, start, end, &mut pieces)?;
        Ok(pieces)
    }

    fn collect_pieces(
        &self,
        nr: NodeRef,
        start: usize,
        end: usize,
        out: &mut Vec<Piece>,
    ) -> StoreResult<()> {
        if start == end {
            return Ok(());
        }
        let entry = self.entry(nr)?;
        if end > entry.len {
            return Err(self.corrupt(nr));
        }
        match &entry.node {
            Node::Data(DataValue::Text(_)) => {
                let piece = Piece { data: nr, offset: start, len: end - start };
                if let Some(last) = out.last_mut().filter(|last| last.joins(&piece)) {
                    last.len += piece.len;
                } else {
                    out.push(piece);
                }
            }
            Node::Data(_) => return Err(StoreError::NotText(nr)),
            Node::Part { target, offset, .. } => {
                self.collect_pieces(*target, offset + start, offset + end, out)?;
            }
            Node::Branch { children, ends } => {
                let first = ends.partition_point(|&e| e <= start);
                let mut child_start = if first == 0 { 0 } else { ends[first - 1] };
                for (child, &child_end) in children.iter().zip(ends).skip(first) {
                    if child_start >= end {
                        break;
                    }
                    let s = start.max(child_start) - child_start;
                    let e = end.min(child_end) - child_start;
                    self.collect_pieces(*child, s, e, out)?;
                    child_start = child_end;
                }
            }
        }
        Ok(())
    }

    /// The run of text around `pos` that comes from a single leaf, and that
    /// leaf. The leaf's version slot names the revision that typed it.
    pub fn node_info(&self, head: NodeRef, pos: usize) -> StoreResult<NodeInfo> {
        let len = self.length(head)?;
        if pos >= len {
            return Err(StoreError::OutOfRange { pos, len });
        }
        let mut start = 0;
        for piece in self.pieces(head, 0, len)? {
            let end = start + piece.len;
            if pos < end {
                return Ok(NodeInfo { start, end, leaf: piece.data });
            }
            start = end;
        }
        Err(self.corrupt(head))
    }

    // -----------------------------------------------------------------------
    // Consolidation
    // -----------------------------------------------------------------------

    /// Flatten `head` into a single branch whose children point straight at
    /// text leaves. Trees with more pieces than the budget collapse into one
    /// new leaf. The returned head has the same text and depth of at most 3.
    pub fn consolidate(&mut self, version: VersionId, head: NodeRef) -> StoreResult<NodeRef> {
        self.check_writable(version)?;
        let len = self.length(head)?;
        let pieces = self.pieces(head, 0, len)?;
        let before = self.depth(head)?;

        let new_head = if pieces.len() > self.max_pieces {
            let text = self.text(head)?;
            self.create_text(version, &text)?
        } else if pieces.is_empty() {
            self.create_text(version, b"")?
        } else if pieces.len() == 1 && self.covers_leaf(&pieces[0])? {
            pieces[0].data
        } else {
            let mut children = Vec::with_capacity(pieces.len());
            for piece in &pieces {
                let child = if self.covers_leaf(piece)? {
                    piece.data
                } else {
                    self.push(
                        version,
                        Node::Part { target: piece.data, offset: piece.offset, len: piece.len },
                    )?
                };
                children.push(child);
            }
            self.push_branch(version, children)?
        };
        debug!(
            version = %version,
            pieces = pieces.len(),
            depth_before = before,
            depth_after = self.depth(new_head)?,
            "consolidated text tree"
        );
        Ok(new_head)
    }

    fn covers_leaf(&self, piece: &Piece) -> StoreResult<bool> {
        Ok(piece.offset == 0 && piece.len == self.length(piece.data)?)
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Serialize the whole arena with bincode.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserialize an arena previously produced by [`NodeStore::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Where a run of text came from: it spans `[start, end)` of the queried
/// head and lives in `leaf`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub start: usize,
    pub end: usize,
    pub leaf: NodeRef,
}

impl NodeInfo {
    pub fn version(&self) -> VersionId {
        self.leaf.version_id
    }
}

/// Reject `[start, end)` unless `start <= end <= len`.
pub fn check_range(start: usize, end: usize, len: usize) -> StoreResult<()> {
    if start > end {
        return Err(StoreError::InvalidRange { start, end });
    }
    if end > len {
        return Err(StoreError::OutOfRange { pos: end, len });
    }
    Ok(())
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("node_count", &self.nodes.len())
            .field("version_count", &self.versions.len())
            .field("max_pieces", &self.max_pieces)
            .finish()
    }
}
