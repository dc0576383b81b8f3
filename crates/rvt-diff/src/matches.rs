//! Matches, match lists, and the change records derived from them.
//!
//! A [`MatchList`] is ordered and non-overlapping in both dimensions: for
//! every pair of neighbours, `m[i].end1 <= m[i+1].start1` and
//! `m[i].end2 <= m[i+1].start2`. Every match has a non-zero length.

use std::fmt;

use serde::{Deserialize, Serialize};

use rvt_types::ChangeKind;

use crate::error::{DiffError, DiffResult};

/// One of the two compared texts. `Left` is side 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// A span byte-identical between side 1 at `offset1` and side 2 at
/// `offset2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    pub offset1: usize,
    pub offset2: usize,
    pub len: usize,
}

impl Match {
    pub const fn new(offset1: usize, offset2: usize, len: usize) -> Self {
        Self {
            offset1,
            offset2,
            len,
        }
    }

    /// Build a match given this side's offset and the other side's offset.
    pub fn on_side(side: Side, this: usize, other: usize, len: usize) -> Self {
        match side {
            Side::Left => Self::new(this, other, len),
            Side::Right => Self::new(other, this, len),
        }
    }

    pub fn start1(&self) -> usize {
        self.offset1
    }

    pub fn end1(&self) -> usize {
        self.offset1 + self.len
    }

    pub fn start2(&self) -> usize {
        self.offset2
    }

    pub fn end2(&self) -> usize {
        self.offset2 + self.len
    }

    pub fn start(&self, side: Side) -> usize {
        match side {
            Side::Left => self.offset1,
            Side::Right => self.offset2,
        }
    }

    pub fn end(&self, side: Side) -> usize {
        self.start(side) + self.len
    }

    pub fn offset_mut(&mut self, side: Side) -> &mut usize {
        match side {
            Side::Left => &mut self.offset1,
            Side::Right => &mut self.offset2,
        }
    }

    /// Grow by one byte at the front. Both offsets must be non-zero.
    pub fn extend_up(&mut self) {
        self.offset1 -= 1;
        self.offset2 -= 1;
        self.len += 1;
    }

    /// Grow by one byte at the back.
    pub fn extend_down(&mut self) {
        self.len += 1;
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.offset2, self.offset1, self.len)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.offset1, self.offset2, self.len)
    }
}

/// An insertion or deletion derived from the gap between two matches.
///
/// A deletion covers `[start, end)` on side 1 and sits at `rev_pos` on
/// side 2. An insertion covers `[start, end)` on side 2 and sits at
/// `rev_pos` on side 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub start: usize,
    pub end: usize,
    pub rev_pos: usize,
}

impl Change {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Ordered, non-overlapping list of matches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchList {
    matches: Vec<Match>,
}

impl MatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `matches`, rejecting lists that break the ordering invariant.
    pub fn from_vec(matches: Vec<Match>) -> DiffResult<Self> {
        let list = Self { matches };
        list.check_invariants()?;
        Ok(list)
    }

    /// The match list of a text compared with itself.
    pub fn full(len: usize) -> Self {
        if len == 0 {
            return Self::new();
        }
        Self {
            matches: vec![Match::new(0, 0, len)],
        }
    }

    pub(crate) fn from_sorted(matches: Vec<Match>) -> Self {
        debug_assert!(Self { matches: matches.clone() }.check_invariants().is_ok());
        Self { matches }
    }

    pub(crate) fn as_mut_vec(&mut self) -> &mut Vec<Match> {
        &mut self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn as_slice(&self) -> &[Match] {
        &self.matches
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.matches.iter()
    }

    pub fn first(&self) -> Option<&Match> {
        self.matches.first()
    }

    pub fn last(&self) -> Option<&Match> {
        self.matches.last()
    }

    pub fn into_vec(self) -> Vec<Match> {
        self.matches
    }

    /// Total matched bytes.
    pub fn matched_len(&self) -> usize {
        self.matches.iter().map(|m| m.len).sum()
    }

    /// Check ordering and non-zero lengths.
    pub fn check_invariants(&self) -> DiffResult<()> {
        for (i, m) in self.matches.iter().enumerate() {
            if m.len == 0 {
                return Err(DiffError::InvalidMatchList(format!("match {i} is empty")));
            }
        }
        for (i, pair) in self.matches.windows(2).enumerate() {
            if pair[0].end1() > pair[1].start1() || pair[0].end2() > pair[1].start2() {
                return Err(DiffError::InvalidMatchList(format!(
                    "match {} {} overlaps match {} {}",
                    i,
                    pair[0],
                    i + 1,
                    pair[1]
                )));
            }
        }
        Ok(())
    }

    /// Check that every match's bytes agree between `text1` and `text2`.
    pub fn verify(&self, text1: &[u8], text2: &[u8]) -> DiffResult<()> {
        self.check_invariants()?;
        for m in &self.matches {
            if m.end1() > text1.len() || m.end2() > text2.len() {
                return Err(DiffError::InvalidMatchList(format!("match {m} exceeds text")));
            }
            if text1[m.start1()..m.end1()] != text2[m.start2()..m.end2()] {
                return Err(DiffError::InvalidMatchList(format!("match {m} differs")));
            }
        }
        Ok(())
    }

    /// Insertions and deletions between consecutive matches, including the
    /// trailing gap up to `len1` / `len2`.
    pub fn changes(&self, len1: usize, len2: usize) -> Vec<Change> {
        let mut changes = Vec::with_capacity(self.matches.len() + 2);
        let mut pos1 = 0;
        let mut pos2 = 0;
        let bounds = self
            .matches
            .iter()
            .map(|m| (m.start1(), m.start2(), m.end1(), m.end2()))
            .chain(std::iter::once((len1, len2, len1, len2)));
        for (start1, start2, end1, end2) in bounds {
            if pos1 < start1 {
                changes.push(Change {
                    kind: ChangeKind::Deletion,
                    start: pos1,
                    end: start1,
                    rev_pos: pos2,
                });
            }
            if pos2 < start2 {
                changes.push(Change {
                    kind: ChangeKind::Insertion,
                    start: pos2,
                    end: start2,
                    rev_pos: pos1,
                });
            }
            pos1 = end1;
            pos2 = end2;
        }
        changes
    }

    /// Exchange the two dimensions.
    pub fn swap_sides(&mut self) {
        for m in &mut self.matches {
            *m = m.swapped();
        }
    }

    /// Map `pos` on `side` to the corresponding position on the other side.
    ///
    /// Inside a match the offset is carried over. In a gap the result is the
    /// start of the next match; past the last match it is the end of the
    /// last match.
    pub fn map_position(&self, side: Side, pos: usize) -> usize {
        let other = side.other();
        let i = self.matches.partition_point(|m| m.end(side) <= pos);
        match self.matches.get(i) {
            Some(m) if m.start(side) <= pos => m.start(other) + (pos - m.start(side)),
            Some(m) => m.start(other),
            None => self.matches.last().map_or(0, |m| m.end(other)),
        }
    }
}

impl<'a> IntoIterator for &'a MatchList {
    type Item = &'a Match;
    type IntoIter = std::slice::Iter<'a, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}
