//! Selective history of a range.
//!
//! [`partial_diff`] walks from a revision toward its root, re-mapping a range
//! into each parent's coordinates through that step's match list. Steps that
//! changed text inside the range produce a [`DiffEntry`]; steps that left it
//! untouched are skipped. The result is ordered oldest first.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rvt_types::{DocId, Interval};

use crate::error::DiffError;
use crate::matches::{MatchList, Side};

/// One step in the history of a range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub version: DocId,
    /// Index of the previous (older) entry in the returned list.
    pub parent: Option<usize>,
    /// The range in this version's coordinates.
    pub range: Interval,
}

/// Ancestry and per-step diffs, as seen by the history walk.
pub trait AncestorDiffs {
    type Error: From<DiffError>;

    /// Parent of `rev`, or `None` at a root.
    fn parent_of(&self, rev: DocId) -> Result<Option<DocId>, Self::Error>;

    /// Match list with `parent` as side 1 and `child` as side 2.
    fn diff_pair(&self, parent: DocId, child: DocId) -> Result<MatchList, Self::Error>;

    /// Text length of `rev`.
    fn length_of(&self, rev: DocId) -> Result<usize, Self::Error>;
}

/// How a range on side 2 maps onto side 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeMapping {
    /// Every byte is matched by one contiguous run.
    Unchanged(Interval),
    /// Some text inside the range differs; the interval spans the
    /// corresponding region of side 1.
    Changed(Interval),
    /// The range held only text that side 1 never had.
    Unmappable(usize),
}

/// Map `range` on side 2 of `matches` onto side 1, whose length is `len1`.
pub fn map_range(matches: &MatchList, range: Interval, len1: usize) -> RangeMapping {
    let ms = matches.as_slice();
    if range.is_empty() {
        return RangeMapping::Unchanged(Interval::point(matches.map_position(Side::Right, range.start)));
    }

    // Matches overlapping the range on side 2.
    let first = ms.partition_point(|m| m.end2() <= range.start);
    let last = ms.partition_point(|m| m.start2() < range.end);
    let overlapping = &ms[first..last];

    let start = match overlapping.first() {
        Some(m) if m.start2() <= range.start => m.start1() + (range.start - m.start2()),
        _ => {
            if first == 0 {
                0
            } else {
                ms[first - 1].end1()
            }
        }
    };
    let end = match overlapping.last() {
        Some(m) if m.end2() >= range.end => m.start1() + (range.end - m.start2()),
        _ => ms.get(last).map_or(len1, |m| m.start1()),
    };

    let covered = overlapping.first().is_some_and(|m| m.start2() <= range.start)
        && overlapping.last().is_some_and(|m| m.end2() >= range.end)
        && overlapping
            .windows(2)
            .all(|w| w[0].end1() == w[1].start1() && w[0].end2() == w[1].start2());

    if covered {
        RangeMapping::Unchanged(Interval { start, end })
    } else if start >= end {
        RangeMapping::Unmappable(start)
    } else {
        RangeMapping::Changed(Interval { start, end })
    }
}

/// History of `range` in `rev`, oldest entry first.
///
/// The walk stops at the root, emitting its entry, or at the first step
/// where the range held only new text, emitting that child and an empty
/// range in its parent.
pub fn partial_diff<A: AncestorDiffs>(
    source: &A,
    rev: DocId,
    range: Interval,
) -> Result<Vec<DiffEntry>, A::Error> {
    let len = source.length_of(rev)?;
    if range.end > len {
        return Err(DiffError::OutOfRange { end: range.end, len }.into());
    }

    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut current = rev;
    let mut range = range;

    loop {
        if !visited.insert(current) {
            return Err(DiffError::AncestryCycle(current).into());
        }
        let Some(parent) = source.parent_of(current)? else {
            entries.push(DiffEntry { version: current, parent: None, range });
            break;
        };
        let matches = source.diff_pair(parent, current)?;
        let parent_len = source.length_of(parent)?;
        match map_range(&matches, range, parent_len) {
            RangeMapping::Unchanged(mapped) => {
                range = mapped;
            }
            RangeMapping::Changed(mapped) => {
                entries.push(DiffEntry { version: current, parent: None, range });
                range = mapped;
            }
            RangeMapping::Unmappable(at) => {
                entries.push(DiffEntry { version: current, parent: None, range });
                entries.push(DiffEntry {
                    version: parent,
                    parent: None,
                    range: Interval::point(at),
                });
                break;
            }
        }
        current = parent;
    }

    entries.reverse();
    for (i, entry) in entries.iter_mut().enumerate().skip(1) {
        entry.parent = Some(i - 1);
    }
    debug!(revision = %rev, entries = entries.len(), "partial diff complete");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::engine::DiffEngine;
    use crate::matches::Match;

    /// A linear chain of texts: version i's parent is version i-1.
    struct Chain {
        texts: HashMap<DocId, Vec<u8>>,
        parents: HashMap<DocId, DocId>,
    }

    impl Chain {
        fn new(versions: &[&str]) -> Self {
            let mut texts = HashMap::new();
            let mut parents = HashMap::new();
            for (i, text) in versions.iter().enumerate() {
                let id = DocId::draft(0, i as u32);
                texts.insert(id, text.as_bytes().to_vec());
                if i > 0 {
                    parents.insert(id, DocId::draft(0, i as u32 - 1));
                }
            }
            Self { texts, parents }
        }
    }

    impl AncestorDiffs for Chain {
        type Error = DiffError;

        fn parent_of(&self, rev: DocId) -> Result<Option<DocId>, DiffError> {
            Ok(self.parents.get(&rev).copied())
        }

        fn diff_pair(&self, parent: DocId, child: DocId) -> Result<MatchList, DiffError> {
            Ok(DiffEngine::default().diff(&self.texts[&parent], &self.texts[&child]).matches)
        }

        fn length_of(&self, rev: DocId) -> Result<usize, DiffError> {
            Ok(self.texts[&rev].len())
        }
    }

    fn iv(start: usize, end: usize) -> Interval {
        Interval::new(start, end).unwrap()
    }

    fn list(ms: &[(usize, usize, usize)]) -> MatchList {
        MatchList::from_vec(ms.iter().map(|&(a, b, l)| Match::new(a, b, l)).collect()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Range mapping
    // -----------------------------------------------------------------------

    #[test]
    fn covered_range_is_unchanged() {
        let ms = list(&[(0, 0, 10), (15, 12, 10)]);
        assert_eq!(map_range(&ms, iv(13, 20), 25), RangeMapping::Unchanged(iv(16, 23)));
    }

    #[test]
    fn range_over_gap_is_changed() {
        // side 1 has 5 deleted bytes at [10, 15); side 2 has 2 inserted at [10, 12).
        let ms = list(&[(0, 0, 10), (15, 12, 10)]);
        assert_eq!(map_range(&ms, iv(8, 14), 25), RangeMapping::Changed(iv(8, 17)));
    }

    #[test]
    fn pure_insertion_is_unmappable() {
        let ms = list(&[(0, 0, 10), (10, 12, 10)]);
        assert_eq!(map_range(&ms, iv(10, 12), 20), RangeMapping::Unmappable(10));
    }

    #[test]
    fn range_in_trailing_gap_maps_to_parent_tail() {
        let ms = list(&[(0, 0, 10)]);
        assert_eq!(map_range(&ms, iv(9, 14), 13), RangeMapping::Changed(iv(9, 13)));
    }

    #[test]
    fn empty_range_maps_position() {
        let ms = list(&[(0, 3, 10)]);
        assert_eq!(map_range(&ms, iv(5, 5), 10), RangeMapping::Unchanged(iv(2, 2)));
    }

    // -----------------------------------------------------------------------
    // History walk
    // -----------------------------------------------------------------------

    fn long_text() -> String {
        (0..40).map(|i| format!("line {i:02} of the document\n")).collect()
    }

    #[test]
    fn untouched_range_maps_straight_to_root() {
        let v0 = long_text();
        // Three edits, all after byte 200.
        let v1 = format!("{}EDIT ONE{}", &v0[..300], &v0[300..]);
        let v2 = format!("{}{}", &v1[..250], &v1[260..]);
        let v3 = format!("{}more{}", &v2[..500], &v2[500..]);
        let chain = Chain::new(&[&v0, &v1, &v2, &v3]);

        let entries = partial_diff(&chain, DocId::draft(0, 3), iv(100, 140)).unwrap();
        assert_eq!(
            entries,
            vec![DiffEntry { version: DocId::draft(0, 0), parent: None, range: iv(100, 140) }]
        );
    }

    #[test]
    fn edits_inside_range_are_reported_oldest_first() {
        let v0 = long_text();
        let v1 = format!("{}XX{}", &v0[..110], &v0[110..]);
        let v2 = format!("{}{}", &v1[..300], &v1[310..]);
        let chain = Chain::new(&[&v0, &v1, &v2]);

        let entries = partial_diff(&chain, DocId::draft(0, 2), iv(100, 140)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].version, DocId::draft(0, 0));
        assert_eq!(entries[0].parent, None);
        assert_eq!(entries[0].range, iv(100, 138));
        assert_eq!(entries[1].version, DocId::draft(0, 1));
        assert_eq!(entries[1].parent, Some(0));
        assert_eq!(entries[1].range, iv(100, 140));
    }

    #[test]
    fn new_text_stops_the_walk() {
        let v0 = long_text();
        let v1 = format!("{}BRAND NEW TEXT{}", &v0[..200], &v0[200..]);
        let v2 = format!("{}!{}", &v1[..20], &v1[20..]);
        let chain = Chain::new(&[&v0, &v1, &v2]);

        // The inserted text sits at [201, 215) in v2.
        let entries = partial_diff(&chain, DocId::draft(0, 2), iv(201, 215)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].version, DocId::draft(0, 0));
        assert!(entries[0].range.is_empty());
        assert_eq!(entries[0].range.start, 200);
        assert_eq!(entries[1].version, DocId::draft(0, 1));
        assert_eq!(entries[1].range, iv(200, 214));
        assert_eq!(entries[1].parent, Some(0));
    }

    #[test]
    fn root_only_history() {
        let chain = Chain::new(&["just the root"]);
        let entries = partial_diff(&chain, DocId::draft(0, 0), iv(0, 4)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].parent, None);
    }

    #[test]
    fn range_past_end_is_rejected() {
        let chain = Chain::new(&["short"]);
        assert!(matches!(
            partial_diff(&chain, DocId::draft(0, 0), iv(0, 50)),
            Err(DiffError::OutOfRange { end: 50, len: 5 })
        ));
    }
}
