//! Incremental maintenance of a match list under live edits.
//!
//! [`MatchMaintainer`] owns a correct match list for two texts and keeps it
//! correct while either text is edited, touching only the matches the edit
//! reaches plus a shift of everything after it. A version change invalidates
//! the list; the owner must run the engine again and [`reset`] it.
//!
//! [`reset`]: MatchMaintainer::reset

use tracing::debug;

use rvt_types::ChangeKind;

use crate::matches::{Match, MatchList, Side};

/// What an edit event did to the maintained list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The edit was applied and derived data is stale.
    Applied,
    /// The edit could not affect any match, or the list is invalidated.
    Ignored,
    /// The compared revision was replaced; the list must be recomputed.
    NeedsRediff,
}

/// A match list kept in step with edits to both sides.
#[derive(Clone, Debug)]
pub struct MatchMaintainer {
    matches: MatchList,
    lengths: [usize; 2],
    stale: bool,
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

impl MatchMaintainer {
    /// Start from a freshly computed list for texts of `len1` and `len2`
    /// bytes.
    pub fn new(matches: MatchList, len1: usize, len2: usize) -> Self {
        Self {
            matches,
            lengths: [len1, len2],
            stale: false,
        }
    }

    pub fn matches(&self) -> &MatchList {
        &self.matches
    }

    /// Current text length of `side`.
    pub fn length(&self, side: Side) -> usize {
        self.lengths[side_index(side)]
    }

    /// `true` after a version change, until [`MatchMaintainer::reset`].
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Install a recomputed list.
    pub fn reset(&mut self, matches: MatchList, len1: usize, len2: usize) {
        self.matches = matches;
        self.lengths = [len1, len2];
        self.stale = false;
    }

    /// Exchange left and right.
    pub fn swap_sides(&mut self) {
        self.matches.swap_sides();
        self.lengths.swap(0, 1);
    }

    /// Apply one edit event on `side`.
    pub fn apply(&mut self, side: Side, kind: ChangeKind, pos: usize, len: usize) -> ApplyOutcome {
        if self.stale {
            return ApplyOutcome::Ignored;
        }
        match kind {
            ChangeKind::VersionChange => {
                self.stale = true;
                debug!(side = %side, "match list invalidated by version change");
                return ApplyOutcome::NeedsRediff;
            }
            _ if len == 0 => return ApplyOutcome::Ignored,
            ChangeKind::Insertion => self.lengths[side_index(side)] += len,
            ChangeKind::Deletion => {
                let slot = &mut self.lengths[side_index(side)];
                *slot = slot.saturating_sub(len);
            }
        }

        // Edits at or past the end of the last match touch nothing.
        match self.matches.last() {
            Some(last) if pos < last.end(side) => {}
            _ => return ApplyOutcome::Ignored,
        }

        let list = self.matches.as_mut_vec();
        match kind {
            ChangeKind::Insertion => apply_insertion(list, side, pos, len),
            _ => apply_deletion(list, side, pos, len),
        }
        debug_assert!(self.matches.check_invariants().is_ok());
        ApplyOutcome::Applied
    }
}

fn apply_insertion(list: &mut Vec<Match>, side: Side, pos: usize, len: usize) {
    let other = side.other();
    // First match with pos <= end.
    let mut i = list.partition_point(|m| m.end(side) < pos);
    let m = list[i];

    if m.start(side) < pos && pos < m.end(side) {
        let front = pos - m.start(side);
        let back = Match::on_side(side, pos + len, m.start(other) + front, m.len - front);
        list[i].len = front;
        list.insert(i + 1, back);
        i += 2;
    } else if pos == m.end(side) {
        // Text typed right after a match does not extend it.
        i += 1;
    }

    for m in &mut list[i..] {
        *m.offset_mut(side) += len;
    }
}

fn apply_deletion(list: &mut Vec<Match>, side: Side, pos: usize, len: usize) {
    let other = side.other();
    let del_end = pos + len;
    // First match ending after pos.
    let mut i = list.partition_point(|m| m.end(side) <= pos);

    while i < list.len() {
        let m = list[i];
        let (start, end) = (m.start(side), m.end(side));

        if pos <= start && del_end >= end {
            list.remove(i);
            continue;
        }
        if del_end <= start {
            break;
        }

        if pos <= start {
            // Front of the match deleted.
            let cut = del_end - start;
            *list[i].offset_mut(side) = pos;
            *list[i].offset_mut(other) += cut;
            list[i].len -= cut;
        } else if del_end >= end {
            // Back of the match deleted.
            list[i].len -= end - pos;
        } else {
            // Deletion strictly inside: split.
            let front = pos - start;
            let rest = m.len - front - len;
            list[i].len = front;
            list.insert(i + 1, Match::on_side(side, pos, m.start(other) + front + len, rest));
            i += 2;
            break;
        }
        i += 1;
    }

    for m in &mut list[i..] {
        *m.offset_mut(side) -= len;
    }
}
