//! Line-level view of a change list.
//!
//! A comparison view draws one bracket per group of changed lines on each
//! side. [`project_lines`] turns byte-level [`Change`] records into those
//! brackets, merging any that touch.

use serde::{Deserialize, Serialize};

use rvt_types::ChangeKind;

use crate::matches::Change;

/// Line-start table for a text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &[u8]) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.iter()
                .enumerate()
                .filter(|&(_, &b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Number of lines. A trailing newline opens an empty last line.
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    pub fn text_len(&self) -> usize {
        self.len
    }

    /// Line containing `pos`. A position right after a newline belongs to
    /// the next line.
    pub fn line_of(&self, pos: usize) -> usize {
        self.starts.partition_point(|&s| s <= pos).saturating_sub(1)
    }

    /// Byte offset where `line` starts; lines past the end start at the end.
    pub fn line_start(&self, line: usize) -> usize {
        self.starts.get(line).copied().unwrap_or(self.len)
    }

    pub fn is_line_start(&self, line: usize, pos: usize) -> bool {
        self.line_start(line) == pos
    }

    /// True at the end of the text or right after a newline.
    pub fn is_line_end(&self, pos: usize) -> bool {
        pos == self.len || (pos > 0 && self.starts.binary_search(&pos).is_ok())
    }
}

/// A bracket pairing changed lines on the left with lines on the right.
///
/// Line ranges are half-open. An empty range marks the gap between two lines
/// where text was removed from (or never existed on) that side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    pub left_start: usize,
    pub left_end: usize,
    pub right_start: usize,
    pub right_end: usize,
    /// `Deletion` when the left side lost text in this bracket.
    pub left_kind: ChangeKind,
    /// `Insertion` when the right side gained text in this bracket.
    pub right_kind: ChangeKind,
}

impl LineMatch {
    fn overlaps(&self, other: &LineMatch) -> bool {
        other.left_start <= self.left_end && other.right_start <= self.right_end
    }

    fn absorb(&mut self, other: LineMatch) {
        self.left_end = self.left_end.max(other.left_end);
        self.right_end = self.right_end.max(other.right_end);
        if other.left_kind == ChangeKind::Deletion {
            self.left_kind = ChangeKind::Deletion;
        }
        if other.right_kind == ChangeKind::Insertion {
            self.right_kind = ChangeKind::Insertion;
        }
    }
}

/// Project a change list (left = side 1, right = side 2) onto line brackets.
pub fn project_lines(changes: &[Change], left: &LineIndex, right: &LineIndex) -> Vec<LineMatch> {
    let mut out: Vec<LineMatch> = Vec::with_capacity(changes.len());
    for change in changes {
        // (changed side, other side) line ranges.
        let (this, other) = match change.kind {
            ChangeKind::Deletion => (left, right),
            ChangeKind::Insertion => (right, left),
            ChangeKind::VersionChange => continue,
        };

        let this_start = this.line_of(change.start);
        let mut this_end = this.line_of(change.end);
        if !this.is_line_start(this_end, change.end) {
            this_end += 1;
        }
        let to_line_end = this.is_line_end(change.end);
        let other_start = other.line_of(change.rev_pos);
        let other_end = if to_line_end && other.is_line_start(other_start, change.rev_pos) {
            other_start
        } else {
            other_start + 1
        };

        let bracket = match change.kind {
            ChangeKind::Deletion => LineMatch {
                left_start: this_start,
                left_end: this_end,
                right_start: other_start,
                right_end: other_end,
                left_kind: ChangeKind::Deletion,
                right_kind: ChangeKind::Deletion,
            },
            _ => LineMatch {
                left_start: other_start,
                left_end: other_end,
                right_start: this_start,
                right_end: this_end,
                left_kind: ChangeKind::Insertion,
                right_kind: ChangeKind::Insertion,
            },
        };

        match out.last_mut() {
            Some(last) if last.overlaps(&bracket) => last.absorb(bracket),
            _ => out.push(bracket),
        }
    }
    out
}
