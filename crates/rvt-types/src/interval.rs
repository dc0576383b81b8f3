use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Half-open byte range `[start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    /// Create an interval. `start` must not exceed `end`.
    pub fn new(start: usize, end: usize) -> Result<Self, TypeError> {
        if start > end {
            return Err(TypeError::InvalidInterval(format!("{start}..{end}")));
        }
        Ok(Self { start, end })
    }

    /// An empty interval positioned at `pos`.
    pub const fn point(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns `true` if the two intervals share at least one byte.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for Interval {
    fn from(r: Range<usize>) -> Self {
        Self {
            start: r.start,
            end: r.end.max(r.start),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for Interval {
    type Err = TypeError;

    /// Parses `START..END`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once("..")
            .ok_or_else(|| TypeError::InvalidInterval(s.to_string()))?;
        let start = start
            .trim()
            .parse()
            .map_err(|_| TypeError::InvalidInterval(s.to_string()))?;
        let end = end
            .trim()
            .parse()
            .map_err(|_| TypeError::InvalidInterval(s.to_string()))?;
        Self::new(start, end)
    }
}
