//! Match-list diffing for Revtext.
//!
//! Two texts are compared by listing the byte spans they share. Everything
//! else (change records, line brackets, scroll mapping, selective history)
//! is derived from that list.
//!
//! # Key Types
//!
//! - [`DiffEngine`] -- block-hash diff producing a [`MatchList`]
//! - [`MatchList`] -- ordered, non-overlapping [`Match`] spans
//! - [`MatchMaintainer`] -- keeps a match list current while either side is edited
//! - [`partial_diff`] -- history of a range across ancestor revisions
//! - [`project_lines`] -- change list to line brackets
//!
//! # Invariants
//!
//! For consecutive matches `a`, `b`: `a.end1() <= b.start1()` and
//! `a.end2() <= b.start2()`. Matched spans are byte-identical on both sides.

pub mod engine;
pub mod error;
pub mod incremental;
pub mod matches;
pub mod partial;
pub mod projection;

pub use engine::{DiffConfig, DiffEngine, DiffOutcome, DiffStats};
pub use error::{DiffError, DiffResult};
pub use incremental::{ApplyOutcome, MatchMaintainer};
pub use matches::{Change, Match, MatchList, Side};
pub use partial::{map_range, partial_diff, AncestorDiffs, DiffEntry, RangeMapping};
pub use projection::{project_lines, LineIndex, LineMatch};
