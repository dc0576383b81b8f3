//! Block-hash diff engine.
//!
//! The engine trims the common prefix and suffix, indexes block-aligned
//! positions of side 2 by a rolling hash, and scans every position of side 1
//! for candidate runs. Each verified hit is extended maximally in both
//! directions. Candidates are then selected greedily: longer matches first,
//! ties broken by earlier side-1 start, each one clipped to fit between the
//! matches already chosen around it. Gaps between selected matches are
//! refined recursively with halved block sizes.
//!
//! Bucket scans are capped and every byte compared counts against a work
//! budget. When the budget or the input cap is exceeded the engine gives up
//! and reports a degenerate result with no matches.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::matches::{Match, MatchList};

const HASH_BASE: u64 = 257;

/// Tuning knobs for the diff engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Initial block size for hashing side 2.
    pub block_size: usize,
    /// Smallest block size used while refining gaps. Clipped candidates
    /// shorter than this are dropped.
    pub min_block_size: usize,
    /// Maximum bucket entries examined per scanned position.
    pub max_bucket_scan: usize,
    /// Maximum bytes compared before the run is abandoned.
    pub max_work: u64,
    /// Maximum combined input size.
    pub max_input: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            block_size: 32,
            min_block_size: 4,
            max_bucket_scan: 16,
            max_work: 64_000_000,
            max_input: 64 * 1024 * 1024,
        }
    }
}

/// Counters from one engine run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub candidates: usize,
    pub work: u64,
    pub prefix: usize,
    pub suffix: usize,
}

/// Result of one engine run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffOutcome {
    pub matches: MatchList,
    /// `true` when a budget was exceeded and `matches` is empty.
    pub degenerate: bool,
    pub stats: DiffStats,
}

struct BudgetExceeded;

/// Computes match lists between two byte strings.
#[derive(Clone, Debug, Default)]
pub struct DiffEngine {
    config: DiffConfig,
}

impl DiffEngine {
    pub fn new(config: DiffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Compute the match list between `text1` (side 1) and `text2` (side 2).
    pub fn diff(&self, text1: &[u8], text2: &[u8]) -> DiffOutcome {
        if text1 == text2 {
            return DiffOutcome {
                matches: MatchList::full(text1.len()),
                degenerate: false,
                stats: DiffStats {
                    prefix: text1.len(),
                    ..DiffStats::default()
                },
            };
        }
        if text1.len() + text2.len() > self.config.max_input {
            debug!(
                len1 = text1.len(),
                len2 = text2.len(),
                max_input = self.config.max_input,
                "diff input exceeds cap"
            );
            return degenerate(DiffStats::default());
        }

        let mut run = Run {
            config: &self.config,
            a: text1,
            b: text2,
            work: 0,
            candidates: 0,
        };

        let prefix = common_prefix(text1, text2);
        let suffix = common_suffix(&text1[prefix..], &text2[prefix..]);
        let hi1 = text1.len() - suffix;
        let hi2 = text2.len() - suffix;

        let mut out = Vec::new();
        if prefix > 0 {
            out.push(Match::new(0, 0, prefix));
        }
        let refined = run.refine(prefix, hi1, prefix, hi2, self.config.block_size.max(1), &mut out);
        let stats = DiffStats {
            candidates: run.candidates,
            work: run.work,
            prefix,
            suffix,
        };
        if refined.is_err() {
            debug!(work = run.work, max_work = self.config.max_work, "diff work budget exceeded");
            return degenerate(stats);
        }
        if suffix > 0 {
            out.push(Match::new(hi1, hi2, suffix));
        }

        debug!(
            len1 = text1.len(),
            len2 = text2.len(),
            matches = out.len(),
            candidates = stats.candidates,
            work = stats.work,
            "diff complete"
        );
        DiffOutcome {
            matches: MatchList::from_sorted(out),
            degenerate: false,
            stats,
        }
    }
}

fn degenerate(stats: DiffStats) -> DiffOutcome {
    DiffOutcome {
        matches: MatchList::new(),
        degenerate: true,
        stats,
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

fn block_hash(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |h, &b| h.wrapping_mul(HASH_BASE).wrapping_add(b as u64))
}

struct Run<'a> {
    config: &'a DiffConfig,
    a: &'a [u8],
    b: &'a [u8],
    work: u64,
    candidates: usize,
}

impl Run<'_> {
    fn charge(&mut self, bytes: usize) -> Result<(), BudgetExceeded> {
        self.work += bytes as u64;
        if self.work > self.config.max_work {
            return Err(BudgetExceeded);
        }
        Ok(())
    }

    /// Append the matches found in `[lo1, hi1) x [lo2, hi2)` to `out`, in
    /// order.
    fn refine(
        &mut self,
        lo1: usize,
        hi1: usize,
        lo2: usize,
        hi2: usize,
        block: usize,
        out: &mut Vec<Match>,
    ) -> Result<(), BudgetExceeded> {
        let min_block = self.config.min_block_size.max(1);
        let mut block = block;
        while block > min_block && (hi1 - lo1 < block || hi2 - lo2 < block) {
            block /= 2;
        }
        if block < min_block || hi1 - lo1 < block || hi2 - lo2 < block {
            return Ok(());
        }

        let selected = self.find_matches(lo1, hi1, lo2, hi2, block)?;
        let next_block = block / 2;

        if selected.is_empty() {
            if next_block >= min_block {
                self.refine(lo1, hi1, lo2, hi2, next_block, out)?;
            }
            return Ok(());
        }

        let (mut g1, mut g2) = (lo1, lo2);
        for m in selected {
            if next_block >= min_block {
                self.refine(g1, m.start1(), g2, m.start2(), next_block, out)?;
            }
            out.push(m);
            g1 = m.end1();
            g2 = m.end2();
        }
        if next_block >= min_block {
            self.refine(g1, hi1, g2, hi2, next_block, out)?;
        }
        Ok(())
    }

    /// Candidate discovery plus greedy selection for one block size.
    fn find_matches(
        &mut self,
        lo1: usize,
        hi1: usize,
        lo2: usize,
        hi2: usize,
        block: usize,
    ) -> Result<Vec<Match>, BudgetExceeded> {
        let (a, b) = (self.a, self.b);

        let mut index: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut pos = lo2;
        while pos + block <= hi2 {
            index.entry(block_hash(&b[pos..pos + block])).or_default().push(pos);
            pos += block;
        }
        self.charge(hi2 - lo2)?;

        // B^(block-1), for removing the outgoing byte.
        let top = (1..block).fold(1u64, |p, _| p.wrapping_mul(HASH_BASE));

        let mut candidates = Vec::new();
        let mut i = lo1;
        let mut hash = block_hash(&a[i..i + block]);
        loop {
            let mut best: Option<Match> = None;
            if let Some(bucket) = index.get(&hash) {
                for &j in bucket.iter().take(self.config.max_bucket_scan) {
                    self.charge(block)?;
                    if a[i..i + block] != b[j..j + block] {
                        continue;
                    }
                    let m = self.extend(Match::new(i, j, block), lo1, hi1, lo2, hi2)?;
                    if best.map_or(true, |cur| m.len > cur.len) {
                        best = Some(m);
                    }
                }
            }

            let next = match best {
                Some(m) => {
                    candidates.push(m);
                    m.end1()
                }
                None => i + 1,
            };
            if next + block > hi1 {
                break;
            }
            if next == i + 1 {
                hash = hash
                    .wrapping_sub((a[i] as u64).wrapping_mul(top))
                    .wrapping_mul(HASH_BASE)
                    .wrapping_add(a[i + block] as u64);
            } else {
                hash = block_hash(&a[next..next + block]);
                self.charge(block)?;
            }
            i = next;
        }
        self.candidates += candidates.len();

        Ok(select(candidates, self.config.min_block_size.max(1)))
    }

    fn extend(
        &mut self,
        mut m: Match,
        lo1: usize,
        hi1: usize,
        lo2: usize,
        hi2: usize,
    ) -> Result<Match, BudgetExceeded> {
        let (a, b) = (self.a, self.b);
        let before = m.len;
        while m.start1() > lo1 && m.start2() > lo2 && a[m.start1() - 1] == b[m.start2() - 1] {
            m.extend_up();
        }
        while m.end1() < hi1 && m.end2() < hi2 && a[m.end1()] == b[m.end2()] {
            m.extend_down();
        }
        self.charge(m.len - before)?;
        Ok(m)
    }
}

/// Greedy longest-first selection.
///
/// Candidates are taken in order of decreasing length, then earlier side-1
/// start, then earlier side-2 start. Each one is clipped to fit between its
/// already-selected neighbours; it is kept if at least `min_len` bytes
/// survive.
fn select(mut candidates: Vec<Match>, min_len: usize) -> Vec<Match> {
    candidates.sort_by_key(|m| (Reverse(m.len), m.start1(), m.start2()));
    candidates.dedup();

    let mut chosen: BTreeMap<usize, Match> = BTreeMap::new();
    for c in candidates {
        let pred = chosen.range(..=c.start1()).next_back().map(|(_, m)| *m);
        let succ = chosen.range(c.start1() + 1..).next().map(|(_, m)| *m);

        let front = pred.map_or(0, |p| {
            p.end1()
                .saturating_sub(c.start1())
                .max(p.end2().saturating_sub(c.start2()))
        });
        let back = succ.map_or(0, |s| {
            c.end1()
                .saturating_sub(s.start1())
                .max(c.end2().saturating_sub(s.start2()))
        });
        if front + back >= c.len || c.len - front - back < min_len {
            continue;
        }
        // A crossing neighbour clips away the whole candidate above.
        let clipped = Match::new(c.start1() + front, c.start2() + front, c.len - front - back);
        chosen.insert(clipped.start1(), clipped);
    }
    chosen.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn diff(a: &str, b: &str) -> DiffOutcome {
        DiffEngine::default().diff(a.as_bytes(), b.as_bytes())
    }

    fn small_blocks() -> DiffEngine {
        DiffEngine::new(DiffConfig {
            block_size: 8,
            min_block_size: 2,
            ..DiffConfig::default()
        })
    }

    // -----------------------------------------------------------------------
    // Special cases
    // -----------------------------------------------------------------------

    #[test]
    fn identical_texts_give_one_full_match() {
        let text = "The quick brown fox jumps over it."; // 34 bytes
        let out = diff(text, text);
        assert_eq!(out.matches.as_slice(), &[Match::new(0, 0, text.len())]);
        assert!(!out.degenerate);
    }

    #[test]
    fn empty_inputs() {
        assert!(diff("", "").matches.is_empty());
        assert!(diff("abc", "").matches.is_empty());
        assert!(diff("", "abc").matches.is_empty());
    }

    #[test]
    fn prefix_and_suffix_only() {
        let out = diff("hello brave world", "hello new world");
        assert_eq!(
            out.matches.as_slice(),
            &[Match::new(0, 0, 6), Match::new(11, 9, 6)]
        );
        assert_eq!(out.stats.prefix, 6);
        assert_eq!(out.stats.suffix, 6);
    }

    #[test]
    fn finds_moved_block_in_middle() {
        let shared = "0123456789abcdefghijklmnopqrstuvwxyz0123456789ABCDEF";
        let a = format!("AAAA{shared}BBBB");
        let b = format!("CCCCCCCC{shared}DD");
        let out = diff(&a, &b);
        assert_eq!(out.matches.as_slice(), &[Match::new(4, 8, shared.len())]);
        out.matches.verify(a.as_bytes(), b.as_bytes()).unwrap();
    }

    #[test]
    fn refinement_finds_small_matches() {
        let a = "xxxxxxxxxxxx-alpha-yyyyyyyyyyyy-beta-zzzzzzzzzzzz";
        let b = "qqqqqqqqqqqq-alpha-wwwwwwwwwwww-beta-vvvvvvvvvvvv";
        let out = small_blocks().diff(a.as_bytes(), b.as_bytes());
        out.matches.verify(a.as_bytes(), b.as_bytes()).unwrap();
        // "-alpha-" and "-beta-" both survive refinement.
        assert!(out.matches.matched_len() >= 13);
    }

    #[test]
    fn budget_exceeded_is_degenerate() {
        let engine = DiffEngine::new(DiffConfig {
            max_work: 10,
            ..DiffConfig::default()
        });
        let a = "a".repeat(200) + "X";
        let b = "Y".to_string() + &"a".repeat(200);
        let out = engine.diff(a.as_bytes(), b.as_bytes());
        assert!(out.degenerate);
        assert!(out.matches.is_empty());
    }

    #[test]
    fn oversized_input_is_degenerate() {
        let engine = DiffEngine::new(DiffConfig {
            max_input: 16,
            ..DiffConfig::default()
        });
        let out = engine.diff(b"0123456789", b"abcdefghij");
        assert!(out.degenerate);
        // Identical input never counts as oversized.
        assert!(!engine.diff(&[b'x'; 40], &[b'x'; 40]).degenerate);
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    #[test]
    fn select_prefers_longest() {
        let picked = select(vec![Match::new(0, 10, 5), Match::new(0, 0, 20)], 2);
        assert_eq!(picked, vec![Match::new(0, 0, 20)]);
    }

    #[test]
    fn select_clips_overlap() {
        // Second candidate overlaps the first by 3 bytes on both sides.
        let picked = select(vec![Match::new(0, 0, 10), Match::new(7, 7, 8)], 2);
        assert_eq!(picked, vec![Match::new(0, 0, 10), Match::new(10, 10, 5)]);
    }

    #[test]
    fn select_drops_crossing() {
        let picked = select(vec![Match::new(0, 20, 10), Match::new(20, 0, 8)], 2);
        assert_eq!(picked, vec![Match::new(0, 20, 10)]);
    }

    #[test]
    fn select_breaks_ties_by_side1_start() {
        let picked = select(vec![Match::new(30, 0, 6), Match::new(0, 30, 6)], 2);
        assert_eq!(picked, vec![Match::new(0, 30, 6)]);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn matches_are_ordered_and_identical(
            a in prop::collection::vec(prop::sample::select(b"abcde\n".to_vec()), 0..400),
            b in prop::collection::vec(prop::sample::select(b"abcde\n".to_vec()), 0..400),
        ) {
            let out = small_blocks().diff(&a, &b);
            prop_assert!(out.matches.verify(&a, &b).is_ok());
        }

        #[test]
        fn diff_is_idempotent(
            a in "[a-f ]{0,300}",
            b in "[a-f ]{0,300}",
        ) {
            let engine = small_blocks();
            let first = engine.diff(a.as_bytes(), b.as_bytes());
            let second = engine.diff(a.as_bytes(), b.as_bytes());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn edited_copy_keeps_most_text(
            base in "[a-z ]{200,400}",
            at in 0usize..200,
            insert in "[A-Z]{1,10}",
        ) {
            let mut edited = base.clone();
            edited.insert_str(at, &insert);
            let out = DiffEngine::default().diff(base.as_bytes(), edited.as_bytes());
            out.matches.verify(base.as_bytes(), edited.as_bytes()).unwrap();
            // Prefix/suffix trimming alone recovers everything but the insert.
            prop_assert_eq!(out.matches.matched_len(), base.len());
        }
    }
}
