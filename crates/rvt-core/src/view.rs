//! Comparison views.
//!
//! A [`DiffView`] owns the match list between two revisions and keeps it in
//! step with edits to whichever side is a live draft. Derived data (change
//! records, line brackets) is rebuilt lazily after the list changes.

use tracing::{debug, info};

use rvt_diff::{
    project_lines, ApplyOutcome, Change, DiffEngine, DiffOutcome, LineIndex, LineMatch,
    MatchList, MatchMaintainer, Side,
};
use rvt_events::{drain, ChangeFilter, ChangeStream};
use rvt_types::DocId;

use crate::error::CoreResult;
use crate::workspace::{Repository, Workspace};

struct ViewSide {
    rev: DocId,
    /// Set when this side follows a draft's live edit point.
    draft: Option<u32>,
    stream: Option<ChangeStream>,
}

/// What one [`DiffView::sync`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub ignored: usize,
    /// The list was recomputed after a version change.
    pub rediffed: bool,
}

/// Texts captured for a diff run off the editing thread.
#[derive(Clone, Debug)]
pub struct RediffRequest {
    ticket: u64,
    left: Vec<u8>,
    right: Vec<u8>,
    engine: DiffEngine,
}

impl RediffRequest {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn run(self) -> RediffResult {
        let outcome = self.engine.diff(&self.left, &self.right);
        RediffResult {
            ticket: self.ticket,
            outcome,
            len1: self.left.len(),
            len2: self.right.len(),
        }
    }
}

/// A finished off-thread diff, ready for [`DiffView::install`].
#[derive(Clone, Debug)]
pub struct RediffResult {
    ticket: u64,
    outcome: DiffOutcome,
    len1: usize,
    len2: usize,
}

impl RediffResult {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// A live comparison between two revisions.
pub struct DiffView {
    sides: [ViewSide; 2],
    maintainer: MatchMaintainer,
    degenerate: bool,
    changes: Option<Vec<Change>>,
    lines: Option<Vec<LineMatch>>,
    ticket: u64,
    pending: Option<u64>,
}

impl DiffView {
    /// Open a view of `left` against `right`.
    ///
    /// Subscriptions are taken under the same read guard as the initial
    /// diff, so every later edit arrives as an event.
    pub fn open(ws: &Workspace, left: DocId, right: DocId) -> CoreResult<Self> {
        let repo = ws.read();
        let sides = [
            open_side(ws, &repo, left)?,
            open_side(ws, &repo, right)?,
        ];
        let outcome = repo.diff(ws.engine(), left, right)?;
        let (len1, len2) = (repo.version_length(left)?, repo.version_length(right)?);
        drop(repo);

        info!(
            left = %left,
            right = %right,
            matches = outcome.matches.len(),
            degenerate = outcome.degenerate,
            "comparison view opened"
        );
        Ok(Self {
            sides,
            maintainer: MatchMaintainer::new(outcome.matches, len1, len2),
            degenerate: outcome.degenerate,
            changes: None,
            lines: None,
            ticket: 0,
            pending: None,
        })
    }

    pub fn left(&self) -> DocId {
        self.sides[0].rev
    }

    pub fn right(&self) -> DocId {
        self.sides[1].rev
    }

    pub fn matches(&self) -> &MatchList {
        self.maintainer.matches()
    }

    pub fn length(&self, side: Side) -> usize {
        self.maintainer.length(side)
    }

    /// `true` when the last full diff gave up and the view shows a full
    /// replace.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// `true` while a [`RediffRequest`] is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Apply queued edit events. A version change recomputes the list.
    ///
    /// While a rediff request is outstanding events stay queued; they are
    /// applied on top of the installed result. A request whose result will
    /// never arrive must be withdrawn with [`DiffView::cancel_rediff`].
    pub fn sync(&mut self, ws: &Workspace) -> CoreResult<SyncReport> {
        let mut report = SyncReport::default();
        if self.pending.is_some() {
            return Ok(report);
        }

        let repo = ws.read();
        for (i, side) in [Side::Left, Side::Right].into_iter().enumerate() {
            let events = match self.sides[i].stream.as_mut() {
                Some(stream) => drain(stream),
                None => continue,
            };
            for event in events {
                match self.maintainer.apply(side, event.kind, event.pos, event.len) {
                    ApplyOutcome::Applied => report.applied += 1,
                    ApplyOutcome::Ignored => report.ignored += 1,
                    ApplyOutcome::NeedsRediff => report.rediffed = true,
                }
            }
            if let Some(draft) = self.sides[i].draft {
                self.sides[i].rev = repo.graph().draft_head(draft)?;
            }
        }

        if report.applied > 0 || report.ignored > 0 {
            self.invalidate();
        }
        if self.maintainer.is_stale() {
            self.rediff_locked(&repo, ws.engine())?;
            report.rediffed = true;
        }
        debug!(
            applied = report.applied,
            ignored = report.ignored,
            rediffed = report.rediffed,
            "comparison view synced"
        );
        Ok(report)
    }

    fn rediff_locked(&mut self, repo: &Repository, engine: &DiffEngine) -> CoreResult<()> {
        let (left, right) = (self.left(), self.right());
        let outcome = repo.diff(engine, left, right)?;
        let (len1, len2) = (repo.version_length(left)?, repo.version_length(right)?);
        info!(left = %left, right = %right, matches = outcome.matches.len(), "comparison recomputed");
        self.degenerate = outcome.degenerate;
        self.maintainer.reset(outcome.matches, len1, len2);
        self.invalidate();
        Ok(())
    }

    /// Capture both texts for a diff on another thread. Events queued so far
    /// are already in the captured texts and are discarded. A newer request
    /// supersedes any outstanding one.
    pub fn request_rediff(&mut self, ws: &Workspace) -> CoreResult<RediffRequest> {
        let repo = ws.read();
        self.skip_queued(&repo)?;
        let left = repo.text(self.left())?;
        let right = repo.text(self.right())?;
        drop(repo);

        self.ticket += 1;
        self.pending = Some(self.ticket);
        debug!(ticket = self.ticket, "rediff requested");
        Ok(RediffRequest {
            ticket: self.ticket,
            left,
            right,
            engine: ws.engine().clone(),
        })
    }

    /// Withdraw the outstanding request and recompute in place. Returns
    /// `false` when nothing was pending. A result for the withdrawn ticket is
    /// discarded by [`DiffView::install`].
    pub fn cancel_rediff(&mut self, ws: &Workspace) -> CoreResult<bool> {
        let ticket = match self.pending.take() {
            Some(ticket) => ticket,
            None => return Ok(false),
        };
        let repo = ws.read();
        self.skip_queued(&repo)?;
        self.rediff_locked(&repo, ws.engine())?;
        debug!(ticket, "rediff cancelled");
        Ok(true)
    }

    /// Drop queued events and move draft sides to their current heads. Only
    /// valid when the list is about to be replaced.
    fn skip_queued(&mut self, repo: &Repository) -> CoreResult<()> {
        for side in &mut self.sides {
            if let Some(stream) = side.stream.as_mut() {
                drain(stream);
            }
            if let Some(draft) = side.draft {
                side.rev = repo.graph().draft_head(draft)?;
            }
        }
        Ok(())
    }

    /// Install a finished rediff. Returns `false` and discards the result
    /// when a newer request has been made since.
    pub fn install(&mut self, result: RediffResult) -> bool {
        if self.pending != Some(result.ticket) {
            debug!(ticket = result.ticket, current = self.ticket, "discarded stale rediff");
            return false;
        }
        self.pending = None;
        self.degenerate = result.outcome.degenerate;
        self.maintainer
            .reset(result.outcome.matches, result.len1, result.len2);
        self.invalidate();
        debug!(ticket = result.ticket, "rediff installed");
        true
    }

    /// Change records, rebuilt if the list changed since the last call.
    pub fn changes(&mut self) -> &[Change] {
        let maintainer = &self.maintainer;
        self.changes.get_or_insert_with(|| {
            maintainer.matches().changes(
                maintainer.length(Side::Left),
                maintainer.length(Side::Right),
            )
        })
    }

    /// Line brackets for the current texts. Call after [`DiffView::sync`]
    /// so the texts and the list agree.
    pub fn line_matches(&mut self, ws: &Workspace) -> CoreResult<&[LineMatch]> {
        if self.lines.is_none() {
            let repo = ws.read();
            let left = LineIndex::new(&repo.text(self.left())?);
            let right = LineIndex::new(&repo.text(self.right())?);
            drop(repo);
            let lines = project_lines(self.changes(), &left, &right);
            self.lines = Some(lines);
        }
        Ok(self.lines.as_deref().unwrap_or(&[]))
    }

    /// Exchange left and right.
    pub fn swap(&mut self) {
        self.maintainer.swap_sides();
        self.sides.swap(0, 1);
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.changes = None;
        self.lines = None;
    }
}

impl Drop for DiffView {
    fn drop(&mut self) {
        debug!(left = %self.left(), right = %self.right(), "comparison view closed");
    }
}

impl std::fmt::Debug for DiffView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffView")
            .field("left", &self.left())
            .field("right", &self.right())
            .field("matches", &self.matches().len())
            .field("degenerate", &self.degenerate)
            .field("pending", &self.pending)
            .finish()
    }
}

/// A side follows edits when it is the live head of an uncommitted draft.
fn open_side(ws: &Workspace, repo: &Repository, rev: DocId) -> CoreResult<ViewSide> {
    let graph = repo.graph();
    graph.revision(rev)?;
    let live = rev.is_draft()
        && graph.draft_commit(rev.document)?.is_none()
        && graph.draft_head(rev.document)? == rev;
    if !live {
        return Ok(ViewSide {
            rev,
            draft: None,
            stream: None,
        });
    }
    Ok(ViewSide {
        rev,
        draft: Some(rev.document),
        stream: Some(ws.subscribe(ChangeFilter::draft(rev.document))?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use rvt_types::ChangeKind;

    const BASE: &str = "fn main() {\n    let x = 1;\n    println!(\"{x}\");\n}\n";

    /// A committed document and a draft branched from it.
    fn setup() -> (Workspace, DocId, DocId) {
        let ws = Workspace::default();
        let doc = ws.create_document("ana", "v1", BASE.as_bytes()).unwrap();
        let draft = ws.branch_draft(doc, "ana").unwrap();
        (ws, doc, draft)
    }

    fn assert_consistent(ws: &Workspace, view: &DiffView) {
        let left = ws.text(view.left()).unwrap();
        let right = ws.text(view.right()).unwrap();
        assert_eq!(view.length(Side::Left), left.len());
        assert_eq!(view.length(Side::Right), right.len());
        view.matches().verify(&left, &right).unwrap();
    }

    // -----------------------------------------------------------------------
    // Incremental sync
    // -----------------------------------------------------------------------

    #[test]
    fn identical_sides_open_as_one_match() {
        let (ws, doc, draft) = setup();
        let view = DiffView::open(&ws, doc, draft).unwrap();
        assert_eq!(view.matches().len(), 1);
        assert_eq!(view.matches().matched_len(), BASE.len());
        assert!(!view.is_degenerate());
    }

    #[test]
    fn edits_are_applied_incrementally() {
        let (ws, doc, draft) = setup();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();

        ws.insert(draft.document, 16, b"mut ").unwrap();
        ws.delete(draft.document, 0, 3).unwrap();
        ws.insert(draft.document, 0, b"pub fn").unwrap();

        let report = view.sync(&ws).unwrap();
        assert_eq!(report.applied, 3);
        assert!(!report.rediffed);
        assert_consistent(&ws, &view);
        assert!(view.changes().iter().any(|c| c.kind == ChangeKind::Insertion));
    }

    #[test]
    fn edits_on_unwatched_drafts_are_not_seen() {
        let (ws, doc, draft) = setup();
        let other = ws.create_draft("bo", b"unrelated").unwrap();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();

        ws.insert(other.document, 0, b"x").unwrap();
        let report = view.sync(&ws).unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[test]
    fn editing_a_frozen_side_follows_the_new_version() {
        let (ws, doc, draft) = setup();
        ws.freeze(draft.document).unwrap();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();

        let v1 = ws.insert(draft.document, 0, b"// top\n").unwrap();
        view.sync(&ws).unwrap();
        assert_eq!(view.right(), v1);
        assert_consistent(&ws, &view);
    }

    #[test]
    fn version_change_recomputes() {
        let (ws, doc, draft) = setup();
        ws.insert(draft.document, 0, b"// v0\n").unwrap();
        ws.new_version(draft.document).unwrap();
        ws.insert(draft.document, 0, b"// v1\n").unwrap();
        let mut view = DiffView::open(&ws, doc, ws.draft_head(draft.document).unwrap()).unwrap();

        ws.set_draft_head(draft.document, 0).unwrap();
        // Edits after the version change arrive on a stale list.
        ws.insert(draft.document, 0, b"!").unwrap();

        let report = view.sync(&ws).unwrap();
        assert!(report.rediffed);
        assert_eq!(report.ignored, 1);
        assert_eq!(view.right(), ws.draft_head(draft.document).unwrap());
        assert_consistent(&ws, &view);
    }

    #[test]
    fn frozen_sides_do_not_follow_edits() {
        let (ws, doc, draft) = setup();
        let v0 = ws.freeze(draft.document).unwrap();
        ws.insert(draft.document, 0, b"x").unwrap();
        // v0 is no longer the draft head.
        let mut view = DiffView::open(&ws, doc, v0).unwrap();
        ws.insert(draft.document, 0, b"y").unwrap();
        assert_eq!(view.sync(&ws).unwrap(), SyncReport::default());
        assert_eq!(view.right(), v0);
    }

    #[test]
    fn both_sides_on_the_same_draft() {
        let ws = Workspace::default();
        let d = ws.create_draft("ana", b"shared line\n").unwrap();
        let mut view = DiffView::open(&ws, d, d).unwrap();

        ws.insert(d.document, 6, b"new ").unwrap();
        let report = view.sync(&ws).unwrap();
        assert_eq!(report.applied, 2);
        assert_consistent(&ws, &view);
    }

    // -----------------------------------------------------------------------
    // Background rediff
    // -----------------------------------------------------------------------

    #[test]
    fn last_request_wins() {
        let (ws, doc, draft) = setup();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();
        ws.insert(draft.document, 0, b"// a\n").unwrap();

        let first = view.request_rediff(&ws).unwrap();
        let second = view.request_rediff(&ws).unwrap();
        assert!(second.ticket() > first.ticket());

        let (first, second) = std::thread::scope(|s| {
            let a = s.spawn(|| first.run());
            let b = s.spawn(|| second.run());
            (a.join().unwrap(), b.join().unwrap())
        });
        assert!(!view.install(first));
        assert!(view.is_pending());
        assert!(view.install(second));
        assert!(!view.is_pending());
        assert_consistent(&ws, &view);
    }

    #[test]
    fn edits_during_rediff_apply_after_install() {
        let (ws, doc, draft) = setup();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();
        let request = view.request_rediff(&ws).unwrap();

        ws.insert(draft.document, 3, b"XYZ").unwrap();
        assert_eq!(view.sync(&ws).unwrap(), SyncReport::default());

        assert!(view.install(request.run()));
        let report = view.sync(&ws).unwrap();
        assert_eq!(report.applied, 1);
        assert_consistent(&ws, &view);
    }

    #[test]
    fn cancelled_rediff_unblocks_sync() {
        let (ws, doc, draft) = setup();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();
        assert!(!view.cancel_rediff(&ws).unwrap());

        let request = view.request_rediff(&ws).unwrap();
        ws.insert(draft.document, 3, b"XYZ").unwrap();
        // The worker never reports back.
        let late = request.run();

        assert!(view.cancel_rediff(&ws).unwrap());
        assert!(!view.is_pending());
        assert_consistent(&ws, &view);
        assert!(!view.install(late));

        ws.delete(draft.document, 0, 2).unwrap();
        let report = view.sync(&ws).unwrap();
        assert_eq!(report.applied, 1);
        assert_consistent(&ws, &view);
    }

    // -----------------------------------------------------------------------
    // Derived data
    // -----------------------------------------------------------------------

    #[test]
    fn line_matches_track_edits() {
        let (ws, doc, draft) = setup();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();
        assert!(view.line_matches(&ws).unwrap().is_empty());

        // Replace the second line.
        let start = BASE.find("    let").unwrap();
        let end = start + "    let x = 1;\n".len();
        ws.delete(draft.document, start, end).unwrap();
        ws.insert(draft.document, start, b"    let y = 2;\n").unwrap();
        view.sync(&ws).unwrap();

        let lines = view.line_matches(&ws).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].left_start, 1);
        assert_eq!(lines[0].right_start, 1);
    }

    #[test]
    fn swap_exchanges_sides() {
        let (ws, doc, draft) = setup();
        ws.insert(draft.document, 0, b"// header\n").unwrap();
        let mut view = DiffView::open(&ws, doc, draft).unwrap();
        let before = view.changes().to_vec();

        view.swap();
        assert_eq!(view.left(), draft);
        assert_eq!(view.right(), doc);
        assert_consistent(&ws, &view);
        let after = view.changes().to_vec();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].kind, ChangeKind::Insertion);
        assert_eq!(after[0].kind, ChangeKind::Deletion);

        // Edits still land on the draft side, now on the left.
        ws.insert(draft.document, 0, b"!").unwrap();
        view.sync(&ws).unwrap();
        assert_consistent(&ws, &view);
    }

    // -----------------------------------------------------------------------
    // Property tests
    // -----------------------------------------------------------------------

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn random_edits_keep_the_list_valid(
            edits in proptest::collection::vec((any::<bool>(), 0usize..200, 1usize..12), 1..30)
        ) {
            let (ws, doc, draft) = setup();
            let mut view = DiffView::open(&ws, doc, draft).unwrap();
            for (insert, at, n) in edits {
                let len = ws.version_length(ws.draft_head(draft.document).unwrap()).unwrap();
                let pos = at % (len + 1);
                if insert || len == 0 {
                    ws.insert(draft.document, pos, &b"abcdefghijkl"[..n]).unwrap();
                } else {
                    let end = (pos + n).min(len);
                    ws.delete(draft.document, pos, end).unwrap();
                }
            }
            view.sync(&ws).unwrap();
            let left = ws.text(view.left()).unwrap();
            let right = ws.text(view.right()).unwrap();
            prop_assert_eq!(view.length(Side::Right), right.len());
            prop_assert!(view.matches().verify(&left, &right).is_ok());
        }
    }
}
