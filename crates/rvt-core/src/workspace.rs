use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rvt_diff::{
    partial_diff, AncestorDiffs, Change, DiffEngine, DiffEntry, DiffOutcome, DiffStats, Match,
    MatchList,
};
use rvt_events::{ChangeEvent, ChangeFilter, ChangeNotifier, ChangeStream};
use rvt_history::{HistoryError, NewRevision, Revision, RevisionGraph};
use rvt_store::{check_range, NodeStore, PropertyValue, RowStore, StoreError};
use rvt_types::{DocId, Interval, NodeRef, VersionId};

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};

const NODES_ROW: &str = "revtext/nodes";
const REVISIONS_ROW: &str = "revtext/revisions";

/// Text and property differences between two revisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub text_changed: bool,
    pub properties_changed: bool,
}

/// A run of text in a revision and the revision that typed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSource {
    pub start: usize,
    pub end: usize,
    pub source: DocId,
}

/// Node store plus revision graph. Reached only through the workspace lock.
#[derive(Debug, Default)]
pub struct Repository {
    store: NodeStore,
    graph: RevisionGraph,
}

impl Repository {
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn graph(&self) -> &RevisionGraph {
        &self.graph
    }

    pub fn revision(&self, di: DocId) -> CoreResult<&Revision> {
        Ok(self.graph.revision(di)?)
    }

    fn head(&self, di: DocId) -> CoreResult<NodeRef> {
        Ok(self.graph.revision(di)?.head)
    }

    pub fn text(&self, di: DocId) -> CoreResult<Vec<u8>> {
        Ok(self.store.text(self.head(di)?)?)
    }

    pub fn text_part(&self, di: DocId, start: usize, end: usize) -> CoreResult<Vec<u8>> {
        Ok(self.store.text_part(self.head(di)?, start, end)?)
    }

    /// Step `char_offset` characters from `start`; negative offsets step
    /// backward. Clamped to the text.
    pub fn char_pos(&self, di: DocId, start: usize, char_offset: isize) -> CoreResult<usize> {
        Ok(self.store.char_pos(self.head(di)?, start, char_offset)?)
    }

    pub fn version_length(&self, di: DocId) -> CoreResult<usize> {
        Ok(self.store.length(self.head(di)?)?)
    }

    /// The run around `pos` that one revision typed. Text a later version
    /// kept unchanged is still attributed to the revision that wrote it.
    pub fn node_info(&self, di: DocId, pos: usize) -> CoreResult<TextSource> {
        let info = self.store.node_info(self.head(di)?, pos)?;
        let source = self.graph.owner_of_version(info.version()).ok_or_else(|| {
            HistoryError::Inconsistent(format!("no revision owns version {}", info.version()))
        })?;
        Ok(TextSource { start: info.start, end: info.end, source })
    }

    pub fn text_changed(&self, d1: DocId, d2: DocId) -> CoreResult<bool> {
        let (h1, h2) = (self.head(d1)?, self.head(d2)?);
        if h1 == h2 {
            return Ok(false);
        }
        if self.store.length(h1)? != self.store.length(h2)? {
            return Ok(true);
        }
        Ok(self.store.text(h1)? != self.store.text(h2)?)
    }

    pub fn properties_changed(&self, d1: DocId, d2: DocId) -> CoreResult<bool> {
        let (p1, p2) = (self.graph.revision(d1)?.props, self.graph.revision(d2)?.props);
        if p1 == p2 {
            return Ok(false);
        }
        Ok(self.store.property_map(p1)? != self.store.property_map(p2)?)
    }

    pub fn compare(&self, d1: DocId, d2: DocId) -> CoreResult<Comparison> {
        Ok(Comparison {
            text_changed: self.text_changed(d1, d2)?,
            properties_changed: self.properties_changed(d1, d2)?,
        })
    }

    pub fn properties(&self, di: DocId) -> CoreResult<BTreeMap<String, PropertyValue>> {
        Ok(self.store.property_map(self.graph.revision(di)?.props)?)
    }

    pub fn property(&self, di: DocId, name: &str) -> CoreResult<Option<PropertyValue>> {
        Ok(self.store.get_property(self.graph.revision(di)?.props, name)?)
    }

    /// Match list between two revisions. Identical texts (including a
    /// revision against itself) give one full-length match without running
    /// the engine.
    pub fn diff(&self, engine: &DiffEngine, d1: DocId, d2: DocId) -> CoreResult<DiffOutcome> {
        if !self.text_changed(d1, d2)? {
            let len = self.version_length(d1)?;
            return Ok(DiffOutcome {
                matches: MatchList::full(len),
                degenerate: false,
                stats: DiffStats {
                    prefix: len,
                    ..Default::default()
                },
            });
        }
        let (t1, t2) = (self.text(d1)?, self.text(d2)?);
        let outcome = engine.diff(&t1, &t2);
        if outcome.degenerate {
            warn!(
                left = %d1,
                right = %d2,
                len1 = t1.len(),
                len2 = t2.len(),
                work = outcome.stats.work,
                "diff abandoned, showing full replace"
            );
        }
        Ok(outcome)
    }
}

/// Ancestor walk over a locked repository.
struct History<'a> {
    repo: &'a Repository,
    engine: &'a DiffEngine,
}

impl AncestorDiffs for History<'_> {
    type Error = CoreError;

    fn parent_of(&self, rev: DocId) -> CoreResult<Option<DocId>> {
        Ok(self.repo.revision(rev)?.parent)
    }

    fn diff_pair(&self, parent: DocId, child: DocId) -> CoreResult<MatchList> {
        Ok(self.repo.diff(self.engine, parent, child)?.matches)
    }

    fn length_of(&self, rev: DocId) -> CoreResult<usize> {
        self.repo.version_length(rev)
    }
}

/// The process-wide editing workspace.
///
/// All revision state sits behind one reader/writer lock. Edits publish
/// their change events while the write guard is still held, so a reader that
/// subscribes under a read guard sees each edit exactly once: either in the
/// text it reads or as a queued event.
pub struct Workspace {
    repo: RwLock<Repository>,
    notifier: ChangeNotifier,
    engine: DiffEngine,
    config: EngineConfig,
}

impl Workspace {
    pub fn new(config: EngineConfig) -> Self {
        let repo = Repository {
            store: NodeStore::with_max_pieces(config.max_pieces),
            graph: RevisionGraph::new(),
        };
        Self::with_repository(repo, config)
    }

    fn with_repository(repo: Repository, config: EngineConfig) -> Self {
        Self {
            repo: RwLock::new(repo),
            notifier: ChangeNotifier::new(),
            engine: DiffEngine::new(config.diff.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> CoreResult<ChangeStream> {
        Ok(self.notifier.subscribe(filter)?)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Repository> {
        self.repo.read().expect("repository lock poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Repository> {
        self.repo.write().expect("repository lock poisoned")
    }

    fn publish(&self, event: ChangeEvent) {
        if let Err(e) = self.notifier.notify(event) {
            debug!(%event, error = %e, "change event dropped");
        }
    }

    // ---- Drafts and documents ----

    /// Start a new document whose root revision holds `text`.
    pub fn create_document(&self, author: &str, label: &str, text: &[u8]) -> CoreResult<DocId> {
        let mut repo = self.write();
        let version = repo.store.open_version();
        let head = repo.store.create_text(version, text)?;
        let props = repo.store.create_list(version)?;
        repo.store.freeze(version)?;
        let id = repo
            .graph
            .create_document_root(NewRevision::new(head, props, version, author), label);
        Ok(id)
    }

    /// Start a draft with no origin.
    pub fn create_draft(&self, author: &str, text: &[u8]) -> CoreResult<DocId> {
        let mut repo = self.write();
        let version = repo.store.open_version();
        let head = repo.store.create_text(version, text)?;
        let props = repo.store.create_list(version)?;
        let id = repo
            .graph
            .create_draft(None, NewRevision::new(head, props, version, author))?;
        info!(draft = %id, len = text.len(), "created draft");
        Ok(id)
    }

    /// Start a draft from an existing revision. The draft shares the
    /// origin's text and properties until it is edited.
    pub fn branch_draft(&self, origin: DocId, author: &str) -> CoreResult<DocId> {
        let mut repo = self.write();
        let (head, props) = {
            let rev = repo.graph.revision(origin)?;
            (rev.head, rev.props)
        };
        let version = repo.store.open_version();
        let id = repo
            .graph
            .create_draft(Some(origin), NewRevision::new(head, props, version, author))?;
        info!(draft = %id, origin = %origin, "branched draft");
        Ok(id)
    }

    pub fn draft_head(&self, draft: u32) -> CoreResult<DocId> {
        Ok(self.read().graph.draft_head(draft)?)
    }

    /// Freeze the draft head and continue editing in a fresh version.
    pub fn new_version(&self, draft: u32) -> CoreResult<DocId> {
        let mut repo = self.write();
        let head = repo.graph.draft_head(draft)?;
        freeze_revision(&mut repo, head)?;
        let id = editable(&mut repo, draft)?;
        Ok(id)
    }

    // ---- Editing ----

    /// Insert `text` at `pos` in the draft's live revision.
    pub fn insert(&self, draft: u32, pos: usize, text: &[u8]) -> CoreResult<DocId> {
        let mut repo = self.write();
        self.insert_locked(&mut repo, draft, pos, text)
    }

    /// Remove `[start, end)` from the draft's live revision.
    pub fn delete(&self, draft: u32, start: usize, end: usize) -> CoreResult<DocId> {
        let mut repo = self.write();
        self.delete_locked(&mut repo, draft, start, end)
    }

    /// Move `[start, end)` to `dest`, given in pre-move coordinates. Views
    /// see a deletion followed by an insertion. A destination inside the
    /// range leaves the draft untouched.
    pub fn move_range(
        &self,
        draft: u32,
        start: usize,
        end: usize,
        dest: usize,
    ) -> CoreResult<DocId> {
        let mut repo = self.write();
        let current = repo.graph.draft_head(draft)?;
        let len = repo.version_length(current)?;
        check_range(start, end, len)?;
        if dest > len {
            return Err(StoreError::OutOfRange { pos: dest, len }.into());
        }
        if start == end || (start..=end).contains(&dest) {
            return Ok(current);
        }
        let di = editable(&mut repo, draft)?;
        let (version, head) = version_and_head(&repo, di)?;
        let new_head = repo.store.move_range(version, head, start, end, dest)?;
        self.install_head(&mut repo, di, version, new_head)?;

        let moved = end - start;
        let landing = if dest < start { dest } else { dest - moved };
        self.publish(ChangeEvent::deletion(draft, start, moved));
        self.publish(ChangeEvent::insertion(draft, landing, moved));
        debug!(draft, start, end, dest, "moved text");
        Ok(di)
    }

    /// Replace the draft's text with `text` through the edit script derived
    /// from a diff, so open views update incrementally.
    pub fn apply_text(&self, draft: u32, text: &[u8]) -> CoreResult<DocId> {
        let mut repo = self.write();
        let head = repo.graph.draft_head(draft)?;
        let current = repo.text(head)?;
        if current == text {
            return Ok(head);
        }
        let outcome = self.engine.diff(&current, text);

        let end = Match::new(current.len(), text.len(), 0);
        let mut gaps = Vec::new();
        let (mut p1, mut p2) = (0, 0);
        for m in outcome.matches.iter().chain(std::iter::once(&end)) {
            if p1 < m.start1() || p2 < m.start2() {
                gaps.push((p1..m.start1(), p2..m.start2()));
            }
            p1 = m.end1();
            p2 = m.end2();
        }

        let mut id = head;
        for (removed, added) in gaps.iter().rev() {
            if !removed.is_empty() {
                id = self.delete_locked(&mut repo, draft, removed.start, removed.end)?;
            }
            if !added.is_empty() {
                id = self.insert_locked(&mut repo, draft, removed.start, &text[added.clone()])?;
            }
        }
        debug!(draft, gaps = gaps.len(), len = text.len(), "applied text");
        Ok(id)
    }

    fn insert_locked(
        &self,
        repo: &mut Repository,
        draft: u32,
        pos: usize,
        text: &[u8],
    ) -> CoreResult<DocId> {
        let current = repo.graph.draft_head(draft)?;
        let len = repo.version_length(current)?;
        if pos > len {
            return Err(StoreError::OutOfRange { pos, len }.into());
        }
        if text.is_empty() {
            return Ok(current);
        }
        let di = editable(repo, draft)?;
        let (version, head) = version_and_head(repo, di)?;
        let new_head = repo.store.insert(version, head, pos, text)?;
        self.install_head(repo, di, version, new_head)?;
        self.publish(ChangeEvent::insertion(draft, pos, text.len()));
        Ok(di)
    }

    fn delete_locked(
        &self,
        repo: &mut Repository,
        draft: u32,
        start: usize,
        end: usize,
    ) -> CoreResult<DocId> {
        let current = repo.graph.draft_head(draft)?;
        let len = repo.version_length(current)?;
        check_range(start, end, len)?;
        if start == end {
            return Ok(current);
        }
        let di = editable(repo, draft)?;
        let (version, head) = version_and_head(repo, di)?;
        let new_head = repo.store.delete(version, head, start, end)?;
        self.install_head(repo, di, version, new_head)?;
        self.publish(ChangeEvent::deletion(draft, start, end - start));
        Ok(di)
    }

    fn install_head(
        &self,
        repo: &mut Repository,
        di: DocId,
        version: VersionId,
        head: NodeRef,
    ) -> CoreResult<()> {
        let depth = repo.store.depth(head)?;
        let head = if depth > self.config.consolidate_depth {
            let flat = repo.store.consolidate(version, head)?;
            debug!(revision = %di, depth, "consolidated draft head");
            flat
        } else {
            head
        };
        repo.graph.set_head(di, head)?;
        Ok(())
    }

    /// Freeze the draft's live revision. The next edit starts a new version.
    pub fn freeze(&self, draft: u32) -> CoreResult<DocId> {
        let mut repo = self.write();
        let head = repo.graph.draft_head(draft)?;
        freeze_revision(&mut repo, head)?;
        Ok(head)
    }

    /// Move the draft's live edit point to one of its versions. Views
    /// watching the draft must recompute.
    pub fn set_draft_head(&self, draft: u32, version: u32) -> CoreResult<()> {
        let mut repo = self.write();
        repo.graph.set_draft_head(draft, version)?;
        self.publish(ChangeEvent::version_change(draft));
        Ok(())
    }

    /// Commit the draft's live revision as a document revision.
    pub fn commit(&self, draft: u32, label: &str, description: &str) -> CoreResult<DocId> {
        let mut repo = self.write();
        let head = repo.graph.draft_head(draft)?;
        freeze_revision(&mut repo, head)?;
        Ok(repo.graph.commit(head, label, description, Utc::now())?)
    }

    pub fn set_property(&self, draft: u32, name: &str, value: PropertyValue) -> CoreResult<DocId> {
        let mut repo = self.write();
        let di = editable(&mut repo, draft)?;
        let (version, props) = {
            let rev = repo.graph.revision(di)?;
            (rev.version, rev.props)
        };
        let props = repo.store.set_property(version, props, name, value)?;
        repo.graph.set_properties(di, props)?;
        debug!(revision = %di, name, "set property");
        Ok(di)
    }

    pub fn remove_property(&self, draft: u32, name: &str) -> CoreResult<DocId> {
        let mut repo = self.write();
        let di = editable(&mut repo, draft)?;
        let (version, props) = {
            let rev = repo.graph.revision(di)?;
            (rev.version, rev.props)
        };
        let props = repo.store.remove_property(version, props, name)?;
        repo.graph.set_properties(di, props)?;
        Ok(di)
    }

    // ---- Queries ----

    pub fn text(&self, di: DocId) -> CoreResult<Vec<u8>> {
        self.read().text(di)
    }

    pub fn text_part(&self, di: DocId, start: usize, end: usize) -> CoreResult<Vec<u8>> {
        self.read().text_part(di, start, end)
    }

    pub fn char_pos(&self, di: DocId, start: usize, char_offset: isize) -> CoreResult<usize> {
        self.read().char_pos(di, start, char_offset)
    }

    pub fn version_length(&self, di: DocId) -> CoreResult<usize> {
        self.read().version_length(di)
    }

    pub fn node_info(&self, di: DocId, pos: usize) -> CoreResult<TextSource> {
        self.read().node_info(di, pos)
    }

    pub fn text_changed(&self, d1: DocId, d2: DocId) -> CoreResult<bool> {
        self.read().text_changed(d1, d2)
    }

    pub fn properties_changed(&self, d1: DocId, d2: DocId) -> CoreResult<bool> {
        self.read().properties_changed(d1, d2)
    }

    pub fn compare(&self, d1: DocId, d2: DocId) -> CoreResult<Comparison> {
        self.read().compare(d1, d2)
    }

    pub fn property(&self, di: DocId, name: &str) -> CoreResult<Option<PropertyValue>> {
        self.read().property(di, name)
    }

    pub fn properties(&self, di: DocId) -> CoreResult<BTreeMap<String, PropertyValue>> {
        self.read().properties(di)
    }

    pub fn diff(&self, d1: DocId, d2: DocId) -> CoreResult<DiffOutcome> {
        self.read().diff(&self.engine, d1, d2)
    }

    /// Insertions and deletions turning `d1` into `d2`.
    pub fn changes(&self, d1: DocId, d2: DocId) -> CoreResult<Vec<Change>> {
        let repo = self.read();
        let outcome = repo.diff(&self.engine, d1, d2)?;
        Ok(outcome
            .matches
            .changes(repo.version_length(d1)?, repo.version_length(d2)?))
    }

    /// History of `range` in `di`, oldest entry first.
    pub fn partial_diff(&self, di: DocId, range: Interval) -> CoreResult<Vec<DiffEntry>> {
        let repo = self.read();
        let history = History {
            repo: &*repo,
            engine: &self.engine,
        };
        partial_diff(&history, di, range)
    }

    // ---- Persistence ----

    /// Write the node store and revision graph as two rows.
    pub fn save(&self, rows: &dyn RowStore) -> CoreResult<()> {
        let repo = self.read();
        let nodes = repo.store.to_bytes()?;
        let revisions = repo.graph.to_bytes()?;
        rows.put(NODES_ROW, &nodes)?;
        rows.put(REVISIONS_ROW, &revisions)?;
        info!(
            nodes = repo.store.node_count(),
            revisions = repo.graph.len(),
            bytes = nodes.len() + revisions.len(),
            "saved workspace"
        );
        Ok(())
    }

    /// Load a workspace written by [`Workspace::save`].
    pub fn open(rows: &dyn RowStore, config: EngineConfig) -> CoreResult<Self> {
        let nodes = rows
            .get(NODES_ROW)?
            .ok_or_else(|| CoreError::MissingRow(NODES_ROW.into()))?;
        let revisions = rows
            .get(REVISIONS_ROW)?
            .ok_or_else(|| CoreError::MissingRow(REVISIONS_ROW.into()))?;
        let store = NodeStore::from_bytes(&nodes)?;
        let graph = RevisionGraph::from_bytes(&revisions)?;
        graph.validate()?;
        info!(
            nodes = store.node_count(),
            revisions = graph.len(),
            "opened workspace"
        );
        Ok(Self::with_repository(Repository { store, graph }, config))
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("config", &self.config)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

fn version_and_head(repo: &Repository, di: DocId) -> CoreResult<(VersionId, NodeRef)> {
    let rev = repo.graph.revision(di)?;
    Ok((rev.version, rev.head))
}

fn freeze_revision(repo: &mut Repository, di: DocId) -> CoreResult<()> {
    let version = repo.graph.revision(di)?.version;
    repo.store.freeze(version)?;
    repo.graph.freeze(di)?;
    Ok(())
}

/// The writable revision at a draft's edit point. A frozen head is first
/// continued as a new draft version sharing its text and properties.
fn editable(repo: &mut Repository, draft: u32) -> CoreResult<DocId> {
    if repo.graph.draft_commit(draft)?.is_some() {
        return Err(HistoryError::DraftCommitted(draft).into());
    }
    let head = repo.graph.draft_head(draft)?;
    let rev = repo.graph.revision(head)?;
    if !rev.frozen {
        return Ok(head);
    }
    let (text, props, author) = (rev.head, rev.props, rev.author.clone());
    let version = repo.store.open_version();
    let id = repo.graph.add_draft_version(
        draft,
        head.version,
        NewRevision::new(text, props, version, author),
    )?;
    debug!(revision = %id, parent = %head, "continued frozen draft in new version");
    Ok(id)
}
