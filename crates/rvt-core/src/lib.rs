//! Revtext workspace facade.
//!
//! Ties the node store, revision graph, diff engine and change notifier
//! together behind one lock. This is the main entry point for applications
//! embedding Revtext.
//!
//! # Key Types
//!
//! - [`Workspace`] -- drafts, edits, queries and persistence
//! - [`Repository`] -- the read-only view handed out under a read guard
//! - [`DiffView`] -- a comparison kept current as its draft sides are edited
//! - [`EngineConfig`] -- TOML-loadable tuning knobs

pub mod config;
pub mod error;
pub mod view;
pub mod workspace;

pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};
pub use view::{DiffView, RediffRequest, RediffResult, SyncReport};
pub use workspace::{Comparison, Repository, TextSource, Workspace};

// Re-export key types
pub use rvt_diff::{Change, DiffEntry, LineMatch, Match, MatchList, Side};
pub use rvt_events::{ChangeEvent, ChangeFilter, ChangeStream};
pub use rvt_store::{InMemoryRowStore, PropertyValue, RowStore};
pub use rvt_types::{ChangeKind, DocId, Interval};
