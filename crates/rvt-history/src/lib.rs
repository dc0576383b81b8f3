//! Revision graph for Revtext.
//!
//! Resolves [`DocId`](rvt_types::DocId) values to stored revisions and keeps
//! the per-document and per-draft parent/child trees. Text itself lives in
//! the node store; a revision only holds the [`NodeRef`](rvt_types::NodeRef)
//! of its text and property roots.
//!
//! # Key Types
//!
//! - [`RevisionGraph`] -- documents, drafts, and ancestry queries
//! - [`Revision`] -- one stored revision
//! - [`NewRevision`] -- content for a revision about to be stored

pub mod error;
pub mod graph;
pub mod revision;

pub use error::{HistoryError, HistoryResult};
pub use graph::RevisionGraph;
pub use revision::{NewRevision, Revision};
