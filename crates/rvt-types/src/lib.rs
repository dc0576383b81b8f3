//! Foundation types for Revtext.
//!
//! This crate provides the identifiers and small value types shared by every
//! other Revtext crate: how a revision is named, how a node inside the node
//! store is addressed, and how edits are classified.
//!
//! # Key Types
//!
//! - [`DocId`] -- Identifies one revision of a draft or a committed document
//! - [`NodeRef`] -- Addresses a node within a version's text tree
//! - [`VersionId`] / [`NodeId`] -- Node store version slot and arena index
//! - [`Interval`] -- Half-open byte range `[start, end)`
//! - [`ChangeKind`] -- Insertion, deletion, or wholesale version change
//! - [`RevisionState`] -- Deleted / normal / pending

pub mod change;
pub mod doc;
pub mod error;
pub mod interval;
pub mod node;

pub use change::ChangeKind;
pub use doc::{DocId, DocType, RevisionState};
pub use error::TypeError;
pub use interval::Interval;
pub use node::{NodeId, NodeRef, VersionId};
