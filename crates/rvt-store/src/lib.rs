//! Copy-on-write text storage for Revtext.
//!
//! Every revision's text lives in one append-only arena of nodes. An edit
//! never rewrites existing nodes: it layers a small subtree over the previous
//! head, and untouched spans stay `Part` references into older nodes. Two
//! adjacent revisions therefore share everything the edit did not touch.
//!
//! # Node Kinds
//!
//! - `Branch` -- ordered children with cumulative end offsets
//! - `Data` -- a leaf holding text, a property list, a boolean, or a number
//! - `Part` -- a window into another node's text
//!
//! # Collaborators
//!
//! - [`NodeStore`] -- the arena, version slots, editing, and navigation
//! - [`RowStore`] -- opaque persistent key-value rows for committed state
//! - [`InMemoryRowStore`] -- `HashMap`-based row store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Nodes are immutable once pushed.
//! 2. A frozen version slot rejects new nodes.
//! 3. A reference that does not resolve is corrupt history: logged and
//!    propagated, never retried.
//! 4. Only `char_pos` clamps out-of-range input; every other operation
//!    rejects it.

pub mod chars;
pub mod error;
pub mod node;
pub mod properties;
pub mod rows;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use node::{DataValue, Node, NodeEntry, Piece};
pub use properties::PropertyValue;
pub use rows::{InMemoryRowStore, RowStore};
pub use store::{check_range, NodeInfo, NodeStore, DEFAULT_MAX_PIECES};
