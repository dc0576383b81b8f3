use rvt_types::{NodeRef, VersionId};

/// Errors from node store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A position or range lies outside the text.
    #[error("position {pos} out of range for length {len}")]
    OutOfRange { pos: usize, len: usize },

    /// A range whose start lies after its end.
    #[error("invalid range {start}..{end}")]
    InvalidRange { start: usize, end: usize },

    /// A node reference does not resolve. History is damaged; never retried.
    #[error("corrupt history: node {0} does not resolve")]
    CorruptHistory(NodeRef),

    /// The version slot has been frozen and rejects new nodes.
    #[error("version {0} is frozen")]
    Frozen(VersionId),

    /// The version slot was never opened.
    #[error("unknown version {0}")]
    UnknownVersion(VersionId),

    /// A text operation reached a non-text data node.
    #[error("node {0} does not hold text")]
    NotText(NodeRef),

    /// A property operation reached a node that is not a property list.
    #[error("node {0} is not a property list")]
    NotList(NodeRef),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
