//! Error types for the revision graph.

use rvt_types::DocId;

/// Errors that can occur during revision graph operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// A revision id does not resolve. History is damaged; never retried.
    #[error("corrupt history: revision {0} does not resolve")]
    CorruptHistory(DocId),

    #[error("unknown draft: {0}")]
    UnknownDraft(u32),

    #[error("unknown document: {0}")]
    UnknownDocument(u32),

    /// The revision is frozen or committed and cannot change.
    #[error("revision {0} is frozen")]
    Frozen(DocId),

    /// The operation only applies to draft revisions.
    #[error("revision {0} is not a draft")]
    NotDraft(DocId),

    /// The draft was committed and accepts no further versions.
    #[error("draft {0} has been committed")]
    DraftCommitted(u32),

    /// A structural check failed.
    #[error("inconsistent revision graph: {0}")]
    Inconsistent(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for revision graph results.
pub type HistoryResult<T> = Result<T, HistoryError>;
