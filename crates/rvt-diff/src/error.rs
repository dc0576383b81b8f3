use rvt_types::DocId;

/// Errors from diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A match list violates the ordering or content invariants.
    #[error("invalid match list: {0}")]
    InvalidMatchList(String),

    /// A range lies outside the revision text.
    #[error("range end {end} out of range for length {len}")]
    OutOfRange { end: usize, len: usize },

    /// The ancestry walk revisited a revision.
    #[error("ancestry cycle through {0}")]
    AncestryCycle(DocId),
}

/// Result alias for diff operations.
pub type DiffResult<T> = Result<T, DiffError>;
