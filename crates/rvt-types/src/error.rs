use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid revision id: {0}")]
    InvalidDocId(String),
}
