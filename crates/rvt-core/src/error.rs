use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] rvt_store::StoreError),

    #[error("history error: {0}")]
    History(#[from] rvt_history::HistoryError),

    #[error("diff error: {0}")]
    Diff(#[from] rvt_diff::DiffError),

    #[error("event error: {0}")]
    Event(#[from] rvt_events::EventError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A saved workspace is missing one of its rows.
    #[error("snapshot row not found: {0}")]
    MissingRow(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
