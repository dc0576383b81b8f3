/// Errors produced by the change notifier.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The notifier has been closed and accepts no events or subscribers.
    #[error("change notifier is closed")]
    Closed,

    /// A subscription filter that can never match.
    #[error("subscription filter matches no change kinds")]
    EmptyFilter,
}

/// Convenience alias used throughout the events crate.
pub type EventResult<T> = std::result::Result<T, EventError>;
