use thiserror::Error;

/// Failure modes of the session engine.
///
/// `NotFound` deliberately covers both "does not exist" and "exists but
/// belongs to another user", so callers cannot probe for foreign resources.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflicting session state: {0}")]
    ConflictingState(&'static str),

    #[error(transparent)]
    Store(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("corrupt json in store: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt timestamp in store: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// True for the two expected, user-facing failures. Everything else is
    /// an infrastructure problem the caller should propagate.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::ConflictingState(_))
    }
}
