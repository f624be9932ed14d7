use thiserror::Error;

/// A convenience `Result` alias using [`EnsembleError`].
pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// Top-level error type for the Ensemble engine.
///
/// Each variant corresponds to a subsystem that can produce errors. Only
/// [`EnsembleError::Config`] is ever surfaced to callers of task submission;
/// the others are recovered locally and turned into outcome metadata.
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// A backing provider call failed.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An outbound HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An external call exceeded its deadline.
    #[error("Timeout after {0} ms")]
    Timeout(u64),

    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// No agent could be selected for a task.
    #[error("Routing error: {0}")]
    Routing(String),

    /// A collaboration protocol could not produce a result.
    #[error("Collaboration error: {0}")]
    Collaboration(String),

    /// The response cache rejected or lost an entry.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Snapshot persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnsembleError {
    /// Whether this error was caused by a timeout rather than a provider failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EnsembleError::Timeout(_))
    }
}
