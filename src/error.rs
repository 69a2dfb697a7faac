//! Structured error taxonomy for the engine.
//!
//! Validation failures are surfaced as dedicated variants so callers can
//! react without string matching. Missing concepts/documents are NOT errors —
//! those operations return empty results instead.

use thiserror::Error;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The query reduced to zero informative terms after stop-word removal.
    #[error("query contains no informative terms; add specific keywords (e.g. \"machine learning\")")]
    NoInformativeTerms,

    /// A caller-supplied parameter failed validation. No side effects occurred.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// `start` called while the watcher is already active.
    #[error("watcher already running")]
    WatcherAlreadyRunning,

    /// `stop` called with no active watcher.
    #[error("watcher not running")]
    WatcherNotRunning,

    /// Filesystem watcher backend failure (e.g. an OS watch overflow).
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The embedding provider failed to produce a vector.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// Underlying SQLite failure. The enclosing transaction has been rolled
    /// back; no partial graph state is visible.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Build an `InvalidParameter` error.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
