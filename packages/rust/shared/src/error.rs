//! Error types for pomwatch.
//!
//! Library crates use [`PomwatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pomwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum PomwatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the catalog or the repository host.
    #[error("network error: {0}")]
    Network(String),

    /// API rate limit exhausted on the repository host.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Rejected or missing API credentials.
    #[error("bad credentials: {0}")]
    BadCredentials(String),

    /// Repository, file, or stored object that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// YAML, archive, or date parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Build-tool invocation error (spawn, stream, or output capture).
    #[error("expansion error: {0}")]
    Expansion(String),

    /// Object store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed repository identifier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PomwatchError>;

impl PomwatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
