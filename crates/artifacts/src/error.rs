//! Artifact Cache Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An artifact cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for artifact cache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading or writing the cache directory failed.
    #[display("cache I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    #[display("invalid cache options: {_0}")]
    InvalidOptions(#[error(not(source))] String),
    /// A blocking filesystem task panicked or was cancelled.
    #[display("cache task failed")]
    Task,
    #[display("unknown artifact kind: {_0}")]
    UnknownKind(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Task)
    }
}
