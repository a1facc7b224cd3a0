//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures from the storage, index,
//! cache and render crates are raised into one of the kinds below, so the
//! request layer only has to match on five cases.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Caller Errors
/// - [`ErrorKind::NotFound`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]: the object store failed; often transient.
/// - [`ErrorKind::Index`]
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Processing`]: a derived artifact could not be produced.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("object store request failed")]
    Storage,
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("unable to produce artifact")]
    Processing,
    #[display("metadata index error")]
    Index,
    #[display("artifact cache error")]
    Cache,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Only the kind is consulted here; the error tree underneath carries the
    /// backend-specific detail.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Index | Self::Cache)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Re-classify a storage failure, keeping "not found" distinguishable from
/// transport problems.
pub(crate) fn storage_kind(err: &lumen_storage::error::ErrorKind, what: impl FnOnce() -> String) -> ErrorKind {
    if err.is_not_found() { ErrorKind::NotFound(what()) } else { ErrorKind::Storage }
}
