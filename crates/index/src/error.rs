//! Index Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The database was written by a newer build; refuse to touch it.
    #[display("database schema version {_0} is newer than the supported version {_1}")]
    SchemaTooNew(#[error(not(source))] i64, #[error(not(source))] i64),
    #[display("record not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// A value could not be converted between its model and row form.
    #[display("invalid index data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// SQLite busy timeouts surface as [`Database`](Self::Database); every
    /// other kind is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
