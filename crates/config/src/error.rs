//! Config Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Every configuration error is fatal at startup.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested config file doesn't exist.
    #[display("config file not found: {}", _0.display())]
    MissingFile(#[error(not(source))] PathBuf),
    /// A provider failed, or the merged values don't fit the schema.
    #[display("unable to read configuration")]
    Parse,
    #[display("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ErrorKind {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}
