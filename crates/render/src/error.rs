//! Render Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A render error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for render operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("ffmpeg not detected on your system")]
    FfmpegNotFound,
    /// ffmpeg exited with a non-zero exit code, or was killed by a signal
    /// (reported as `-1`).
    #[display("ffmpeg exited with code: {_0}")]
    FfmpegFailed(#[error(not(source))] i32),
    /// ffmpeg succeeded but produced no frame, even from the start of the clip.
    #[display("no frame could be extracted from the video")]
    NoFrame,
    /// Source bytes are not a decodable image.
    #[display("unable to decode image")]
    Decode,
    #[display("unable to encode image")]
    Encode,
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}
