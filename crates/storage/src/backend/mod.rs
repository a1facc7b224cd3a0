//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface over the object store holding the media library (S3-compatible
//! services in production, a local directory or an in-memory map otherwise).

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::{S3Backend, S3Options};
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::ops::Range;
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous to efficiently handle network
/// operations and concurrent access. Listing and fetching never mutate the
/// store, so every read method is safe to call repeatedly and concurrently.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use lumen_storage::{backend::StorageBackend, error::Result, EXIF_HEAD_BYTES};
///
/// async fn exif_window(backend: &dyn StorageBackend) -> Result<Vec<u8>> {
///     backend.read_head(Path::new("photos/2023/05/x.jpg"), EXIF_HEAD_BYTES).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// List all objects matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning. Any error aborts the whole listing.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream object metadata matching an optional prefix.
    ///
    /// Pagination (continuation tokens, directory recursion) is handled
    /// internally: the stream ends only once the store reports there is
    /// nothing left.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use lumen_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if an object exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Fetch the complete object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Fetch a byte range of an object.
    ///
    /// A range extending past the end of the object is truncated to the
    /// object's length, so asking for the first 64 KiB of a 2 KiB file returns
    /// all 2 KiB.
    async fn read_range(&self, path: &Path, range: Range<u64>) -> Result<Vec<u8>>;

    /// Fetch only the first `bytes` bytes of an object (EXIF sniffing).
    async fn read_head(&self, path: &Path, bytes: u64) -> Result<Vec<u8>> {
        self.read_range(path, 0..bytes).await
    }

    /// Delete an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist (backends that cannot tell succeed silently).
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get object metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}

/// Reject empty or inverted ranges before any backend does I/O.
pub(crate) fn check_range(range: &Range<u64>) -> Result<()> {
    if range.start >= range.end {
        exn::bail!(ErrorKind::InvalidRange(range.start, range.end));
    }
    Ok(())
}
