//! Object store access for the media catalog.
//!
//! Everything the indexer and artifact processor know about the remote store
//! goes through the [`StorageBackend`] trait: exhaustive listing, full and
//! ranged fetches, and deletes. [`MediaKind`] decides which listed objects are
//! worth indexing at all.

pub mod backend;
pub mod error;
mod file;
mod media;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::{FileInfo, sort_newest_first};
pub use crate::media::MediaKind;
pub use crate::path::{key_string, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;

/// How many bytes from the start of an object are enough to find its EXIF
/// block (JPEG APP1 segments and TIFF IFD0 sit at the front of the file).
pub const EXIF_HEAD_BYTES: u64 = 64 * 1024;
