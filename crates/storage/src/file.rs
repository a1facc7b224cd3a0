//! Object metadata as reported by storage backends.

use crate::media::MediaKind;
use std::path::{Path, PathBuf};
use time::UtcDateTime;

/// Object metadata returned by storage backends.
///
/// This represents a single listed object: enough to decide whether it is
/// media, whether the index already knows about this exact revision, and how
/// to order it against its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Key relative to the storage root (bucket prefix or local directory)
    pub path: PathBuf,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp; the change-detection marker for the index
    pub modified: UtcDateTime,
}
impl FileInfo {
    /// Create a new FileInfo from a listing operation.
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::classify(&self.path)
    }

    /// Final path component, e.g. `IMG_0001.jpg` for `2023/05/IMG_0001.jpg`.
    pub fn display_name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// Parent "directory" of the key, empty for objects at the root.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Sort newest first, breaking ties on the key so the order is total and
/// repeated listings index objects in the same sequence.
pub fn sort_newest_first(files: &mut [FileInfo]) {
    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
}
