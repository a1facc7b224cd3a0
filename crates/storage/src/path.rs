//! Object key validation.
//!
//! Keys arrive from two untrusted directions: object store listings and
//! callers asking for a specific object. Both are funnelled through
//! [`validate`] before a backend turns them into a filesystem path or an S3
//! key.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates an object key and returns its normalized form.
///
/// `.` and empty components are dropped, `..` is resolved as long as it never
/// climbs above the root, and NUL bytes are rejected outright.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use lumen_storage::validate_path;
/// assert!(validate_path("photos/2023/05/x.jpg").is_ok());
/// assert!(validate_path("photos/../x.jpg").is_ok());
/// assert!(validate_path("../x.jpg").is_err());
/// assert!(validate_path("a\0b.jpg").is_err());
/// assert_eq!(validate_path("/photos//2023/./x.jpg").unwrap(), Path::new("photos/2023/x.jpg"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            // Null bytes pass through Path::components() on Unix but cause
            // truncation in C-based syscalls.
            Component::Normal(s) if s.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(s) => components.push(s),
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}

/// Render a validated key as the `/`-separated string used by object stores
/// and as the index's identity for the object.
pub fn key_string(path: impl AsRef<Path>) -> Result<String> {
    let validated = validate(path.as_ref())?;
    let parts = validated
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(validated.clone())))?;
    Ok(parts.join("/"))
}
