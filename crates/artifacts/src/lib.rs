//! Size-bounded on-disk cache of derived media artifacts.
//!
//! Artifacts are addressed by `(remote key, kind)` alone: the file name is a
//! BLAKE3 hash of both, sharded into 256 sub-directories per kind. No lookup
//! table is persisted; on startup [`ArtifactCache::open`] walks the directory
//! tree to rebuild size accounting and access order.

mod cache;
pub mod error;
mod kind;

pub use crate::cache::{ArtifactCache, CacheOptions, CacheStats, DEFAULT_LOW_WATER_RATIO};
pub use crate::kind::ArtifactKind;
