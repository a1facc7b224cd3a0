//! The lumen media catalog.
//!
//! [`Library`] wires an object store, a metadata index and an artifact cache
//! together. Indexing fills the index from the store; artifact requests read
//! through the cache and refine the index as a side effect.

mod artifact;
pub mod date;
pub mod error;
pub mod exif;
pub mod indexer;
mod library;
#[cfg(test)]
mod testing;

pub use crate::artifact::Artifact;
pub use crate::date::{DateAccuracy, DateResolver};
pub use crate::indexer::{BatchSummary, Indexer, IndexerOptions, IndexingStatus, Phase, RunSummary};
pub use crate::library::{DEFAULT_INITIAL_LIMIT, Library, LibraryOptions};
