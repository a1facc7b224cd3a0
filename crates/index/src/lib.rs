//! SQLite metadata index for the media catalog.
//!
//! The index is a derived view of the object store: one row per photo or
//! video, keyed by its remote key. It is never the source of truth. Deleting
//! the database file and re-running the indexer rebuilds it, minus whatever
//! EXIF refinement had been gathered lazily.
//!
//! # Schema
//! Migrations are embedded and applied on connect. The first migration
//! carries camera metadata as a JSON blob; the second promotes it to typed
//! columns. A database whose schema is newer than this build is rejected
//! rather than migrated.

mod db;
pub mod error;
mod index;
mod models;

pub use crate::db::Database;
pub use crate::index::MetadataIndex;
pub use crate::models::{
    DayCount, Exif, MediaType, NewPhoto, Order, Page, PhotoQuery, PhotoRecord, Refinement, SortBy, UpsertOutcome,
};
