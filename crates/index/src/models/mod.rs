mod photo;
mod query;

pub use self::photo::{Exif, MediaType, NewPhoto, PhotoRecord, Refinement, UpsertOutcome};
pub(crate) use self::photo::{ExifBinds, PhotoRow, timestamp};
pub use self::query::{DayCount, Order, Page, PhotoQuery, SortBy};
