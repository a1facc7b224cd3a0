use super::{MediaType, PhotoRecord};
use time::{Date, UtcDateTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// `created_at`
    #[default]
    Date,
    /// `display_name`, case-insensitive
    Name,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

/// Filters and paging for [`query`](crate::MetadataIndex::query).
///
/// The date range is half-open: `from <= created_at < to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoQuery {
    pub from: Option<UtcDateTime>,
    pub to: Option<UtcDateTime>,
    pub media_type: Option<MediaType>,
    pub sort: SortBy,
    pub order: Order,
    pub limit: u32,
    pub offset: u64,
}
impl Default for PhotoQuery {
    fn default() -> Self {
        Self { from: None, to: None, media_type: None, sort: SortBy::Date, order: Order::Desc, limit: 50, offset: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<PhotoRecord>,
    /// Matching records across all pages.
    pub total: u64,
    pub has_more: bool,
}

/// Number of records created on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount {
    pub date: Date,
    pub count: u64,
}
