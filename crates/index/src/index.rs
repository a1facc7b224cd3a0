//! Queries over the `photos` table.
//!
//! Every write is a single statement and multi-read methods share one read
//! transaction, so a reader never observes a half-applied row. Concurrent
//! refinements of the same record merge per field: the last writer of each
//! field wins.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    DayCount, ExifBinds, NewPhoto, Order, Page, PhotoQuery, PhotoRecord, PhotoRow, Refinement, SortBy, UpsertOutcome,
    timestamp,
};
use exn::ResultExt;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use time::macros::format_description;
use time::{Date, UtcDateTime};

fn to_i64(value: u64, what: &'static str) -> Result<i64> {
    i64::try_from(value).or_raise(|| ErrorKind::InvalidData(what))
}

/// Repository for photo and video records.
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    pool: SqlitePool,
}
impl From<&Database> for MetadataIndex {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl MetadataIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Insert or update a record keyed by `remote_key`.
    ///
    /// An existing record is only rewritten when `remote_modified_at` differs.
    /// Updates keep the record's `id` and `cached` flag, and keep stored EXIF
    /// fields the new record doesn't supply. A `created_at` that came from
    /// refinement survives an update that carries no refinement of its own.
    ///
    /// Each step is a lone write statement, which takes the write lock up
    /// front and waits out the busy timeout. A deferred read-then-write
    /// transaction fails with `SQLITE_BUSY_SNAPSHOT` if another connection
    /// commits in between.
    pub async fn upsert(&self, photo: &NewPhoto) -> Result<UpsertOutcome> {
        // A record deleted between the insert and update attempts gets one
        // more insert attempt.
        for _ in 0..2 {
            if let Some(id) = self.try_insert(photo).await? {
                return Ok(UpsertOutcome::Inserted(id));
            }
            if let Some(id) = self.try_update(photo).await? {
                return Ok(UpsertOutcome::Updated(id));
            }
            let existing: Option<i64> = sqlx::query_scalar(include_str!("../queries/select_id.sql"))
                .bind(&photo.remote_key)
                .fetch_optional(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
            if let Some(id) = existing {
                return Ok(UpsertOutcome::Unchanged(id));
            }
        }
        exn::bail!(ErrorKind::NotFound(photo.remote_key.clone()))
    }

    /// `INSERT .. ON CONFLICT DO NOTHING`; `None` if the key already exists.
    async fn try_insert(&self, photo: &NewPhoto) -> Result<Option<i64>> {
        let exif = ExifBinds::from(photo.exif.as_ref());
        sqlx::query_scalar(include_str!("../queries/insert_photo.sql"))
            .bind(&photo.remote_key)
            .bind(&photo.display_name)
            .bind(&photo.directory_path)
            .bind(to_i64(photo.size_bytes, "size")?)
            .bind(&photo.mime_type)
            .bind(photo.media_type.as_str())
            .bind(photo.width.map(i64::from))
            .bind(photo.height.map(i64::from))
            .bind(photo.duration_seconds)
            .bind(photo.created_at.unix_timestamp())
            .bind(photo.remote_modified_at.unix_timestamp())
            .bind(exif.make)
            .bind(exif.model)
            .bind(exif.lens)
            .bind(exif.focal_length)
            .bind(exif.aperture)
            .bind(exif.iso)
            .bind(exif.shutter_speed)
            .bind(exif.exposure_time)
            .bind(exif.latitude)
            .bind(exif.longitude)
            .bind(photo.refined.then(|| UtcDateTime::now().unix_timestamp()))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Rewrite a record whose modification marker changed; `None` if it is
    /// missing or already current.
    async fn try_update(&self, photo: &NewPhoto) -> Result<Option<i64>> {
        let exif = ExifBinds::from(photo.exif.as_ref());
        sqlx::query_scalar(include_str!("../queries/update_photo.sql"))
            .bind(&photo.display_name)
            .bind(&photo.directory_path)
            .bind(to_i64(photo.size_bytes, "size")?)
            .bind(&photo.mime_type)
            .bind(photo.media_type.as_str())
            .bind(photo.width.map(i64::from))
            .bind(photo.height.map(i64::from))
            .bind(photo.duration_seconds)
            .bind(photo.remote_modified_at.unix_timestamp())
            .bind(photo.created_at.unix_timestamp())
            .bind(exif.make)
            .bind(exif.model)
            .bind(exif.lens)
            .bind(exif.focal_length)
            .bind(exif.aperture)
            .bind(exif.iso)
            .bind(exif.shutter_speed)
            .bind(exif.exposure_time)
            .bind(exif.latitude)
            .bind(exif.longitude)
            .bind(&photo.remote_key)
            .bind(photo.refined.then(|| UtcDateTime::now().unix_timestamp()))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Merge refined fields into an existing record and stamp `refined_at`.
    ///
    /// `None` fields are left untouched, so two refinements racing on the
    /// same record can only ever add information.
    pub async fn refine(&self, remote_key: &str, refinement: &Refinement) -> Result<()> {
        let exif = ExifBinds::from(refinement.exif.as_ref());
        let result = sqlx::query(include_str!("../queries/refine_photo.sql"))
            .bind(refinement.created_at.map(|t| t.unix_timestamp()))
            .bind(refinement.width.map(i64::from))
            .bind(refinement.height.map(i64::from))
            .bind(exif.make)
            .bind(exif.model)
            .bind(exif.lens)
            .bind(exif.focal_length)
            .bind(exif.aperture)
            .bind(exif.iso)
            .bind(exif.shutter_speed)
            .bind(exif.exposure_time)
            .bind(exif.latitude)
            .bind(exif.longitude)
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(remote_key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(remote_key.to_string()));
        }
        Ok(())
    }

    async fn set_cached(&self, id: i64, cached: bool) -> Result<()> {
        let result = sqlx::query("UPDATE photos SET cached = ? WHERE id = ?")
            .bind(cached)
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(format!("id {id}")));
        }
        Ok(())
    }

    /// Record that a thumbnail exists for this record.
    pub async fn mark_cached(&self, id: i64) -> Result<()> {
        self.set_cached(id, true).await
    }

    pub async fn mark_uncached(&self, id: i64) -> Result<()> {
        self.set_cached(id, false).await
    }

    /// Clear the `cached` flag on every record, e.g. after the artifact cache
    /// was emptied.
    pub async fn mark_all_uncached(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE photos SET cached = 0 WHERE cached = 1")
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    /// Returns `true` if a record was deleted.
    pub async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub async fn get_by_id(&self, id: i64) -> Result<Option<PhotoRecord>> {
        let row: Option<PhotoRow> = sqlx::query_as(include_str!("../queries/get_by_id.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(PhotoRecord::try_from).transpose()
    }

    pub async fn get_by_key(&self, remote_key: &str) -> Result<Option<PhotoRecord>> {
        let row: Option<PhotoRow> = sqlx::query_as(include_str!("../queries/get_by_key.sql"))
            .bind(remote_key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(PhotoRecord::try_from).transpose()
    }

    /// Every indexed remote key, for diffing against a store listing.
    pub async fn list_keys(&self) -> Result<HashSet<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT remote_key FROM photos")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(keys.into_iter().collect())
    }

    /// Every indexed remote key with its record id and stored modification
    /// marker, so callers can skip unchanged objects without fetching them.
    pub async fn list_markers(&self) -> Result<HashMap<String, (i64, UtcDateTime)>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as("SELECT remote_key, id, remote_modified_at FROM photos")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter()
            .map(|(key, id, modified)| Ok((key, (id, timestamp(modified, "remote_modified_at")?))))
            .collect()
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &PhotoQuery) {
        qb.push(" WHERE 1 = 1");
        if let Some(from) = query.from {
            qb.push(" AND created_at >= ").push_bind(from.unix_timestamp());
        }
        if let Some(to) = query.to {
            qb.push(" AND created_at < ").push_bind(to.unix_timestamp());
        }
        if let Some(media_type) = query.media_type {
            qb.push(" AND media_type = ").push_bind(media_type.as_str());
        }
    }

    /// Fetch one page of records plus the total match count.
    ///
    /// Both reads happen inside one transaction, so `total` and `items` agree
    /// even while the indexer is writing.
    pub async fn query(&self, query: &PhotoQuery) -> Result<Page> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM photos");
        Self::push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;

        let mut page_qb = QueryBuilder::<Sqlite>::new("SELECT * FROM photos");
        Self::push_filters(&mut page_qb, query);
        let direction = match query.order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        let column = match query.sort {
            SortBy::Date => "created_at",
            SortBy::Name => "display_name COLLATE NOCASE",
        };
        // id breaks ties so paging is stable across requests.
        page_qb.push(format!(" ORDER BY {column} {direction}, id {direction}"));
        page_qb.push(" LIMIT ").push_bind(i64::from(query.limit));
        page_qb.push(" OFFSET ").push_bind(to_i64(query.offset, "offset")?);
        let rows: Vec<PhotoRow> = page_qb
            .build_query_as()
            .fetch_all(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;

        let items = rows.into_iter().map(PhotoRecord::try_from).collect::<Result<Vec<_>>>()?;
        let total = u64::try_from(total).or_raise(|| ErrorKind::InvalidData("count"))?;
        let has_more = query.offset.saturating_add(items.len() as u64) < total;
        Ok(Page { items, total, has_more })
    }

    /// Per-day record counts (UTC), newest day first.
    pub async fn date_histogram(&self) -> Result<Vec<DayCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(include_str!("../queries/date_histogram.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let format = format_description!("[year]-[month]-[day]");
        rows.into_iter()
            .map(|(day, count)| {
                Ok(DayCount {
                    date: Date::parse(&day, &format).or_raise(|| ErrorKind::InvalidData("histogram day"))?,
                    count: u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Exif, MediaType};
    use rstest::rstest;
    use tempfile::TempDir;
    use time::macros::{date, utc_datetime};

    async fn index() -> MetadataIndex {
        let db = Database::connect_in_memory().await.unwrap();
        MetadataIndex::from(&db)
    }

    fn photo(key: &str, created_at: UtcDateTime, modified: UtcDateTime) -> NewPhoto {
        let (directory, name) = key.rsplit_once('/').unwrap_or(("", key));
        NewPhoto {
            remote_key: key.to_string(),
            display_name: name.to_string(),
            directory_path: directory.to_string(),
            size_bytes: 2048,
            mime_type: "image/jpeg".to_string(),
            media_type: MediaType::Photo,
            width: None,
            height: None,
            duration_seconds: None,
            created_at,
            remote_modified_at: modified,
            exif: None,
            refined: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = index().await;
        let modified = utc_datetime!(2024-01-01 00:00);
        let new = photo("a/b.jpg", modified, modified);
        let first = index.upsert(&new).await.unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));
        let before = index.get_by_key("a/b.jpg").await.unwrap().unwrap();
        assert_eq!(index.upsert(&new).await.unwrap(), UpsertOutcome::Unchanged(first.id()));
        let after = index.get_by_key("a/b.jpg").await.unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_preserves_identity_and_cached_flag() {
        let index = index().await;
        let new = photo("a/b.jpg", utc_datetime!(2024-01-01 00:00), utc_datetime!(2024-01-01 00:00));
        let id = index.upsert(&new).await.unwrap().id();
        index.mark_cached(id).await.unwrap();

        let changed = NewPhoto { size_bytes: 4096, remote_modified_at: utc_datetime!(2024-02-01 00:00), ..new };
        assert_eq!(index.upsert(&changed).await.unwrap(), UpsertOutcome::Updated(id));
        let record = index.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.size_bytes, 4096);
        assert_eq!(record.remote_modified_at, utc_datetime!(2024-02-01 00:00));
        assert!(record.cached);
    }

    #[tokio::test]
    async fn test_update_keeps_refined_fields() {
        let index = index().await;
        let new = photo("a/b.jpg", utc_datetime!(2024-01-01 00:00), utc_datetime!(2024-01-01 00:00));
        let id = index.upsert(&new).await.unwrap().id();
        let refinement = Refinement {
            created_at: Some(utc_datetime!(2019-07-04 10:30)),
            exif: Some(Exif { make: Some("FUJIFILM".to_string()), ..Exif::default() }),
            ..Refinement::default()
        };
        index.refine("a/b.jpg", &refinement).await.unwrap();

        let changed = NewPhoto { remote_modified_at: utc_datetime!(2024-03-01 00:00), ..new };
        index.upsert(&changed).await.unwrap();
        let record = index.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.created_at, utc_datetime!(2019-07-04 10:30));
        assert_eq!(record.exif.unwrap().make.as_deref(), Some("FUJIFILM"));
        assert!(record.refined_at.is_some());
    }

    #[tokio::test]
    async fn test_refined_upsert_replaces_created_at() {
        let index = index().await;
        let new = photo("a/b.jpg", utc_datetime!(2024-01-01 00:00), utc_datetime!(2024-01-01 00:00));
        index.upsert(&new).await.unwrap();
        index
            .refine("a/b.jpg", &Refinement { created_at: Some(utc_datetime!(2019-07-04 10:30)), ..Default::default() })
            .await
            .unwrap();
        let refreshed = NewPhoto {
            created_at: utc_datetime!(2020-01-01 08:00),
            remote_modified_at: utc_datetime!(2024-03-01 00:00),
            refined: true,
            ..new
        };
        index.upsert(&refreshed).await.unwrap();
        let record = index.get_by_key("a/b.jpg").await.unwrap().unwrap();
        assert_eq!(record.created_at, utc_datetime!(2020-01-01 08:00));
    }

    #[tokio::test]
    async fn test_refine_merges_only_supplied_fields() {
        let index = index().await;
        let new = photo("a/b.jpg", utc_datetime!(2024-01-01 00:00), utc_datetime!(2024-01-01 00:00));
        index.upsert(&new).await.unwrap();
        let first = Refinement {
            exif: Some(Exif { make: Some("Canon".to_string()), iso: Some(100), ..Exif::default() }),
            ..Refinement::default()
        };
        let second = Refinement {
            width: Some(4000),
            height: Some(3000),
            exif: Some(Exif { iso: Some(800), ..Exif::default() }),
            ..Refinement::default()
        };
        index.refine("a/b.jpg", &first).await.unwrap();
        index.refine("a/b.jpg", &second).await.unwrap();
        let record = index.get_by_key("a/b.jpg").await.unwrap().unwrap();
        let exif = record.exif.unwrap();
        assert_eq!(exif.make.as_deref(), Some("Canon"));
        assert_eq!(exif.iso, Some(800));
        assert_eq!((record.width, record.height), (Some(4000), Some(3000)));
        // Untouched by either refinement
        assert_eq!(record.created_at, utc_datetime!(2024-01-01 00:00));
    }

    #[tokio::test]
    async fn test_refine_unknown_key() {
        let index = index().await;
        let err = index.refine("missing.jpg", &Refinement::default()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(index.mark_cached(42).await.unwrap_err().is_not_found());
    }

    async fn seeded() -> MetadataIndex {
        let index = index().await;
        let modified = utc_datetime!(2024-06-01 00:00);
        for (key, created) in [
            ("2023/01/Beach.jpg", utc_datetime!(2023-01-10 00:00)),
            ("2023/01/alps.jpg", utc_datetime!(2023-01-10 00:00)),
            ("2023/03/city.jpg", utc_datetime!(2023-03-02 00:00)),
            ("2022/12/dog.jpg", utc_datetime!(2022-12-24 00:00)),
        ] {
            index.upsert(&photo(key, created, modified)).await.unwrap();
        }
        let video = NewPhoto {
            mime_type: "video/mp4".to_string(),
            media_type: MediaType::Video,
            ..photo("clips/c.mp4", utc_datetime!(2023-03-02 12:00), modified)
        };
        index.upsert(&video).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_query_pages() {
        let index = seeded().await;
        let page = index.query(&PhotoQuery { limit: 2, ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        assert_eq!(page.items[0].display_name, "c.mp4");
        let last = index.query(&PhotoQuery { limit: 2, offset: 4, ..Default::default() }).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
        assert_eq!(last.items[0].display_name, "dog.jpg");
    }

    #[rstest]
    #[case(SortBy::Name, Order::Asc, ["alps.jpg", "Beach.jpg", "c.mp4", "city.jpg", "dog.jpg"])]
    #[case(SortBy::Date, Order::Asc, ["dog.jpg", "Beach.jpg", "alps.jpg", "city.jpg", "c.mp4"])]
    #[tokio::test]
    async fn test_query_sorting(#[case] sort: SortBy, #[case] order: Order, #[case] expected: [&str; 5]) {
        let index = seeded().await;
        let page = index.query(&PhotoQuery { sort, order, ..Default::default() }).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let index = seeded().await;
        let videos =
            index.query(&PhotoQuery { media_type: Some(MediaType::Video), ..Default::default() }).await.unwrap();
        assert_eq!(videos.total, 1);
        let range = PhotoQuery {
            from: Some(utc_datetime!(2023-01-01 00:00)),
            to: Some(utc_datetime!(2023-03-02 00:00)),
            ..Default::default()
        };
        assert_eq!(index.query(&range).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_date_histogram() {
        let index = seeded().await;
        let histogram = index.date_histogram().await.unwrap();
        assert_eq!(histogram, vec![
            DayCount { date: date!(2023 - 03 - 02), count: 2 },
            DayCount { date: date!(2023 - 01 - 10), count: 2 },
            DayCount { date: date!(2022 - 12 - 24), count: 1 },
        ]);
    }

    #[tokio::test]
    async fn test_list_keys_and_delete() {
        let index = seeded().await;
        assert_eq!(index.list_keys().await.unwrap().len(), 5);
        let record = index.get_by_key("2022/12/dog.jpg").await.unwrap().unwrap();
        assert!(index.delete_by_id(record.id).await.unwrap());
        assert!(!index.delete_by_id(record.id).await.unwrap());
        assert!(!index.list_keys().await.unwrap().contains("2022/12/dog.jpg"));
    }

    #[tokio::test]
    async fn test_list_markers() {
        let index = seeded().await;
        let markers = index.list_markers().await.unwrap();
        assert_eq!(markers.len(), 5);
        let record = index.get_by_key("clips/c.mp4").await.unwrap().unwrap();
        assert_eq!(markers["clips/c.mp4"], (record.id, utc_datetime!(2024-06-01 00:00)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_file_database() {
        let dir = TempDir::new().unwrap();
        let db = Database::connect(dir.path().join("index.db")).await.unwrap();
        let index = MetadataIndex::from(&db);
        let modified = utc_datetime!(2024-01-01 00:00);
        let changed = utc_datetime!(2024-02-01 00:00);
        let key = |i: usize| format!("bulk/{i:02}.jpg");

        let inserts: Vec<_> = (0..50)
            .map(|i| {
                let index = index.clone();
                let new = photo(&key(i), modified, modified);
                tokio::spawn(async move { index.upsert(&new).await })
            })
            .collect();
        for handle in inserts {
            assert!(matches!(handle.await.unwrap().unwrap(), UpsertOutcome::Inserted(_)));
        }
        assert_eq!(index.count().await.unwrap(), 50);

        // Re-index, refine and page through the same rows all at once.
        let mut writers = Vec::new();
        for i in 0..50 {
            let upserter = index.clone();
            let new = NewPhoto { size_bytes: 4096, ..photo(&key(i), modified, changed) };
            writers.push(tokio::spawn(async move {
                upserter.upsert(&new).await.map(|outcome| matches!(outcome, UpsertOutcome::Updated(_)))
            }));
            let refiner = index.clone();
            let remote_key = key(i);
            writers.push(tokio::spawn(async move {
                let refinement = Refinement { width: Some(640), height: Some(480), ..Default::default() };
                refiner.refine(&remote_key, &refinement).await.map(|()| true)
            }));
        }
        let reader = index.clone();
        let pages = tokio::spawn(async move {
            for _ in 0..20 {
                let page = reader.query(&PhotoQuery { limit: 100, ..Default::default() }).await.unwrap();
                assert_eq!((page.total, page.items.len()), (50, 50));
                for record in &page.items {
                    // Size and marker are written by the same statement.
                    assert_eq!(record.size_bytes == 4096, record.remote_modified_at == changed);
                }
            }
        });
        for handle in writers {
            assert!(handle.await.unwrap().unwrap());
        }
        pages.await.unwrap();

        for i in 0..50 {
            let record = index.get_by_key(&key(i)).await.unwrap().unwrap();
            assert_eq!((record.size_bytes, record.remote_modified_at), (4096, changed));
            assert_eq!((record.width, record.height), (Some(640), Some(480)));
            assert!(record.refined_at.is_some());
        }
        db.close().await;
    }
}
