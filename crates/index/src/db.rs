//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Initial pass, background pass and request handlers all write concurrently.
const MAX_CONNECTIONS: u32 = 5;

/// Database connection pool for the metadata index.
///
/// This is the main entry point for interacting with the index database.
/// It manages the SQLite connection pool; queries live on
/// [`MetadataIndex`](crate::MetadataIndex).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to EVERY connection in the pool,
            // not only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the index database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, None).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Parallel connections to ":memory:" would each see their own
        // database, so limit the pool to one.
        Self::new(options, Some(1)).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // WAL so request-time readers don't block behind the indexer
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // The background pass and request-triggered refinements write at
            // the same time; only one writer is allowed in WAL mode.
            .busy_timeout(std::time::Duration::from_millis(1500))
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
                PRAGMA mmap_size = 33554432;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Schema version recorded in the database, `0` for a fresh file.
    async fn schema_version(&self) -> Result<i64> {
        let tracked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
        )
        .fetch_one(&self.pool)
        .await
        .or_raise(|| ErrorKind::Database)?;
        if !tracked {
            return Ok(0);
        }
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Highest migration version embedded in this build.
    fn supported_version() -> i64 {
        MIGRATOR.iter().map(|m| m.version).max().unwrap_or(0)
    }

    /// Run database migrations.
    ///
    /// The stored schema version is read once up front. A database written by
    /// a newer build is a fatal [`SchemaTooNew`](ErrorKind::SchemaTooNew).
    #[instrument(name = "migrate", skip(self))]
    async fn migrate(&self) -> Result<()> {
        let current = self.schema_version().await?;
        let supported = Self::supported_version();
        if current > supported {
            exn::bail!(ErrorKind::SchemaTooNew(current, supported));
        }
        if current < supported {
            tracing::info!(from = current, to = supported, "migrating index schema");
        }
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    ///
    /// This waits for all connections to be returned to the pool and then
    /// closes them. After calling this, the Database instance should not
    /// be used.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        assert_eq!(db.schema_version().await.unwrap(), Database::supported_version());
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "foreign_keys should be ON");
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800, "WAL checkpoint should be 800");
        db.close().await;
    }

    #[tokio::test]
    async fn test_rejects_newer_schema() {
        let db = Database::connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time) \
             VALUES (9999, 'from the future', 1, x'00', 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let err = db.migrate().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::SchemaTooNew(9999, _)));
    }

    #[tokio::test]
    async fn test_legacy_metadata_blob_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        // Build a database at schema version 1 with a legacy JSON blob.
        {
            let options = Database::base_options().filename(&path).create_if_missing(true);
            let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await.unwrap();
            let mut conn = pool.acquire().await.unwrap();
            let first = MIGRATOR.iter().next().unwrap();
            sqlx::migrate::Migrate::ensure_migrations_table(&mut *conn).await.unwrap();
            sqlx::migrate::Migrate::apply(&mut *conn, first).await.unwrap();
            sqlx::query(
                "INSERT INTO photos (remote_key, display_name, size_bytes, mime_type, media_type, \
                 created_at, remote_modified_at, metadata) \
                 VALUES ('a.jpg', 'a.jpg', 1, 'image/jpeg', 'photo', 0, 0, \
                 '{\"make\":\"Canon\",\"iso\":400,\"latitude\":51.5}')",
            )
            .execute(&mut *conn)
            .await
            .unwrap();
            drop(conn);
            pool.close().await;
        }
        let db = Database::connect(&path).await.unwrap();
        let (make, iso, latitude): (Option<String>, Option<i64>, Option<f64>) =
            sqlx::query_as("SELECT exif_make, exif_iso, exif_latitude FROM photos WHERE remote_key = 'a.jpg'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(make.as_deref(), Some("Canon"));
        assert_eq!(iso, Some(400));
        assert_eq!(latitude, Some(51.5));
        db.close().await;
    }
}
