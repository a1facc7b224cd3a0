use crate::artifact::{Artifact, ArtifactProcessor};
use crate::error::{ErrorKind, Result, storage_kind};
use crate::indexer::{BatchSummary, Indexer, IndexerOptions, IndexingStatus, RunSummary};
use exn::{OptionExt, ResultExt};
use lumen_artifacts::{ArtifactCache, ArtifactKind, CacheStats};
use lumen_index::{Database, DayCount, MetadataIndex, Page, PhotoQuery, PhotoRecord};
use lumen_render::Renderer;
use lumen_storage::BackendHandle;
use std::path::Path;
use std::sync::Arc;

/// Objects indexed before [`Library::trigger_index`] returns.
pub const DEFAULT_INITIAL_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct LibraryOptions {
    pub indexing: IndexerOptions,
    pub initial_limit: usize,
}
impl Default for LibraryOptions {
    fn default() -> Self {
        Self { indexing: IndexerOptions::default(), initial_limit: DEFAULT_INITIAL_LIMIT }
    }
}

/// The media catalog: one object store, its metadata index and its artifact
/// cache, wired together.
pub struct Library {
    storage: BackendHandle,
    database: Database,
    index: MetadataIndex,
    cache: Arc<ArtifactCache>,
    indexer: Indexer,
    processor: ArtifactProcessor,
    options: LibraryOptions,
}

impl Library {
    pub fn new(
        storage: BackendHandle,
        database: Database,
        cache: ArtifactCache,
        renderer: Renderer,
        options: LibraryOptions,
    ) -> Self {
        let index = MetadataIndex::from(&database);
        let cache = Arc::new(cache);
        let indexer =
            Indexer::with_cache(Arc::clone(&storage), index.clone(), Arc::clone(&cache), options.indexing.clone());
        let processor = ArtifactProcessor {
            storage: Arc::clone(&storage),
            index: index.clone(),
            cache: Arc::clone(&cache),
            renderer: Arc::new(renderer),
            accuracy: options.indexing.resolver.accuracy(),
        };
        Self { storage, database, index, cache, indexer, processor, options }
    }

    pub fn storage(&self) -> &BackendHandle {
        &self.storage
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn get_page(&self, query: &PhotoQuery) -> Result<Page> {
        self.index.query(query).await.or_raise(|| ErrorKind::Index)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<PhotoRecord> {
        self.index
            .get_by_id(id)
            .await
            .or_raise(|| ErrorKind::Index)?
            .ok_or_raise(|| ErrorKind::NotFound(format!("id {id}")))
    }

    pub async fn date_histogram(&self) -> Result<Vec<DayCount>> {
        self.index.date_histogram().await.or_raise(|| ErrorKind::Index)
    }

    /// Serve an artifact, rendering and caching it on first request.
    pub async fn get_artifact(&self, id: i64, kind: ArtifactKind) -> Result<Artifact> {
        let record = self.get_by_id(id).await?;
        self.processor.get(&record, kind).await
    }

    /// Delete the remote object, its record and every cached artifact.
    ///
    /// An object that already vanished from the store still has its record
    /// and artifacts removed.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let record = self.get_by_id(id).await?;
        let key = record.remote_key.as_str();
        match self.storage.delete(Path::new(key)).await {
            Ok(()) => {},
            Err(err) if err.is_not_found() => {
                tracing::debug!(backend = self.storage.name(), key, "object already gone from store");
            },
            Err(err) => {
                let kind = storage_kind(&err, || key.to_string());
                return Err(err.raise(kind));
            },
        }
        self.cache.remove(key).await.or_raise(|| ErrorKind::Cache)?;
        self.index.delete_by_id(id).await.or_raise(|| ErrorKind::Index)?;
        tracing::info!(backend = self.storage.name(), key, id, "deleted media object");
        Ok(())
    }

    // =========================================================================
    // Indexing
    // =========================================================================

    pub async fn trigger_index(&self) -> Result<RunSummary> {
        self.indexer.run(self.options.initial_limit).await
    }

    pub async fn trigger_next_batch(&self, batch_size: usize) -> Result<BatchSummary> {
        self.indexer.index_next(batch_size).await
    }

    pub fn indexing_status(&self) -> IndexingStatus {
        self.indexer.status()
    }

    /// Re-index one object and drop its cached artifacts.
    pub async fn reindex(&self, key: &str) -> Result<PhotoRecord> {
        let record = self.indexer.reindex(key).await?;
        if self.cache.remove(&record.remote_key).await.or_raise(|| ErrorKind::Cache)? > 0 {
            self.index.mark_uncached(record.id).await.or_raise(|| ErrorKind::Index)?;
            return self.get_by_id(record.id).await;
        }
        Ok(record)
    }

    // =========================================================================
    // Cache
    // =========================================================================

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Empty the artifact cache. Returns how many artifacts were removed.
    pub async fn clear_cache(&self) -> Result<u64> {
        let removed = self.cache.clear().await.or_raise(|| ErrorKind::Cache)?;
        self.index.mark_all_uncached().await.or_raise(|| ErrorKind::Index)?;
        Ok(removed)
    }

    /// Rebuild cache accounting from disk. Returns how many artifacts were found.
    pub async fn rescan_cache(&self) -> Result<u64> {
        self.cache.rescan().await.or_raise(|| ErrorKind::Cache)
    }

    /// Stop background work and close the database.
    pub async fn close(self) {
        self.indexer.abort();
        self.database.close().await;
    }
}
