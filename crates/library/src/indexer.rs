//! Bulk indexing of the object store into the metadata index.
//!
//! A run indexes the newest objects synchronously, so a fresh library shows
//! something immediately, then hands the remainder to a background task. At
//! most one run is in flight at a time: the single-flight flag is taken by
//! the initial pass and travels with the background task until it finishes,
//! fails or is aborted.

use crate::date::DateResolver;
use crate::error::{ErrorKind, Result, storage_kind};
use crate::exif;
use derive_more::Display;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use lumen_artifacts::ArtifactCache;
use lumen_index::{MediaType, MetadataIndex, NewPhoto, PhotoRecord, UpsertOutcome};
use lumen_storage::{BackendHandle, EXIF_HEAD_BYTES, FileInfo, MediaKind, key_string, sort_newest_first};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::UtcDateTime;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Default number of objects indexed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

type Markers = HashMap<String, (i64, UtcDateTime)>;

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub resolver: DateResolver,
    /// Continue past the initial limit in a background task.
    pub background: bool,
    pub concurrency: usize,
}
impl Default for IndexerOptions {
    fn default() -> Self {
        Self { resolver: DateResolver::default(), background: true, concurrency: DEFAULT_CONCURRENCY }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum Phase {
    #[default]
    #[display("idle")]
    Idle,
    #[display("running initial")]
    RunningInitial,
    #[display("running background")]
    RunningBackground,
    #[display("complete")]
    Complete,
}

/// Point-in-time view of the current (or last) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingStatus {
    pub phase: Phase,
    pub indexed: u64,
    pub failed: u64,
    pub total: u64,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Media objects in the store.
    pub total: u64,
    /// Indexed synchronously, including objects that were already current.
    pub indexed: u64,
    pub failed: u64,
    /// A background task is indexing the rest.
    pub background_indexing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub indexed: u64,
    pub failed: u64,
    /// Media objects still missing from the index after this batch.
    pub remaining: u64,
}

struct Inner {
    storage: BackendHandle,
    index: MetadataIndex,
    /// Artifacts of objects whose content changed are dropped from here.
    cache: Option<Arc<ArtifactCache>>,
    options: IndexerOptions,
    running: AtomicBool,
    status: Mutex<IndexingStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the single-flight flag. Dropping it, on any exit path, releases the
/// flag and leaves an interrupted run in [`Phase::Idle`].
struct RunGuard(Arc<Inner>);
impl RunGuard {
    fn acquire(inner: &Arc<Inner>) -> Option<Self> {
        inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(inner)))
    }
}
impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut status = self.0.status();
        status.running = false;
        if matches!(status.phase, Phase::RunningInitial | Phase::RunningBackground) {
            status.phase = Phase::Idle;
        }
        drop(status);
        self.0.running.store(false, Ordering::Release);
    }
}

/// Drives bulk population of the metadata index. Cheap to clone; clones share
/// the same status and single-flight flag.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<Inner>,
}

impl Indexer {
    pub fn new(storage: BackendHandle, index: MetadataIndex, options: IndexerOptions) -> Self {
        Self::build(storage, index, None, options)
    }

    /// Like [`new`](Self::new), but objects found to have changed since they
    /// were last indexed also lose their cached artifacts.
    pub fn with_cache(
        storage: BackendHandle,
        index: MetadataIndex,
        cache: Arc<ArtifactCache>,
        options: IndexerOptions,
    ) -> Self {
        Self::build(storage, index, Some(cache), options)
    }

    fn build(
        storage: BackendHandle,
        index: MetadataIndex,
        cache: Option<Arc<ArtifactCache>>,
        options: IndexerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                index,
                cache,
                options,
                running: AtomicBool::new(false),
                status: Mutex::new(IndexingStatus::default()),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> IndexingStatus {
        *self.inner.status()
    }

    /// Index the newest `initial_limit` objects before returning, and the
    /// rest in the background.
    ///
    /// While another run is active this is a no-op that reports that run's
    /// progress instead.
    #[instrument(skip(self), fields(backend = self.inner.storage.name()))]
    pub async fn run(&self, initial_limit: usize) -> Result<RunSummary> {
        let Some(guard) = RunGuard::acquire(&self.inner) else {
            let status = self.status();
            tracing::info!(phase = %status.phase, "indexing already in progress, ignoring request");
            return Ok(RunSummary {
                total: status.total,
                indexed: status.indexed,
                failed: status.failed,
                background_indexing: status.phase == Phase::RunningBackground,
            });
        };
        self.inner.update(|s| *s = IndexingStatus { phase: Phase::RunningInitial, running: true, ..Default::default() });

        let mut files = self.inner.discover().await?;
        let markers = Arc::new(self.inner.index.list_markers().await.or_raise(|| ErrorKind::Index)?);
        let total = files.len() as u64;
        self.inner.update(|s| s.total = total);
        let rest = files.split_off(initial_limit.min(files.len()));

        let (indexed, failed) = self.inner.index_all(files, &markers, true).await;
        tracing::info!(total, indexed, failed, remaining = rest.len(), "initial indexing pass finished");

        if rest.is_empty() {
            self.inner.update(|s| s.phase = Phase::Complete);
            return Ok(RunSummary { total, indexed, failed, background_indexing: false });
        }
        if !self.inner.options.background {
            // Objects remain; later batches pick them up.
            self.inner.update(|s| s.phase = Phase::Idle);
            return Ok(RunSummary { total, indexed, failed, background_indexing: false });
        }

        self.inner.update(|s| s.phase = Phase::RunningBackground);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            inner.index_all(rest, &markers, true).await;
            let status = inner.update(|s| s.phase = Phase::Complete);
            tracing::info!(
                backend = inner.storage.name(),
                indexed = status.indexed,
                failed = status.failed,
                "background indexing complete"
            );
        });
        *self.inner.task() = Some(handle);
        Ok(RunSummary { total, indexed, failed, background_indexing: true })
    }

    /// Index up to `batch_size` of the newest objects the index doesn't know
    /// about yet. Independent of [`run`](Self::run) and its status.
    #[instrument(skip(self), fields(backend = self.inner.storage.name()))]
    pub async fn index_next(&self, batch_size: usize) -> Result<BatchSummary> {
        let files = self.inner.discover().await?;
        let known = self.inner.index.list_keys().await.or_raise(|| ErrorKind::Index)?;
        let pending: Vec<FileInfo> = files
            .into_iter()
            .filter(|file| key_string(&file.path).map(|key| !known.contains(&key)).unwrap_or(false))
            .collect();
        let outstanding = pending.len() as u64;
        let batch = pending.into_iter().take(batch_size).collect();
        let (indexed, failed) = self.inner.index_all(batch, &Markers::new(), false).await;
        Ok(BatchSummary { indexed, failed, remaining: outstanding.saturating_sub(indexed) })
    }

    /// Re-read one object from the store and rewrite its record, whether or
    /// not it changed.
    #[instrument(skip(self), fields(backend = self.inner.storage.name()))]
    pub async fn reindex(&self, key: &str) -> Result<PhotoRecord> {
        let not_found = || ErrorKind::NotFound(key.to_string());
        let file = match self.inner.storage.stat(Path::new(key)).await {
            Ok(file) => file,
            Err(err) => {
                let kind = storage_kind(&err, || key.to_string());
                return Err(err.raise(kind));
            },
        };
        if !file.kind().is_media() {
            exn::bail!(not_found());
        }
        let outcome = self.inner.index_one(file, &Markers::new()).await?;
        self.inner.index.get_by_id(outcome.id()).await.or_raise(|| ErrorKind::Index)?.ok_or_raise(not_found)
    }

    /// Wait for the background task, if any, to finish.
    pub async fn wait(&self) {
        let handle = self.inner.task().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
            && err.is_panic()
        {
            tracing::error!(backend = self.inner.storage.name(), error = %err, "background indexing panicked");
        }
    }

    /// Stop the background task. Returns `true` if there was one to stop.
    pub fn abort(&self) -> bool {
        match self.inner.task().take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                tracing::info!(backend = self.inner.storage.name(), "background indexing aborted");
                true
            },
            _ => false,
        }
    }
}

impl Inner {
    fn status(&self) -> MutexGuard<'_, IndexingStatus> {
        // Status is plain counters; a panic mid-update can't leave it torn.
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut IndexingStatus)) -> IndexingStatus {
        let mut status = self.status();
        f(&mut status);
        *status
    }

    /// Every photo and video in the store, newest first.
    async fn discover(&self) -> Result<Vec<FileInfo>> {
        let mut files = self.storage.list(None).await.or_raise(|| ErrorKind::Storage)?;
        files.retain(|file| file.kind().is_media());
        sort_newest_first(&mut files);
        tracing::debug!(backend = self.storage.name(), count = files.len(), "discovered media objects");
        Ok(files)
    }

    /// Index `files` with bounded concurrency. Failures are logged and
    /// counted, never propagated.
    async fn index_all(&self, files: Vec<FileInfo>, markers: &Markers, track: bool) -> (u64, u64) {
        let (mut indexed, mut failed) = (0, 0);
        let mut queue = files.into_iter();
        let mut processing = FuturesUnordered::new();
        processing.extend(queue.by_ref().take(self.options.concurrency.max(1)).map(|f| self.index_logged(f, markers)));
        while let Some(ok) = processing.next().await {
            if ok {
                indexed += 1;
            } else {
                failed += 1;
            }
            if track {
                self.update(|s| if ok { s.indexed += 1 } else { s.failed += 1 });
            }
            if let Some(file) = queue.next() {
                processing.push(self.index_logged(file, markers));
            }
        }
        (indexed, failed)
    }

    async fn index_logged(&self, file: FileInfo, markers: &Markers) -> bool {
        let path = file.path.clone();
        match self.index_one(file, markers).await {
            Ok(outcome) => {
                tracing::trace!(backend = self.storage.name(), path = %path.display(), ?outcome, "indexed");
                true
            },
            Err(err) => {
                tracing::warn!(backend = self.storage.name(), path = %path.display(), error = ?err, "failed to index object");
                false
            },
        }
    }

    async fn index_one(&self, file: FileInfo, markers: &Markers) -> Result<UpsertOutcome> {
        let key = key_string(&file.path).or_raise(|| ErrorKind::Storage)?;
        if let Some(&(id, modified)) = markers.get(&key)
            && modified == file.modified
        {
            return Ok(UpsertOutcome::Unchanged(id));
        }
        let media_type = MediaType::from_kind(file.kind()).ok_or_raise(|| ErrorKind::NotFound(key.clone()))?;
        let resolver = self.options.resolver;

        let mut photo = NewPhoto {
            display_name: file.display_name(),
            directory_path: key.rsplit_once('/').map(|(dir, _)| dir.to_string()).unwrap_or_default(),
            size_bytes: file.size,
            mime_type: MediaKind::mime_type(&file.path).to_string(),
            media_type,
            width: None,
            height: None,
            duration_seconds: None,
            created_at: resolver.resolve(&key, file.modified),
            remote_modified_at: file.modified,
            exif: None,
            refined: false,
            remote_key: key,
        };

        if media_type == MediaType::Photo && resolver.accuracy().reads_exif_when_indexing() {
            let head = self.storage.read_head(&file.path, EXIF_HEAD_BYTES).await.or_raise(|| ErrorKind::Storage)?;
            match exif::parse(&head) {
                Ok(parsed) => {
                    if let Some(taken_at) = parsed.taken_at {
                        photo.created_at = taken_at;
                    }
                    photo.width = parsed.width;
                    photo.height = parsed.height;
                    photo.exif = parsed.exif.non_empty();
                    photo.refined = true;
                },
                Err(err) => tracing::debug!(
                    backend = self.storage.name(),
                    key = %photo.remote_key,
                    error = %err,
                    "no usable EXIF, using folder date"
                ),
            }
        }

        let outcome = self.index.upsert(&photo).await.or_raise(|| ErrorKind::Index)?;
        if let UpsertOutcome::Updated(id) = outcome {
            self.invalidate(&photo.remote_key, id).await;
        }
        Ok(outcome)
    }

    async fn invalidate(&self, key: &str, id: i64) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.remove(key).await {
            Ok(0) => {},
            Ok(removed) => {
                tracing::debug!(backend = self.storage.name(), key, removed, "dropped stale artifacts");
                if let Err(err) = self.index.mark_uncached(id).await {
                    tracing::warn!(backend = self.storage.name(), key, error = ?err, "unable to clear cached flag");
                }
            },
            Err(err) => tracing::warn!(backend = self.storage.name(), key, error = ?err, "unable to drop stale artifacts"),
        }
    }
}
