use crate::ArtifactKind;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::instrument;

/// Staging area for in-progress writes. Anything left here after a crash is
/// garbage and removed on rescan.
const TMP_DIR: &str = "tmp";
pub const DEFAULT_LOW_WATER_RATIO: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    pub dir: PathBuf,
    /// Hard limit in bytes.
    pub max_size: u64,
    /// Eviction stops once tracked size is at or below
    /// `max_size * low_water_ratio`. Must be in `(0, 1)`.
    pub low_water_ratio: f64,
}
impl CacheOptions {
    pub fn new(dir: impl Into<PathBuf>, max_size: u64) -> Self {
        Self { dir: dir.into(), max_size, low_water_ratio: DEFAULT_LOW_WATER_RATIO }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            exn::bail!(ErrorKind::InvalidOptions("max_size must be greater than zero".to_string()));
        }
        if !(self.low_water_ratio > 0.0 && self.low_water_ratio < 1.0) {
            exn::bail!(ErrorKind::InvalidOptions(format!(
                "low_water_ratio must be between 0 and 1 (exclusive), got {}",
                self.low_water_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub total_size: u64,
    pub item_count: u64,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)` since the cache was opened, `0.0` before any
    /// lookup.
    pub hit_ratio: f64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    size: u64,
    /// Logical access time; larger is more recent.
    tick: u64,
}

/// In-memory view of what is on disk.
#[derive(Debug, Default)]
struct Ledger {
    entries: HashMap<PathBuf, Entry>,
    total: u64,
}
impl Ledger {
    fn insert(&mut self, path: PathBuf, entry: Entry) {
        if let Some(old) = self.entries.insert(path, entry) {
            self.total = self.total.saturating_sub(old.size);
        }
        self.total += entry.size;
    }

    /// Bump the access tick of a tracked entry. Untracked paths stay
    /// untracked.
    fn refresh(&mut self, path: &Path, tick: u64) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.tick = tick;
        }
    }

    fn remove(&mut self, path: &Path) -> Option<Entry> {
        let entry = self.entries.remove(path)?;
        self.total = self.total.saturating_sub(entry.size);
        Some(entry)
    }

    /// Drop least-recently accessed entries until `total <= target`, never
    /// touching `protect`. Returns the paths whose files must be deleted.
    fn select_victims(&mut self, target: u64, protect: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates: Vec<(u64, PathBuf)> = self
            .entries
            .iter()
            .filter(|(path, _)| Some(path.as_path()) != protect)
            .map(|(path, entry)| (entry.tick, path.clone()))
            .collect();
        candidates.sort_unstable_by_key(|(tick, _)| *tick);
        let mut victims = Vec::new();
        for (_, path) in candidates {
            if self.total <= target {
                break;
            }
            self.remove(&path);
            victims.push(path);
        }
        victims
    }
}

/// Content-addressed artifact cache with LRU eviction.
///
/// Size accounting lives in memory behind a short-lived mutex; file I/O never
/// happens while it is held. Every operation that renames or unlinks files
/// holds the writer lock from its ledger update until its last unlink, so an
/// eviction can't delete a file rewritten after it was picked as a victim.
/// [`clear`](Self::clear) and [`rescan`](Self::rescan) take an exclusive gate
/// so no reader or writer sees them half done; every other operation shares
/// the gate.
#[derive(Debug)]
pub struct ArtifactCache {
    root: PathBuf,
    max_size: u64,
    low_water: u64,
    ledger: Mutex<Ledger>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    writer: AsyncMutex<()>,
    gate: RwLock<()>,
}

impl ArtifactCache {
    /// Open (or create) a cache directory and rebuild accounting from disk.
    #[instrument(name = "open_cache", skip_all, fields(dir = %options.dir.display()))]
    pub async fn open(options: CacheOptions) -> Result<Self> {
        options.validate()?;
        let root = options.dir;
        fs::create_dir_all(root.join(TMP_DIR)).await.or_raise(|| ErrorKind::Io(root.clone()))?;
        // Truncation is fine: the low-water mark only needs to be below the limit.
        let low_water = (options.max_size as f64 * options.low_water_ratio) as u64;
        let cache = Self {
            root,
            max_size: options.max_size,
            low_water,
            ledger: Mutex::new(Ledger::default()),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writer: AsyncMutex::new(()),
            gate: RwLock::new(()),
        };
        cache.rescan().await?;
        // The limit may have shrunk since the last run.
        let victims = cache.ledger().select_victims_if_over(cache.max_size, cache.low_water, None);
        cache.delete_files(&victims).await;
        Ok(cache)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // The ledger is never left half-updated by a panic: every mutation is
        // a single insert or remove.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of an artifact:
    /// `<root>/<kind>/<first two hex digits>/<blake3(kind, 0x00, key)>`.
    ///
    /// The kind is part of the hashed input as well as the directory, so
    /// the same key never aliases across kinds.
    pub fn path(&self, remote_key: &str, kind: ArtifactKind) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(remote_key.as_bytes());
        let hash = hasher.finalize().to_hex();
        let shard = &hash.as_str()[0..2];
        self.root.join(kind.as_str()).join(shard).join(hash.as_str())
    }

    /// Read an artifact, recording a hit or miss.
    pub async fn get(&self, remote_key: &str, kind: ArtifactKind) -> Result<Option<Vec<u8>>> {
        let _gate = self.gate.read().await;
        let path = self.path(remote_key, kind);
        match fs::read(&path).await {
            Ok(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let tick = self.tick();
                // A file read after it lost its ledger entry is an eviction
                // victim whose unlink is still pending.
                self.ledger().refresh(&path, tick);
                touch(path).await;
                Ok(Some(bytes))
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::Io(path)),
        }
    }

    /// Store an artifact, replacing any previous version, then evict if the
    /// cache is over its limit. The artifact just written is never evicted.
    ///
    /// An artifact larger than the whole cache is not stored at all, and any
    /// previous version of it is dropped. Returns whether the artifact was
    /// stored.
    pub async fn put(&self, remote_key: &str, kind: ArtifactKind, bytes: Vec<u8>) -> Result<bool> {
        let _gate = self.gate.read().await;
        let path = self.path(remote_key, kind);
        let size = bytes.len() as u64;
        if size > self.max_size {
            tracing::debug!(key = remote_key, %kind, size, max_size = self.max_size, "artifact larger than the cache, not storing");
            let _writer = self.writer.lock().await;
            self.ledger().remove(&path);
            self.delete_files(std::slice::from_ref(&path)).await;
            return Ok(false);
        }
        let tmp_dir = self.root.join(TMP_DIR);
        let staged = tokio::task::spawn_blocking(move || stage(&tmp_dir, &bytes))
            .await
            .or_raise(|| ErrorKind::Task)??;

        let _writer = self.writer.lock().await;
        let target = path.clone();
        tokio::task::spawn_blocking(move || persist(staged, &target))
            .await
            .or_raise(|| ErrorKind::Task)??;
        let victims = {
            let mut ledger = self.ledger();
            ledger.insert(path.clone(), Entry { size, tick: self.tick() });
            ledger.select_victims_if_over(self.max_size, self.low_water, Some(&path))
        };
        if !victims.is_empty() {
            tracing::debug!(evicted = victims.len(), "evicting least recently used artifacts");
        }
        self.delete_files(&victims).await;
        Ok(true)
    }

    /// Evict down to the low-water mark if the cache is over its limit.
    /// Returns how many artifacts were removed.
    #[instrument(skip(self))]
    pub async fn evict(&self) -> usize {
        let _gate = self.gate.read().await;
        let _writer = self.writer.lock().await;
        let victims = self.ledger().select_victims_if_over(self.max_size, self.low_water, None);
        self.delete_files(&victims).await;
        victims.len()
    }

    /// Remove every artifact kind for one remote key. Returns how many
    /// artifacts existed.
    pub async fn remove(&self, remote_key: &str) -> Result<usize> {
        let _gate = self.gate.read().await;
        let _writer = self.writer.lock().await;
        let mut removed = 0;
        for kind in ArtifactKind::ALL {
            let path = self.path(remote_key, kind);
            self.ledger().remove(&path);
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
                Err(err) => return Err(err).or_raise(|| ErrorKind::Io(path)),
            }
        }
        Ok(removed)
    }

    /// Remove all artifacts and reset size accounting. Returns how many
    /// artifacts were tracked beforehand.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let _gate = self.gate.write().await;
        for dir in ArtifactKind::ALL.iter().map(|k| k.as_str()).chain([TMP_DIR]) {
            remove_dir_if_exists(&self.root.join(dir)).await?;
        }
        let tmp = self.root.join(TMP_DIR);
        fs::create_dir_all(&tmp).await.or_raise(|| ErrorKind::Io(tmp))?;
        let previous = std::mem::take(&mut *self.ledger());
        tracing::info!(items = previous.entries.len(), bytes = previous.total, "cleared artifact cache");
        Ok(previous.entries.len() as u64)
    }

    pub fn stats(&self) -> CacheStats {
        let (total_size, item_count) = {
            let ledger = self.ledger();
            (ledger.total, ledger.entries.len() as u64)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            total_size,
            item_count,
            max_size: self.max_size,
            hits,
            misses,
            hit_ratio: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
        }
    }

    /// Rebuild size accounting and access order from the files on disk.
    ///
    /// File modification time stands in for last access: [`get`](Self::get)
    /// refreshes it on every hit. Orphaned temp files are discarded.
    #[instrument(skip(self))]
    pub async fn rescan(&self) -> Result<u64> {
        let _gate = self.gate.write().await;
        let mut found: Vec<(SystemTime, PathBuf, u64)> = Vec::new();
        for kind in ArtifactKind::ALL {
            for shard in list_dir(&self.root.join(kind.as_str())).await? {
                for file in list_dir(&shard).await? {
                    let metadata = fs::metadata(&file).await.or_raise(|| ErrorKind::Io(file.clone()))?;
                    if !metadata.is_file() {
                        continue;
                    }
                    let accessed = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    found.push((accessed, file, metadata.len()));
                }
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let tmp = self.root.join(TMP_DIR);
        remove_dir_if_exists(&tmp).await?;
        fs::create_dir_all(&tmp).await.or_raise(|| ErrorKind::Io(tmp))?;

        let mut ledger = Ledger::default();
        for (tick, (_, path, size)) in found.into_iter().enumerate() {
            ledger.insert(path, Entry { size, tick: tick as u64 });
        }
        let count = ledger.entries.len() as u64;
        tracing::info!(items = count, bytes = ledger.total, "rebuilt artifact cache index from disk");
        self.clock.store(count, Ordering::Relaxed);
        *self.ledger() = ledger;
        Ok(count)
    }

    async fn delete_files(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(err) = fs::remove_file(path).await
                && err.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %path.display(), error = %err, "failed to delete evicted artifact");
            }
        }
    }
}

impl Ledger {
    fn select_victims_if_over(&mut self, max: u64, low_water: u64, protect: Option<&Path>) -> Vec<PathBuf> {
        if self.total <= max {
            return Vec::new();
        }
        self.select_victims(low_water, protect)
    }
}

/// Write `bytes` to a fresh file in the staging area.
fn stage(tmp_dir: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    std::fs::create_dir_all(tmp_dir).or_raise(|| ErrorKind::Io(tmp_dir.to_path_buf()))?;
    let mut file = NamedTempFile::new_in(tmp_dir).or_raise(|| ErrorKind::Io(tmp_dir.to_path_buf()))?;
    file.write_all(bytes).or_raise(|| ErrorKind::Io(file.path().to_path_buf()))?;
    Ok(file)
}

/// Atomically move a staged file into place.
fn persist(file: NamedTempFile, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
    }
    file.persist(target).or_raise(|| ErrorKind::Io(target.to_path_buf()))?;
    Ok(())
}

/// Refresh a file's mtime so a later rescan sees it as recently used.
/// Best effort: a failure only degrades eviction order after a restart.
async fn touch(path: PathBuf) {
    let result = tokio::task::spawn_blocking(move || {
        std::fs::File::options().write(true).open(&path).and_then(|file| file.set_modified(SystemTime::now()))
    })
    .await;
    if let Ok(Err(err)) = result {
        tracing::trace!(error = %err, "could not refresh artifact mtime");
    }
}

async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).or_raise(|| ErrorKind::Io(dir.to_path_buf())),
    };
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Io(dir.to_path_buf()))? {
        paths.push(entry.path());
    }
    Ok(paths)
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).or_raise(|| ErrorKind::Io(dir.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;

    async fn cache(dir: &Path, max_size: u64, low_water_ratio: f64) -> ArtifactCache {
        ArtifactCache::open(CacheOptions { dir: dir.to_path_buf(), max_size, low_water_ratio }).await.unwrap()
    }

    fn disk_usage(root: &Path) -> u64 {
        let mut total = 0;
        for kind in ArtifactKind::ALL {
            let Ok(shards) = std::fs::read_dir(root.join(kind.as_str())) else { continue };
            for shard in shards {
                for file in std::fs::read_dir(shard.unwrap().path()).unwrap() {
                    total += file.unwrap().metadata().unwrap().len();
                }
            }
        }
        total
    }

    #[tokio::test]
    async fn test_path_is_deterministic_and_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 1000, 0.9).await;
        let a = cache.path("photos/a.jpg", ArtifactKind::Thumbnail);
        assert_eq!(a, cache.path("photos/a.jpg", ArtifactKind::Thumbnail));
        assert_ne!(a, cache.path("photos/a.jpg", ArtifactKind::Preview));
        assert_ne!(a, cache.path("photos/b.jpg", ArtifactKind::Thumbnail));
        let relative = a.strip_prefix(dir.path()).unwrap();
        let parts: Vec<_> = relative.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(parts[0], "thumbnail");
        assert_eq!(parts[1], &parts[2][0..2]);
        assert_eq!(parts[2].len(), 64);
    }

    #[tokio::test]
    async fn test_put_get_and_hit_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 1000, 0.9).await;
        assert!(cache.get("a.jpg", ArtifactKind::Thumbnail).await.unwrap().is_none());
        cache.put("a.jpg", ArtifactKind::Thumbnail, vec![7; 100]).await.unwrap();
        assert_eq!(cache.get("a.jpg", ArtifactKind::Thumbnail).await.unwrap().unwrap(), vec![7; 100]);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.hit_ratio, 0.5);
        assert_eq!((stats.total_size, stats.item_count), (100, 1));
    }

    #[tokio::test]
    async fn test_replacing_an_artifact_is_not_double_counted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 1000, 0.9).await;
        cache.put("a.jpg", ArtifactKind::Preview, vec![0; 300]).await.unwrap();
        cache.put("a.jpg", ArtifactKind::Preview, vec![0; 120]).await.unwrap();
        let stats = cache.stats();
        assert_eq!((stats.total_size, stats.item_count), (120, 1));
        assert_eq!(disk_usage(dir.path()), 120);
    }

    #[tokio::test]
    async fn test_eviction_is_bounded_and_lru() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 1000, 0.7).await;
        for key in ["1.jpg", "2.jpg", "3.jpg"] {
            cache.put(key, ArtifactKind::Thumbnail, vec![0; 300]).await.unwrap();
        }
        // Touch the oldest so it is no longer least recently used.
        assert!(cache.get("1.jpg", ArtifactKind::Thumbnail).await.unwrap().is_some());
        cache.put("4.jpg", ArtifactKind::Thumbnail, vec![0; 300]).await.unwrap();

        let stats = cache.stats();
        assert!(stats.total_size <= 700, "evicted down to the low-water mark");
        assert_eq!(stats.total_size, disk_usage(dir.path()));
        assert!(cache.get("1.jpg", ArtifactKind::Thumbnail).await.unwrap().is_some());
        assert!(cache.get("4.jpg", ArtifactKind::Thumbnail).await.unwrap().is_some());
        assert!(cache.get("2.jpg", ArtifactKind::Thumbnail).await.unwrap().is_none());
        assert!(cache.get("3.jpg", ArtifactKind::Thumbnail).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_eviction_at_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 600, 0.5).await;
        cache.put("1.jpg", ArtifactKind::Thumbnail, vec![0; 300]).await.unwrap();
        cache.put("2.jpg", ArtifactKind::Thumbnail, vec![0; 300]).await.unwrap();
        assert_eq!(cache.stats().item_count, 2);
        assert_eq!(cache.evict().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_artifact_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 100, 0.9).await;
        cache.put("small.jpg", ArtifactKind::Thumbnail, vec![0; 50]).await.unwrap();
        assert!(!cache.put("huge.jpg", ArtifactKind::Original, vec![0; 250]).await.unwrap());
        let stats = cache.stats();
        assert_eq!((stats.item_count, stats.total_size), (1, 50));
        assert_eq!(disk_usage(dir.path()), 50);
        assert!(cache.get("huge.jpg", ArtifactKind::Original).await.unwrap().is_none());

        // An oversized replacement drops the stale version.
        cache.put("small.jpg", ArtifactKind::Thumbnail, vec![1; 150]).await.unwrap();
        assert_eq!(cache.stats().item_count, 0);
        assert_eq!(disk_usage(dir.path()), 0);
        assert!(cache.get("small.jpg", ArtifactKind::Thumbnail).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_keeps_accounting_exact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(dir.path(), 2000, 0.5).await);
        let tasks: Vec<_> = (0..400)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let key = format!("k{:02}.jpg", i % 30);
                    match i % 7 {
                        0 | 3 => {
                            cache.get(&key, ArtifactKind::Thumbnail).await.unwrap();
                        },
                        5 => {
                            cache.evict().await;
                        },
                        6 if i % 4 == 0 => {
                            cache.remove(&key).await.unwrap();
                        },
                        _ => {
                            assert!(cache.put(&key, ArtifactKind::Thumbnail, vec![i as u8; 100]).await.unwrap());
                        },
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.total_size, disk_usage(dir.path()));
        assert!(stats.total_size <= 2000);
        assert_eq!(stats.total_size, stats.item_count * 100);
        // Every tracked entry is still readable.
        for i in 0..30 {
            let key = format!("k{i:02}.jpg");
            let _ = cache.get(&key, ArtifactKind::Thumbnail).await.unwrap();
        }
        assert_eq!(cache.stats().total_size, disk_usage(dir.path()));
        assert_eq!(cache.stats().hits, stats.hits + stats.item_count);
    }

    #[tokio::test]
    async fn test_remove_all_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 1000, 0.9).await;
        cache.put("a.jpg", ArtifactKind::Thumbnail, vec![0; 10]).await.unwrap();
        cache.put("a.jpg", ArtifactKind::Preview, vec![0; 20]).await.unwrap();
        cache.put("b.jpg", ArtifactKind::Preview, vec![0; 30]).await.unwrap();
        assert_eq!(cache.remove("a.jpg").await.unwrap(), 2);
        assert_eq!(cache.stats().total_size, 30);
        assert_eq!(cache.remove("a.jpg").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), 1000, 0.9).await;
        cache.put("a.jpg", ArtifactKind::Thumbnail, vec![0; 10]).await.unwrap();
        cache.put("b.jpg", ArtifactKind::Original, vec![0; 20]).await.unwrap();
        assert_eq!(cache.clear().await.unwrap(), 2);
        let stats = cache.stats();
        assert_eq!((stats.total_size, stats.item_count), (0, 0));
        assert_eq!(disk_usage(dir.path()), 0);
        // Still usable afterwards
        cache.put("c.jpg", ArtifactKind::Thumbnail, vec![0; 5]).await.unwrap();
        assert_eq!(cache.stats().item_count, 1);
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_accounting() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache(dir.path(), 1000, 0.9).await;
            cache.put("a.jpg", ArtifactKind::Thumbnail, vec![0; 10]).await.unwrap();
            cache.put("b.jpg", ArtifactKind::Preview, vec![0; 20]).await.unwrap();
        }
        // Simulate a crash mid-write.
        std::fs::write(dir.path().join(TMP_DIR).join(".tmpXYZ"), b"partial").unwrap();

        let cache = cache(dir.path(), 1000, 0.9).await;
        let stats = cache.stats();
        assert_eq!((stats.total_size, stats.item_count), (30, 2));
        assert_eq!(std::fs::read_dir(dir.path().join(TMP_DIR)).unwrap().count(), 0);
        assert!(cache.get("b.jpg", ArtifactKind::Preview).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reopen_with_smaller_limit_evicts() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache(dir.path(), 1000, 0.9).await;
            for key in ["1.jpg", "2.jpg", "3.jpg"] {
                cache.put(key, ArtifactKind::Thumbnail, vec![0; 100]).await.unwrap();
            }
        }
        let cache = cache(dir.path(), 200, 0.5).await;
        assert!(cache.stats().total_size <= 100);
        assert_eq!(cache.stats().total_size, disk_usage(dir.path()));
    }

    #[rstest]
    #[case(0, 0.9)]
    #[case(100, 0.0)]
    #[case(100, 1.0)]
    #[case(100, 1.5)]
    #[case(100, f64::NAN)]
    fn test_invalid_options(#[case] max_size: u64, #[case] low_water_ratio: f64) {
        let options = CacheOptions { dir: PathBuf::from("/tmp/lumen"), max_size, low_water_ratio };
        assert!(options.validate().is_err());
    }

    #[rstest]
    #[case("thumbnail", ArtifactKind::Thumbnail)]
    #[case("Preview", ArtifactKind::Preview)]
    #[case("original", ArtifactKind::Original)]
    fn test_kind_from_str(#[case] input: &str, #[case] expected: ArtifactKind) {
        assert_eq!(input.parse::<ArtifactKind>().unwrap(), expected);
    }
}
