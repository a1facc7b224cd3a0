//! In-memory storage backend for testing.

use super::{FileInfoStream, check_range};
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory object store for testing.
///
/// Objects are stored in an ordered map behind a [`RwLock`], so all trait
/// methods can operate on `&self`. Besides plain storage it can simulate the
/// two things that make a real bucket interesting: per-key fetch failures and
/// network latency.
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    broken: RwLock<HashSet<PathBuf>>,
    latency: Option<Duration>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects and their
    /// modification times.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_objects(
        objects: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>, UtcDateTime)>,
    ) -> Self {
        let mut map = BTreeMap::new();
        for (path, data, modified) in objects {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_objects: invalid path {}", path.display());
            };
            map.insert(validated, (modified, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            broken: RwLock::new(HashSet::new()),
            latency: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Delay every listing and fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert or replace an object.
    pub async fn put(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>, modified: UtcDateTime) {
        let path = path.into();
        let Ok(validated) = validate_path(&path) else {
            panic!("MockBackend::put: invalid path {}", path.display());
        };
        self.storage.write().await.insert(validated, (modified, data.into()));
    }

    /// Make every fetch of `path` fail with a network error. The object still
    /// shows up in listings.
    pub async fn break_object(&self, path: impl Into<PathBuf>) {
        self.broken.write().await.insert(path.into());
    }

    async fn simulate(&self, path: Option<&Path>) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(path) = path
            && self.broken.read().await.contains(path)
        {
            exn::bail!(ErrorKind::Network(format!("simulated failure fetching {}", path.display())));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let objects: [(&str, Vec<u8>, UtcDateTime); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            if let Err(e) = self.simulate(None).await {
                yield Err(e);
                return;
            }
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        self.simulate(Some(&path)).await?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn read_range(&self, path: &Path, range: Range<u64>) -> Result<Vec<u8>> {
        check_range(&range)?;
        let path = validate_path(path)?;
        self.simulate(Some(&path)).await?;
        let guard = self.storage.read().await;
        let (_modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        let len = data.len() as u64;
        let start = usize::try_from(range.start.min(len)).unwrap_or(data.len());
        let end = usize::try_from(range.end.min(len)).unwrap_or(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        self.simulate(None).await?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}
