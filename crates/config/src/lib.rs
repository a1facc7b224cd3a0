//! Layered configuration for lumen.
//!
//! Values are merged from, lowest precedence first:
//! 1. built-in defaults,
//! 2. a TOML, YAML or JSON file (an explicit path, or `lumen.toml` in the
//!    platform config directory if it exists),
//! 3. `LUMEN_`-prefixed environment variables, with `__` separating nested
//!    keys (`LUMEN_CACHE__MAX_SIZE=1073741824`).
//!
//! The merged result is validated once; any error is fatal at startup.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use lumen_artifacts::CacheOptions;
use lumen_library::{DateAccuracy, DateResolver, IndexerOptions, LibraryOptions};
use lumen_render::RenderOptions;
use lumen_storage::backend::S3Options;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "LUMEN_";
pub const CONFIG_FILE: &str = "lumen.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "lumen")
}

/// Where defaults live when the platform has no notion of a home directory.
fn fallback_dir() -> PathBuf {
    std::env::temp_dir().join("lumen")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub indexing: IndexingConfig,
    pub artifacts: ArtifactsConfig,
}
impl Default for Config {
    fn default() -> Self {
        let dirs = project_dirs();
        let data = dirs.as_ref().map(|d| d.data_dir().to_path_buf()).unwrap_or_else(fallback_dir);
        let cache = dirs.as_ref().map(|d| d.cache_dir().to_path_buf()).unwrap_or_else(fallback_dir);
        Self {
            storage: StorageConfig::Local { root: data.join("media") },
            database: DatabaseConfig { path: data.join("index.db") },
            cache: CacheConfig { dir: cache.join("artifacts"), ..CacheConfig::default() },
            indexing: IndexingConfig::default(),
            artifacts: ArtifactsConfig::default(),
        }
    }
}

/// The object store to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// A local directory, mostly for development.
    Local { root: PathBuf },
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl StorageConfig {
    /// Backend options when this is an S3 store.
    pub fn s3_options(&self) -> Option<S3Options> {
        match self {
            Self::S3 { bucket, prefix, region, endpoint, key_id, key_secret, timeout_secs } => Some(S3Options {
                bucket: bucket.clone(),
                prefix: prefix.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                key_id: key_id.clone(),
                key_secret: key_secret.clone(),
                timeout: Duration::from_secs(*timeout_secs),
            }),
            Self::Local { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Bytes
    pub max_size: u64,
    /// Eviction stops once the cache is at or below this share of `max_size`.
    pub low_water_ratio: f64,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: fallback_dir().join("artifacts"),
            max_size: 1024 * 1024 * 1024,
            low_water_ratio: lumen_artifacts::DEFAULT_LOW_WATER_RATIO,
        }
    }
}
impl CacheConfig {
    pub fn options(&self) -> CacheOptions {
        CacheOptions { low_water_ratio: self.low_water_ratio, ..CacheOptions::new(&self.dir, self.max_size) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub date_accuracy: DateAccuracy,
    /// Objects indexed before an index request returns.
    pub initial_limit: usize,
    /// Index the rest in the background.
    pub background: bool,
    /// Default size for `next-batch` requests.
    pub batch_size: usize,
    pub concurrency: usize,
}
impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            date_accuracy: DateAccuracy::default(),
            initial_limit: lumen_library::DEFAULT_INITIAL_LIMIT,
            background: true,
            batch_size: 100,
            concurrency: lumen_library::indexer::DEFAULT_CONCURRENCY,
        }
    }
}
impl IndexingConfig {
    pub fn library_options(&self) -> LibraryOptions {
        LibraryOptions {
            indexing: IndexerOptions {
                resolver: DateResolver::new(self.date_accuracy),
                background: self.background,
                concurrency: self.concurrency,
            },
            initial_limit: self.initial_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub thumbnail_size: u32,
    pub preview_size: u32,
    pub jpeg_quality: u8,
    pub poster_offset_secs: f64,
    /// Explicit `ffmpeg` binary; looked up on `PATH` when unset.
    pub ffmpeg: Option<PathBuf>,
}
impl Default for ArtifactsConfig {
    fn default() -> Self {
        let render = RenderOptions::default();
        Self {
            thumbnail_size: render.thumbnail_size,
            preview_size: render.preview_size,
            jpeg_quality: render.jpeg_quality,
            poster_offset_secs: render.poster_offset.as_secs_f64(),
            ffmpeg: None,
        }
    }
}
impl ArtifactsConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            thumbnail_size: self.thumbnail_size,
            preview_size: self.preview_size,
            jpeg_quality: self.jpeg_quality,
            poster_offset: Duration::from_secs_f64(self.poster_offset_secs),
            scratch_dir: None,
        }
    }
}

impl Config {
    /// The layered providers, before extraction. Missing default config
    /// files are skipped; a missing explicit file is an error.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => project_dirs().map(|d| d.config_dir().join(CONFIG_FILE)).filter(|p| p.is_file()),
        };
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "loading config file");
            figment = match file.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => figment.merge(Toml::file(file)),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.storage {
            StorageConfig::S3 { bucket, .. } if bucket.trim().is_empty() => {
                exn::bail!(ErrorKind::invalid("storage.bucket", "must not be empty"))
            },
            StorageConfig::S3 { timeout_secs: 0, .. } => {
                exn::bail!(ErrorKind::invalid("storage.timeout_secs", "must be at least 1"))
            },
            StorageConfig::Local { root } if !root.is_absolute() => {
                exn::bail!(ErrorKind::invalid("storage.root", "must be an absolute path"))
            },
            _ => {},
        }
        if self.cache.max_size == 0 {
            exn::bail!(ErrorKind::invalid("cache.max_size", "must be greater than zero"));
        }
        if !(self.cache.low_water_ratio > 0.0 && self.cache.low_water_ratio < 1.0) {
            exn::bail!(ErrorKind::invalid("cache.low_water_ratio", "must be between 0 and 1, exclusive"));
        }
        if self.indexing.concurrency == 0 {
            exn::bail!(ErrorKind::invalid("indexing.concurrency", "must be at least 1"));
        }
        if self.indexing.batch_size == 0 {
            exn::bail!(ErrorKind::invalid("indexing.batch_size", "must be at least 1"));
        }
        if self.artifacts.thumbnail_size == 0 || self.artifacts.preview_size == 0 {
            exn::bail!(ErrorKind::invalid("artifacts", "sizes must be greater than zero"));
        }
        if !(1..=100).contains(&self.artifacts.jpeg_quality) {
            exn::bail!(ErrorKind::invalid("artifacts.jpeg_quality", "must be between 1 and 100"));
        }
        if !self.artifacts.poster_offset_secs.is_finite() || self.artifacts.poster_offset_secs < 0.0 {
            exn::bail!(ErrorKind::invalid("artifacts.poster_offset_secs", "must be a non-negative number"));
        }
        Ok(())
    }
}
