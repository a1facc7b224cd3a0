//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), MinIO and
//! others. The media library is treated as read-mostly: the only mutation is
//! deleting an object on user request.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via configuration (`key_id` and
//! `key_secret`). The AWS credential chain is not consulted.

use crate::{
    FileInfo, StorageBackend,
    backend::{FileInfoStream, check_range},
    error::{ErrorKind, Result},
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig, timeout::TimeoutConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::DateTime,
};
use exn::{OptionExt, ResultExt};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// Connection parameters for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Options {
    pub bucket: String,
    /// Optional key prefix, acts as a virtual root directory.
    pub prefix: Option<String>,
    /// AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    pub region: String,
    /// Custom endpoint URL for S3-compatible services
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    /// Per-operation timeout; also bounds connection establishment.
    pub timeout: Duration,
}

/// S3-compatible storage backend.
///
/// # Examples
///
/// ```no_run
/// use lumen_storage::backend::{S3Backend, S3Options};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new("photos", S3Options {
///     bucket: "family-photos".to_string(),
///     prefix: Some("library/".to_string()),
///     region: "us-west-004".to_string(),
///     endpoint: Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     key_id: "access_key_id".to_string(),
///     key_secret: "secret_access_key".to_string(),
///     timeout: Duration::from_secs(30),
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend. No network traffic happens until the
    /// first request.
    pub fn new(name: impl Into<String>, options: S3Options) -> Result<Self> {
        let prefix = options
            .prefix
            .map(validate_path)
            .transpose()?
            .map(|p| p.to_str().map(|s| s.to_string()).ok_or_raise(|| ErrorKind::InvalidPath(p)))
            .transpose()?;
        let credentials = Credentials::new(options.key_id, options.key_secret, None, None, "lumen-config");
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(options.timeout)
            .operation_timeout(options.timeout)
            .build();
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(options.region))
            // Exponential backoff: 1 initial attempt + 3 retries
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            .timeout_config(timeouts)
            // Path-style addressing for S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = options.endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: options.bucket,
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let key = crate::key_string(path)?;
        Ok(join_prefix(self.prefix.as_deref(), &key))
    }

    /// Strip the configured prefix from an S3 key to get relative path.
    fn relative_path(&self, key: &str) -> Result<PathBuf> {
        validate_path(strip_prefix(self.prefix.as_deref(), key))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    fn parse_datetime(dt: &DateTime) -> Result<UtcDateTime> {
        UtcDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    fn to_file_info(&self, key: &str, size: Option<i64>, modified: Option<&DateTime>) -> Result<FileInfo> {
        let path = self.relative_path(key)?;
        let modified = modified
            .ok_or_raise(|| ErrorKind::BackendError(format!("S3 object {key} has no last-modified time")))
            .and_then(Self::parse_datetime)?;
        let size = size.and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
        Ok(FileInfo::new(path, size, modified))
    }

    /// Fetch an object, optionally restricted to an HTTP byte range.
    async fn get(&self, path: &Path, range: Option<&Range<u64>>) -> Result<Vec<u8>> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let request = self.client.get_object().bucket(&self.bucket).key(&key);
        // HTTP ranges are inclusive at both ends.
        let request = match range {
            Some(r) => request.range(format!("bytes={}-{}", r.start, r.end - 1)),
            None => request,
        };
        let output = match request.send().await {
            Ok(output) => output,
            // Range starts at or past the end of the object.
            Err(err) if range.is_some() && status_of(&err) == Some(416) => return Ok(Vec::new()),
            Err(err) => exn::bail!(map_sdk_error(err, path)),
        };
        let body = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network(format!("failed reading body of {key}")))?;
        Ok(body.into_bytes().to_vec())
    }
}

fn join_prefix(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
        None => key.to_string(),
    }
}

fn strip_prefix<'k>(prefix: Option<&str>, key: &'k str) -> &'k str {
    match prefix {
        Some(prefix) => {
            let prefix_normalized = prefix.trim_end_matches('/');
            key.strip_prefix(prefix_normalized).and_then(|s| s.strip_prefix('/')).unwrap_or(key)
        },
        None => key,
    }
}

fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, path: &Path) -> ErrorKind
where
    E: std::error::Error + Send + Sync + 'static,
{
    match (status_of(&err), &err) {
        (Some(404), _) => ErrorKind::NotFound(path.to_path_buf()),
        (Some(401 | 403), _) => ErrorKind::PermissionDenied(path.to_path_buf()),
        (_, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)) => {
            ErrorKind::Network(DisplayErrorContext(&err).to_string())
        },
        _ => ErrorKind::BackendError(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let list_prefix = match prefix.map(crate::key_string).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        let list_prefix = match (&self.prefix, list_prefix) {
            (_, Some(pfx)) => Some(join_prefix(self.prefix.as_deref(), &pfx)),
            (Some(root), None) => Some(format!("{}/", root.trim_end_matches('/'))),
            (None, None) => None,
        };

        Box::pin(stream! {
            let mut continuation: Option<String> = None;
            loop {
                let permit = match self.acquire_permit().await {
                    Ok(permit) => permit,
                    Err(e) => { yield Err(e); return; },
                };
                let response = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .set_prefix(list_prefix.clone())
                    .set_continuation_token(continuation.take())
                    .send()
                    .await;
                drop(permit);
                let page = match response {
                    Ok(page) => page,
                    Err(err) => {
                        let root = PathBuf::from(list_prefix.clone().unwrap_or_default());
                        yield Err(exn::Exn::from(map_sdk_error(err, &root)));
                        return;
                    },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    // Zero-byte "directory marker" objects created by some web consoles.
                    if key.ends_with('/') {
                        continue;
                    }
                    yield self.to_file_info(key, object.size(), object.last_modified());
                }
                match (page.is_truncated(), page.next_continuation_token()) {
                    (Some(true), Some(token)) => continuation = Some(token.to_string()),
                    _ => break,
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.get(path, None).await
    }

    async fn read_range(&self, path: &Path, range: Range<u64>) -> Result<Vec<u8>> {
        check_range(&range)?;
        self.get(path, Some(&range)).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        tracing::debug!(bucket = %self.bucket, %key, "deleting S3 object");
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, path))?;
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, path))?;
        self.to_file_info(&key, head.content_length(), head.last_modified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, "2023/05/x.jpg", "2023/05/x.jpg")]
    #[case(Some("library"), "2023/05/x.jpg", "library/2023/05/x.jpg")]
    #[case(Some("library/"), "c.mp4", "library/c.mp4")]
    fn test_join_prefix(#[case] prefix: Option<&str>, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(join_prefix(prefix, key), expected);
    }

    #[rstest]
    #[case(None, "2023/05/x.jpg", "2023/05/x.jpg")]
    #[case(Some("library"), "library/2023/05/x.jpg", "2023/05/x.jpg")]
    #[case(Some("library/"), "library/c.mp4", "c.mp4")]
    #[case(Some("library"), "elsewhere/c.mp4", "elsewhere/c.mp4")]
    fn test_strip_prefix(#[case] prefix: Option<&str>, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(strip_prefix(prefix, key), expected);
    }

    fn backend(prefix: Option<&str>) -> S3Backend {
        S3Backend::new("test", S3Options {
            bucket: "bucket".to_string(),
            prefix: prefix.map(str::to_string),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            key_id: "id".to_string(),
            key_secret: "secret".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_full_key_normalizes() {
        let backend = backend(Some("/library/"));
        assert_eq!(backend.full_key(Path::new("2023//x.jpg")).unwrap(), "library/2023/x.jpg");
        assert!(backend.full_key(Path::new("../x.jpg")).is_err());
    }

    #[test]
    fn test_to_file_info() {
        let backend = backend(Some("library"));
        let modified = DateTime::from_secs(1_700_000_000);
        let info = backend.to_file_info("library/a/b.jpg", Some(2048), Some(&modified)).unwrap();
        assert_eq!(info.path, Path::new("a/b.jpg"));
        assert_eq!(info.size, 2048);
        assert_eq!(info.modified.unix_timestamp(), 1_700_000_000);
        assert!(backend.to_file_info("library/a/b.jpg", Some(1), None).is_err());
    }
}
