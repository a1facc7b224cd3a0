//! Serving derived artifacts.
//!
//! A cache miss is the only time the library reads a whole object, so it is
//! also where lazy metadata refinement happens: EXIF for photos that never
//! had it, and pixel dimensions for anything the index doesn't know the size
//! of yet. Refinement failures are logged and never fail the request.

use crate::date::DateAccuracy;
use crate::error::{ErrorKind, Result, storage_kind};
use crate::exif;
use exn::ResultExt;
use lumen_artifacts::{ArtifactCache, ArtifactKind};
use lumen_index::{MediaType, MetadataIndex, PhotoRecord, Refinement};
use lumen_render::{Rendered, Renderer};
use lumen_storage::BackendHandle;
use std::path::Path;
use std::sync::Arc;

const JPEG: &str = "image/jpeg";

/// Artifact bytes ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub(crate) struct ArtifactProcessor {
    pub(crate) storage: BackendHandle,
    pub(crate) index: MetadataIndex,
    pub(crate) cache: Arc<ArtifactCache>,
    pub(crate) renderer: Arc<Renderer>,
    pub(crate) accuracy: DateAccuracy,
}

impl ArtifactProcessor {
    pub(crate) async fn get(&self, record: &PhotoRecord, kind: ArtifactKind) -> Result<Artifact> {
        let key = record.remote_key.as_str();
        let mime_type = match kind {
            ArtifactKind::Original => record.mime_type.clone(),
            ArtifactKind::Thumbnail | ArtifactKind::Preview => JPEG.to_string(),
        };
        if let Some(bytes) = self.cache.get(key, kind).await.or_raise(|| ErrorKind::Cache)? {
            tracing::trace!(key, %kind, "artifact cache hit");
            return Ok(Artifact { bytes, mime_type });
        }

        let source = match self.storage.read(Path::new(key)).await {
            Ok(source) => source,
            Err(err) => {
                let kind = storage_kind(&err, || key.to_string());
                return Err(err.raise(kind));
            },
        };
        let mut learned_dimensions = false;
        if record.media_type == MediaType::Photo && record.exif.is_none() && record.refined_at.is_none() {
            learned_dimensions = self.refine_from_exif(key, &source).await;
        }

        let (bytes, rendered) = self.derive(record, kind, source).await?;
        let stored = self.cache.put(key, kind, bytes.clone()).await.or_raise(|| ErrorKind::Cache)?;

        if kind == ArtifactKind::Thumbnail
            && stored
            && !record.cached
            && let Err(err) = self.index.mark_cached(record.id).await
        {
            tracing::warn!(key, error = ?err, "unable to flag record as cached");
        }
        if let Some((width, height)) = rendered
            && record.width.is_none()
            && !learned_dimensions
        {
            let refinement = Refinement { width: Some(width), height: Some(height), ..Default::default() };
            if let Err(err) = self.index.refine(key, &refinement).await {
                tracing::warn!(key, error = ?err, "unable to record dimensions");
            }
        }
        Ok(Artifact { bytes, mime_type })
    }

    /// Parse EXIF out of a fetched photo and merge it into the index. The
    /// record is stamped as refined even when there is nothing to merge, so
    /// the next miss doesn't parse it again. Returns `true` if the refinement
    /// carried pixel dimensions.
    async fn refine_from_exif(&self, key: &str, source: &[u8]) -> bool {
        let refinement = match exif::parse(source) {
            Ok(parsed) => parsed.into_refinement(self.accuracy.trusts_exif_date()),
            Err(err) => {
                tracing::debug!(key, error = %err, "no usable EXIF in original");
                Refinement::default()
            },
        };
        let has_dimensions = refinement.width.is_some() && refinement.height.is_some();
        match self.index.refine(key, &refinement).await {
            Ok(()) => {
                tracing::debug!(key, dated = refinement.created_at.is_some(), "refined record from EXIF");
                has_dimensions
            },
            Err(err) => {
                tracing::warn!(key, error = ?err, "unable to refine record");
                false
            },
        }
    }

    /// Produce the artifact bytes, plus the source's pixel dimensions when
    /// it had to be decoded.
    async fn derive(
        &self,
        record: &PhotoRecord,
        kind: ArtifactKind,
        source: Vec<u8>,
    ) -> Result<(Vec<u8>, Option<(u32, u32)>)> {
        if kind == ArtifactKind::Original {
            return Ok((source, None));
        }
        let renderer = Arc::clone(&self.renderer);
        let is_video = record.media_type == MediaType::Video;
        let extension = Path::new(&record.remote_key).extension().and_then(|e| e.to_str()).map(str::to_string);
        let rendered: Rendered = tokio::task::spawn_blocking(move || {
            let still = if is_video { renderer.video_poster(&source, extension.as_deref())? } else { source };
            if kind == ArtifactKind::Preview { renderer.preview(&still) } else { renderer.thumbnail(&still) }
        })
        .await
        .or_raise(|| ErrorKind::Processing)?
        .or_raise(|| ErrorKind::Processing)?;
        Ok((rendered.bytes, Some((rendered.source_width, rendered.source_height))))
    }
}
