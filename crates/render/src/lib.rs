//! Derived image artifacts.
//!
//! Photos are decoded and resized in-process with the `image` crate. Videos
//! are reduced to a single poster frame by an external `ffmpeg`, which is
//! then treated like any other photo. Every method here blocks; async callers
//! should run them on a blocking thread.

pub mod error;
mod ffmpeg;
mod render;

use crate::ffmpeg::Ffmpeg;
pub use crate::render::Rendered;
use std::path::PathBuf;
use std::time::Duration;

pub type TempFile = tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Edge length of square thumbnails, in pixels.
    pub thumbnail_size: u32,
    /// Bounding box edge for previews, in pixels. Never upscales.
    pub preview_size: u32,
    /// 1-100
    pub jpeg_quality: u8,
    /// Where in a video to grab the poster frame.
    pub poster_offset: Duration,
    /// Directory for temporary video copies; the system default when `None`.
    pub scratch_dir: Option<PathBuf>,
}
impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            thumbnail_size: 256,
            preview_size: 1600,
            jpeg_quality: 85,
            poster_offset: Duration::from_secs(1),
            scratch_dir: None,
        }
    }
}

pub struct Renderer {
    ffmpeg: Option<Ffmpeg>,
    options: RenderOptions,
}
impl Renderer {
    /// Create a renderer, looking for `ffmpeg` on `PATH`. Without it, photos
    /// still render but every video request fails with
    /// [`FfmpegNotFound`](error::ErrorKind::FfmpegNotFound).
    pub fn new(options: RenderOptions) -> Self {
        let ffmpeg = match Ffmpeg::discover() {
            Ok(ffmpeg) => Some(ffmpeg),
            Err(err) => {
                tracing::warn!(error = %err, "video thumbnails disabled");
                None
            },
        };
        Self { ffmpeg, options }
    }

    /// Create a renderer with an explicit `ffmpeg` binary, or none at all.
    pub fn with_ffmpeg(options: RenderOptions, ffmpeg: Option<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.map(Ffmpeg::at), options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn supports_video(&self) -> bool {
        self.ffmpeg.is_some()
    }
}
impl From<RenderOptions> for Renderer {
    fn from(options: RenderOptions) -> Self {
        Renderer::new(options)
    }
}
