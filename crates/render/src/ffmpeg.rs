use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// An `ffmpeg` executable used to pull poster frames out of videos.
pub(crate) struct Ffmpeg {
    path: PathBuf,
}
impl Ffmpeg {
    pub(crate) fn discover() -> Result<Self> {
        match which::which("ffmpeg") {
            Ok(path) => {
                tracing::debug!(ffmpeg = %path.display(), "discovered ffmpeg");
                Ok(Self { path })
            },
            Err(_) => exn::bail!(ErrorKind::FfmpegNotFound),
        }
    }

    pub(crate) fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Decode one frame at `offset` into a JPEG.
    ///
    /// The video is copied into a temporary file first since ffmpeg needs
    /// to seek. Clips shorter than `offset` fall back to their first frame.
    /// Both temporary files are removed when this returns, whatever the
    /// outcome.
    pub(crate) fn poster_frame(
        &self,
        video: &[u8],
        extension: Option<&str>,
        offset: Duration,
        scratch: Option<&Path>,
    ) -> Result<Vec<u8>> {
        let suffix = extension.map(|ext| format!(".{ext}")).unwrap_or_default();
        let mut input = temp_file("lumen-video-", &suffix, scratch)?;
        input.write_all(video).or_raise(|| ErrorKind::Io)?;
        input.flush().or_raise(|| ErrorKind::Io)?;
        let output = temp_file("lumen-poster-", ".jpg", scratch)?;

        if !offset.is_zero() {
            match self.extract(input.path(), output.path(), offset) {
                Ok(frame) if !frame.is_empty() => return Ok(frame),
                Ok(_) => tracing::debug!(?offset, "no frame at offset; retrying from the start"),
                Err(err) => tracing::debug!(?offset, error = %err, "seek failed; retrying from the start"),
            }
        }
        let frame = self.extract(input.path(), output.path(), Duration::ZERO)?;
        if frame.is_empty() {
            exn::bail!(ErrorKind::NoFrame);
        }
        Ok(frame)
    }

    fn extract(&self, input: &Path, output: &Path, offset: Duration) -> Result<Vec<u8>> {
        let result = Command::new(&self.path)
            .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y"])
            .arg("-ss")
            .arg(format!("{:.3}", offset.as_secs_f64()))
            .arg("-i")
            .arg(input)
            .args(["-frames:v", "1", "-f", "image2", "-c:v", "mjpeg"])
            .arg(output)
            .output()
            .or_raise(|| ErrorKind::Io)?;
        if !result.status.success() {
            let code = result.status.code().unwrap_or(-1);
            tracing::debug!(code, stderr = %String::from_utf8_lossy(&result.stderr).trim(), "ffmpeg failed");
            exn::bail!(ErrorKind::FfmpegFailed(code));
        }
        std::fs::read(output).or_raise(|| ErrorKind::Io)
    }
}

fn temp_file(prefix: &str, suffix: &str, dir: Option<&Path>) -> Result<crate::TempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    file.or_raise(|| ErrorKind::Io)
}
