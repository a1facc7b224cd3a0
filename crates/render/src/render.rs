use crate::Renderer;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use tracing::instrument;

/// An encoded JPEG plus the pixel dimensions of the source it was made from.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub source_width: u32,
    pub source_height: u32,
}

impl Renderer {
    /// Square thumbnail, centre cropped to fill.
    #[instrument(skip_all)]
    pub fn thumbnail(&self, source: &[u8]) -> Result<Rendered> {
        let image = decode(source)?;
        let size = self.options.thumbnail_size;
        let thumbnail = image.resize_to_fill(size, size, FilterType::Lanczos3);
        self.finish(&image, &thumbnail)
    }

    /// Downscale to fit a square bounding box, preserving aspect ratio.
    /// Images already inside the box are only re-encoded.
    #[instrument(skip_all)]
    pub fn preview(&self, source: &[u8]) -> Result<Rendered> {
        let image = decode(source)?;
        let size = self.options.preview_size;
        let (width, height) = image.dimensions();
        if width <= size && height <= size {
            return self.finish(&image, &image);
        }
        let preview = image.resize(size, size, FilterType::Lanczos3);
        self.finish(&image, &preview)
    }

    /// Extract a poster frame from a video as a full-size JPEG.
    ///
    /// `extension` is the source's file extension, which helps ffmpeg pick a
    /// demuxer.
    #[instrument(skip(self, video), fields(bytes = video.len()))]
    pub fn video_poster(&self, video: &[u8], extension: Option<&str>) -> Result<Vec<u8>> {
        let ffmpeg = self.ffmpeg.as_ref().ok_or_raise(|| ErrorKind::FfmpegNotFound)?;
        ffmpeg.poster_frame(video, extension, self.options.poster_offset, self.options.scratch_dir.as_deref())
    }

    fn finish(&self, source: &DynamicImage, output: &DynamicImage) -> Result<Rendered> {
        let (source_width, source_height) = source.dimensions();
        Ok(Rendered { bytes: encode_jpeg(output, self.options.jpeg_quality)?, source_width, source_height })
    }
}

fn decode(source: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(source).or_raise(|| ErrorKind::Decode)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // JPEG has no alpha channel.
    let rgb = image.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb).or_raise(|| ErrorKind::Encode)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RenderOptions;
    use image::{ImageFormat, Rgba, RgbaImage};
    use rstest::rstest;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| Rgba([(x % 255) as u8, (y % 255) as u8, 128, 200]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn renderer() -> Renderer {
        let options = RenderOptions { thumbnail_size: 64, preview_size: 100, ..RenderOptions::default() };
        Renderer::with_ffmpeg(options, None)
    }

    fn dimensions(jpeg: &[u8]) -> (u32, u32) {
        let image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).unwrap();
        image.dimensions()
    }

    #[rstest]
    #[case(400, 200)]
    #[case(30, 90)]
    fn test_thumbnail_is_square(#[case] width: u32, #[case] height: u32) {
        let rendered = renderer().thumbnail(&png(width, height)).unwrap();
        assert_eq!(dimensions(&rendered.bytes), (64, 64));
        assert_eq!((rendered.source_width, rendered.source_height), (width, height));
    }

    #[rstest]
    #[case((400, 200), (100, 50))]
    #[case((120, 300), (40, 100))]
    #[case((80, 40), (80, 40))]
    fn test_preview_fits_box(#[case] source: (u32, u32), #[case] expected: (u32, u32)) {
        let rendered = renderer().preview(&png(source.0, source.1)).unwrap();
        assert_eq!(dimensions(&rendered.bytes), expected);
    }

    #[test]
    fn test_undecodable_source() {
        let err = renderer().thumbnail(b"not an image").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decode));
    }

    #[test]
    fn test_video_without_ffmpeg() {
        let err = renderer().video_poster(b"\x00\x00\x00\x18ftypmp42", Some("mp4")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FfmpegNotFound));
    }
}
