use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

/// What a remote object is, judged by its extension alone.
///
/// Anything that isn't a recognised photo or video format is
/// [`Other`](Self::Other) and never makes it into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
    Other,
}

const PHOTO_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("avif", "image/avif"),
];

const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("3gp", "video/3gpp"),
];

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

impl MediaKind {
    /// Classify an object key by extension (case-insensitive).
    ///
    /// ```
    /// use lumen_storage::MediaKind;
    /// assert_eq!(MediaKind::classify("2023/IMG_0001.JPG"), MediaKind::Photo);
    /// assert_eq!(MediaKind::classify("clips/c.mp4"), MediaKind::Video);
    /// assert_eq!(MediaKind::classify("notes.txt"), MediaKind::Other);
    /// ```
    pub fn classify(path: impl AsRef<Path>) -> Self {
        let Some(ext) = extension(path.as_ref()) else {
            return Self::Other;
        };
        if PHOTO_TYPES.iter().any(|(e, _)| *e == ext) {
            Self::Photo
        } else if VIDEO_TYPES.iter().any(|(e, _)| *e == ext) {
            Self::Video
        } else {
            Self::Other
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// MIME type for an object key, falling back to `application/octet-stream`.
    pub fn mime_type(path: impl AsRef<Path>) -> &'static str {
        let ext = extension(path.as_ref());
        PHOTO_TYPES
            .iter()
            .chain(VIDEO_TYPES)
            .find(|(e, _)| Some(*e) == ext.as_deref())
            .map(|(_, mime)| *mime)
            .unwrap_or("application/octet-stream")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Other => "other",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a/b.jpg", MediaKind::Photo)]
    #[case("a/b.JPEG", MediaKind::Photo)]
    #[case("b.heic", MediaKind::Photo)]
    #[case("c.mp4", MediaKind::Video)]
    #[case("holiday/c.MOV", MediaKind::Video)]
    #[case("README.md", MediaKind::Other)]
    #[case("no-extension", MediaKind::Other)]
    #[case("archive.jpg.zip", MediaKind::Other)]
    fn test_classify(#[case] key: &str, #[case] expected: MediaKind) {
        assert_eq!(MediaKind::classify(key), expected);
    }

    #[rstest]
    #[case("a.jpg", "image/jpeg")]
    #[case("a.PNG", "image/png")]
    #[case("c.mov", "video/quicktime")]
    #[case("c.bin", "application/octet-stream")]
    fn test_mime_type(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(MediaKind::mime_type(key), expected);
    }
}
