use crate::error::{Error, ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// The derived forms of a media object that get served and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Fixed-size square, centre cropped
    Thumbnail,
    /// Aspect-preserving downscale into a bounded box
    Preview,
    /// The object's own bytes
    Original,
}

impl ArtifactKind {
    pub const ALL: [Self; 3] = [Self::Thumbnail, Self::Preview, Self::Original];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Preview => "preview",
            Self::Original => "original",
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| exn::Exn::from(ErrorKind::UnknownKind(s.to_string())))
    }
}
