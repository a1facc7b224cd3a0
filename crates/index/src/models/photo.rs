use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use lumen_storage::MediaKind;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::UtcDateTime;

/// Indexed media types. Objects that are neither never reach the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Photo,
    Video,
}
impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    /// Map a storage classification onto an indexable type.
    pub fn from_kind(kind: MediaKind) -> Option<Self> {
        match kind {
            MediaKind::Photo => Some(Self::Photo),
            MediaKind::Video => Some(Self::Video),
            MediaKind::Other => None,
        }
    }
}
impl FromStr for MediaType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            _ => exn::bail!(ErrorKind::InvalidData("media type")),
        }
    }
}
impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Camera metadata. Every field is independently optional; a record carries
/// `Some(Exif)` only when at least one of them is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exif {
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    /// Millimetres
    pub focal_length: Option<f64>,
    /// F-number
    pub aperture: Option<f64>,
    pub iso: Option<u32>,
    /// Human form, e.g. `1/250`
    pub shutter_speed: Option<String>,
    /// Seconds
    pub exposure_time: Option<f64>,
    /// Signed decimal degrees
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
impl Exif {
    pub fn is_empty(&self) -> bool {
        self.make.is_none()
            && self.model.is_none()
            && self.lens.is_none()
            && self.focal_length.is_none()
            && self.aperture.is_none()
            && self.iso.is_none()
            && self.shutter_speed.is_none()
            && self.exposure_time.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }

    /// `None` when nothing is set.
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }
}

/// One indexed media object.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: i64,
    pub remote_key: String,
    pub display_name: String,
    pub directory_path: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub media_type: MediaType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub created_at: UtcDateTime,
    pub remote_modified_at: UtcDateTime,
    pub exif: Option<Exif>,
    /// A thumbnail has been produced at least once.
    pub cached: bool,
    /// When EXIF refinement last ran; `None` if it never has.
    pub refined_at: Option<UtcDateTime>,
}

/// Everything the indexer knows about an object when it (re)indexes it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPhoto {
    pub remote_key: String,
    pub display_name: String,
    pub directory_path: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub media_type: MediaType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub created_at: UtcDateTime,
    pub remote_modified_at: UtcDateTime,
    pub exif: Option<Exif>,
    /// Set when `created_at` and `exif` came from the object's own EXIF
    /// block rather than its key or modification time.
    pub refined: bool,
}

/// Fields learned from an object's bytes after it was indexed. Only `Some`
/// fields are written; everything else keeps its stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refinement {
    pub created_at: Option<UtcDateTime>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub exif: Option<Exif>,
}

/// What [`upsert`](crate::MetadataIndex::upsert) did, with the record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
    /// Same modification marker as the stored row; nothing was written.
    Unchanged(i64),
}
impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::Unchanged(id) => *id,
        }
    }
}

pub(crate) fn timestamp(value: i64, what: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData(what))
}

fn dimension(value: Option<i64>, what: &'static str) -> Result<Option<u32>> {
    value.map(|v| u32::try_from(v).or_raise(|| ErrorKind::InvalidData(what))).transpose()
}

#[derive(sqlx::FromRow)]
pub(crate) struct PhotoRow {
    id: i64,
    remote_key: String,
    display_name: String,
    directory_path: String,
    size_bytes: i64,
    mime_type: String,
    media_type: String,
    width: Option<i64>,
    height: Option<i64>,
    duration_seconds: Option<f64>,
    created_at: i64,
    remote_modified_at: i64,
    cached: bool,
    exif_make: Option<String>,
    exif_model: Option<String>,
    exif_lens: Option<String>,
    exif_focal_length: Option<f64>,
    exif_aperture: Option<f64>,
    exif_iso: Option<i64>,
    exif_shutter_speed: Option<String>,
    exif_exposure_time: Option<f64>,
    exif_latitude: Option<f64>,
    exif_longitude: Option<f64>,
    refined_at: Option<i64>,
}
impl TryFrom<PhotoRow> for PhotoRecord {
    type Error = Error;
    fn try_from(row: PhotoRow) -> Result<Self> {
        let exif = Exif {
            make: row.exif_make,
            model: row.exif_model,
            lens: row.exif_lens,
            focal_length: row.exif_focal_length,
            aperture: row.exif_aperture,
            iso: dimension(row.exif_iso, "iso")?,
            shutter_speed: row.exif_shutter_speed,
            exposure_time: row.exif_exposure_time,
            latitude: row.exif_latitude,
            longitude: row.exif_longitude,
        };
        Ok(Self {
            id: row.id,
            remote_key: row.remote_key,
            display_name: row.display_name,
            directory_path: row.directory_path,
            size_bytes: u64::try_from(row.size_bytes).or_raise(|| ErrorKind::InvalidData("size"))?,
            mime_type: row.mime_type,
            media_type: row.media_type.parse()?,
            width: dimension(row.width, "width")?,
            height: dimension(row.height, "height")?,
            duration_seconds: row.duration_seconds,
            created_at: timestamp(row.created_at, "creation date")?,
            remote_modified_at: timestamp(row.remote_modified_at, "modification date")?,
            exif: exif.non_empty(),
            cached: row.cached,
            refined_at: row.refined_at.map(|t| timestamp(t, "refinement date")).transpose()?,
        })
    }
}

/// EXIF fields in bindable form, `NULL` everywhere when absent.
#[derive(Default)]
pub(crate) struct ExifBinds {
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub iso: Option<i64>,
    pub shutter_speed: Option<String>,
    pub exposure_time: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
impl From<Option<&Exif>> for ExifBinds {
    fn from(exif: Option<&Exif>) -> Self {
        let Some(exif) = exif else {
            return Self::default();
        };
        Self {
            make: exif.make.clone(),
            model: exif.model.clone(),
            lens: exif.lens.clone(),
            focal_length: exif.focal_length,
            aperture: exif.aperture,
            iso: exif.iso.map(i64::from),
            shutter_speed: exif.shutter_speed.clone(),
            exposure_time: exif.exposure_time,
            latitude: exif.latitude,
            longitude: exif.longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> PhotoRow {
        PhotoRow {
            id: 7,
            remote_key: "photos/2023/05/x.jpg".to_string(),
            display_name: "x.jpg".to_string(),
            directory_path: "photos/2023/05".to_string(),
            size_bytes: 2048,
            mime_type: "image/jpeg".to_string(),
            media_type: "photo".to_string(),
            width: None,
            height: None,
            duration_seconds: None,
            created_at: 1_683_417_600,
            remote_modified_at: 1_700_000_000,
            cached: false,
            exif_make: None,
            exif_model: None,
            exif_lens: None,
            exif_focal_length: None,
            exif_aperture: None,
            exif_iso: None,
            exif_shutter_speed: None,
            exif_exposure_time: None,
            exif_latitude: None,
            exif_longitude: None,
            refined_at: None,
        }
    }

    #[test]
    fn test_row_without_exif_has_no_exif() {
        let record = PhotoRecord::try_from(row()).unwrap();
        assert_eq!(record.media_type, MediaType::Photo);
        assert!(record.exif.is_none());
        assert!(record.refined_at.is_none());
        assert_eq!(record.created_at.unix_timestamp(), 1_683_417_600);
    }

    #[test]
    fn test_single_exif_field_is_enough() {
        let record = PhotoRecord::try_from(PhotoRow { exif_iso: Some(200), ..row() }).unwrap();
        assert_eq!(record.exif.unwrap().iso, Some(200));
    }

    #[test]
    fn test_invalid_rows_are_rejected() {
        assert!(PhotoRecord::try_from(PhotoRow { media_type: "audio".to_string(), ..row() }).is_err());
        assert!(PhotoRecord::try_from(PhotoRow { size_bytes: -1, ..row() }).is_err());
        assert!(PhotoRecord::try_from(PhotoRow { width: Some(-5), ..row() }).is_err());
    }

    #[test]
    fn test_media_type_from_kind() {
        assert_eq!(MediaType::from_kind(MediaKind::Video), Some(MediaType::Video));
        assert_eq!(MediaType::from_kind(MediaKind::Other), None);
    }
}
