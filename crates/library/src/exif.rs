//! EXIF parsing.
//!
//! Works on either a whole file or just its head: JPEG keeps its APP1
//! segment near the start, so the first 64 KiB is nearly always enough.

use derive_more::{Display, Error};
use ::exif::{DateTime, Field, In, Reader, Tag, Value};
use exn::ResultExt;
use lumen_index::{Exif, Refinement};
use std::io::Cursor;
use time::{Date, Month, PrimitiveDateTime, Time, UtcDateTime, UtcOffset};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The bytes carry no EXIF block, or it lies beyond what was fetched.
    #[display("no EXIF data")]
    Missing,
    #[display("malformed EXIF data")]
    Malformed,
}

/// Everything we take from an EXIF block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExif {
    /// DateTimeOriginal, else DateTimeDigitized, else DateTime.
    pub taken_at: Option<UtcDateTime>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub exif: Exif,
}

impl ParsedExif {
    /// Convert into an index refinement. The capture date is only carried
    /// over when `with_date` is set.
    pub fn into_refinement(self, with_date: bool) -> Refinement {
        Refinement {
            created_at: self.taken_at.filter(|_| with_date),
            width: self.width,
            height: self.height,
            exif: self.exif.non_empty(),
        }
    }
}

pub fn parse(bytes: &[u8]) -> Result<ParsedExif> {
    let data = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(data) => data,
        Err(err @ (::exif::Error::NotFound(_) | ::exif::Error::BlankValue(_))) => {
            return Err(err).or_raise(|| ErrorKind::Missing);
        },
        Err(err) => return Err(err).or_raise(|| ErrorKind::Malformed),
    };
    let field = |tag| data.get_field(tag, In::PRIMARY);

    let taken_at = [
        (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
        (Tag::DateTimeDigitized, Tag::OffsetTimeDigitized),
        (Tag::DateTime, Tag::OffsetTime),
    ]
    .into_iter()
    .find_map(|(date, offset)| capture_date(field(date)?, field(offset)));

    let exposure_time = field(Tag::ExposureTime).and_then(rational);
    let latitude = coordinate(field(Tag::GPSLatitude), field(Tag::GPSLatitudeRef), "S");
    let longitude = coordinate(field(Tag::GPSLongitude), field(Tag::GPSLongitudeRef), "W");

    Ok(ParsedExif {
        taken_at,
        width: field(Tag::PixelXDimension).or_else(|| field(Tag::ImageWidth)).and_then(|f| f.value.get_uint(0)),
        height: field(Tag::PixelYDimension).or_else(|| field(Tag::ImageLength)).and_then(|f| f.value.get_uint(0)),
        exif: Exif {
            make: field(Tag::Make).and_then(ascii),
            model: field(Tag::Model).and_then(ascii),
            lens: field(Tag::LensModel).and_then(ascii),
            focal_length: field(Tag::FocalLength).and_then(rational),
            aperture: field(Tag::FNumber).and_then(rational),
            iso: field(Tag::PhotographicSensitivity).and_then(|f| f.value.get_uint(0)),
            shutter_speed: exposure_time.map(shutter_speed),
            exposure_time,
            latitude,
            longitude,
        },
    })
}

fn ascii(field: &Field) -> Option<String> {
    let Value::Ascii(ref values) = field.value else {
        return None;
    };
    values
        .iter()
        .map(|v| String::from_utf8_lossy(v).trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
        .find(|s| !s.is_empty())
}

fn rational(field: &Field) -> Option<f64> {
    match field.value {
        Value::Rational(ref values) => values.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        Value::SRational(ref values) => values.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        _ => None,
    }
}

/// Degrees, minutes, seconds into signed decimal degrees.
fn coordinate(value: Option<&Field>, reference: Option<&Field>, negative: &str) -> Option<f64> {
    let Value::Rational(ref parts) = value?.value else {
        return None;
    };
    if parts.len() < 3 || parts.iter().take(3).any(|r| r.denom == 0) {
        return None;
    }
    let degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;
    let negate = reference.and_then(ascii).is_some_and(|r| r.eq_ignore_ascii_case(negative));
    Some(if negate { -degrees } else { degrees })
}

/// `1/250` below a second, plain seconds otherwise.
fn shutter_speed(seconds: f64) -> String {
    if seconds > 0.0 && seconds < 1.0 {
        format!("1/{}", (1.0 / seconds).round())
    } else {
        format!("{seconds}")
    }
}

fn capture_date(date: &Field, offset: Option<&Field>) -> Option<UtcDateTime> {
    let Value::Ascii(ref values) = date.value else {
        return None;
    };
    let mut parsed = DateTime::from_ascii(values.first()?).ok()?;
    if let Some(Value::Ascii(offsets)) = offset.map(|f| &f.value)
        && let Some(raw) = offsets.first()
    {
        // An unparseable offset leaves the date as local-unknown, read as UTC.
        let _ = parsed.parse_offset(raw);
    }
    let date = Date::from_calendar_date(
        i32::from(parsed.year),
        Month::try_from(parsed.month).ok()?,
        parsed.day,
    )
    .ok()?;
    let time = Time::from_hms(parsed.hour, parsed.minute, parsed.second).ok()?;
    let local = PrimitiveDateTime::new(date, time);
    match parsed.offset {
        Some(minutes) => {
            let offset = UtcOffset::from_whole_seconds(i32::from(minutes) * 60).ok()?;
            Some(UtcDateTime::from(local.assume_offset(offset)))
        },
        None => Some(UtcDateTime::new(date, time)),
    }
}
