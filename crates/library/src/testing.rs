//! Fixtures shared by this crate's tests.

use ::exif::experimental::Writer;
use ::exif::{Field, In, Rational, Tag, Value};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;

type Dms = (u32, u32, u32);

/// Optional tags for [`jpeg_with_exif`]. Camera tags (Canon EOS R5, f/2.8,
/// 50mm, ISO 400, 1/250s) are always written.
#[derive(Default)]
pub(crate) struct ExifFixture {
    pub original: Option<&'static str>,
    pub digitized: Option<&'static str>,
    pub offset: Option<&'static str>,
    pub gps: Option<(Dms, &'static str, Dms, &'static str)>,
}

/// A plain gradient JPEG with no metadata.
pub(crate) fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let buffer = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(buffer).write_to(&mut bytes, ImageFormat::Jpeg).unwrap();
    bytes.into_inner()
}

/// A JPEG with an APP1 EXIF segment directly after SOI.
pub(crate) fn jpeg_with_exif(width: u32, height: u32, fixture: &ExifFixture) -> Vec<u8> {
    let plain = jpeg(width, height);
    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend(tiff(fixture));
    let length = u16::try_from(app1.len() + 2).unwrap();

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend(length.to_be_bytes());
    out.extend(app1);
    out.extend(&plain[2..]);
    out
}

fn field(tag: Tag, value: Value) -> Field {
    Field { tag, ifd_num: In::PRIMARY, value }
}

fn ascii(tag: Tag, text: &str) -> Field {
    field(tag, Value::Ascii(vec![text.as_bytes().to_vec()]))
}

fn rational(tag: Tag, parts: &[(u32, u32)]) -> Field {
    field(tag, Value::Rational(parts.iter().map(|&(num, denom)| Rational { num, denom }).collect()))
}

fn tiff(fixture: &ExifFixture) -> Vec<u8> {
    let mut fields = vec![
        ascii(Tag::Make, "Canon"),
        ascii(Tag::Model, "EOS R5"),
        rational(Tag::FNumber, &[(28, 10)]),
        rational(Tag::FocalLength, &[(50, 1)]),
        rational(Tag::ExposureTime, &[(1, 250)]),
        field(Tag::PhotographicSensitivity, Value::Short(vec![400])),
    ];
    if let Some(original) = fixture.original {
        fields.push(ascii(Tag::DateTimeOriginal, original));
    }
    if let Some(digitized) = fixture.digitized {
        fields.push(ascii(Tag::DateTimeDigitized, digitized));
    }
    if let Some(offset) = fixture.offset {
        fields.push(ascii(Tag::OffsetTimeOriginal, offset));
    }
    if let Some(((lat_d, lat_m, lat_s), lat_ref, (lon_d, lon_m, lon_s), lon_ref)) = fixture.gps {
        fields.push(rational(Tag::GPSLatitude, &[(lat_d, 1), (lat_m, 1), (lat_s, 1)]));
        fields.push(ascii(Tag::GPSLatitudeRef, lat_ref));
        fields.push(rational(Tag::GPSLongitude, &[(lon_d, 1), (lon_m, 1), (lon_s, 1)]));
        fields.push(ascii(Tag::GPSLongitudeRef, lon_ref));
    }

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    tiff.into_inner()
}
