//! Creation date resolution.
//!
//! Every record needs a `created_at`. How hard we try to find the real one is
//! a cost tradeoff: the modification time is free, a date in the key costs a
//! regex, and EXIF costs a ranged fetch per photo.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use time::{Date, Month, Time, UtcDateTime};

/// How a record's creation date is determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateAccuracy {
    /// Use the object's modification time.
    None,
    /// Parse a date out of the object's key, falling back to its
    /// modification time.
    #[default]
    Folders,
    /// [`Folders`](Self::Folders) while indexing; the first artifact request
    /// for a photo refines the date from its EXIF block.
    FoldersExif,
    /// Read EXIF while indexing, falling back to
    /// [`Folders`](Self::Folders).
    Exif,
}

impl DateAccuracy {
    /// Whether EXIF is read while indexing.
    pub fn reads_exif_when_indexing(&self) -> bool {
        matches!(self, Self::Exif)
    }

    /// Whether a lazily parsed EXIF date may replace `created_at`.
    pub fn trusts_exif_date(&self) -> bool {
        matches!(self, Self::FoldersExif | Self::Exif)
    }
}

// A year segment, optionally followed by month and day joined with `/` or
// `-`. The year must start a path segment and be followed by a separator so
// that `IMG_20230615` and `12024` never match.
static FOLDER_DATE: LazyLock<Regex> = LazyLock::new(|| {
    // Literal pattern, exercised by the tests below.
    Regex::new(
        r"(?:^|/)(?P<year>(?:19|20)\d{2})(?:[-/](?P<month>0[1-9]|1[0-2])(?:[-/](?P<day>0[1-9]|[12]\d|3[01]))?)?(?:[-/ _.]|$)",
    )
    .unwrap()
});

/// Find a date in an object key, as midnight UTC.
///
/// A month without a day gives the 1st; a year alone gives the 1st of
/// January. Days that don't exist in that month (`2023/02/30`) also fall back
/// to the 1st.
pub fn date_from_key(key: &str) -> Option<UtcDateTime> {
    let captures = FOLDER_DATE.captures(key)?;
    let year: i32 = captures.name("year")?.as_str().parse().ok()?;
    let month = match captures.name("month") {
        Some(m) => Month::try_from(m.as_str().parse::<u8>().ok()?).ok()?,
        None => Month::January,
    };
    let day = captures.name("day").and_then(|d| d.as_str().parse::<u8>().ok()).unwrap_or(1);
    let date = Date::from_calendar_date(year, month, day).or_else(|_| Date::from_calendar_date(year, month, 1)).ok()?;
    Some(UtcDateTime::new(date, Time::MIDNIGHT))
}

/// Resolves `created_at` for newly indexed objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateResolver {
    accuracy: DateAccuracy,
}

impl DateResolver {
    pub fn new(accuracy: DateAccuracy) -> Self {
        Self { accuracy }
    }

    pub fn accuracy(&self) -> DateAccuracy {
        self.accuracy
    }

    /// The date available without reading the object: from the key in every
    /// mode except [`DateAccuracy::None`], otherwise the modification time.
    pub fn resolve(&self, key: &str, modified: UtcDateTime) -> UtcDateTime {
        match self.accuracy {
            DateAccuracy::None => modified,
            DateAccuracy::Folders | DateAccuracy::FoldersExif | DateAccuracy::Exif => {
                date_from_key(key).unwrap_or(modified)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::utc_datetime;

    const MODIFIED: UtcDateTime = utc_datetime!(2024-05-05 13:14:15);

    #[rstest]
    #[case("2023/06/15/beach.jpg", Some(utc_datetime!(2023-06-15 00:00)))]
    #[case("2023-06-15 Holiday/beach.jpg", Some(utc_datetime!(2023-06-15 00:00)))]
    #[case("photos/2023/06/beach.jpg", Some(utc_datetime!(2023-06-01 00:00)))]
    #[case("photos/2022/a.jpg", Some(utc_datetime!(2022-01-01 00:00)))]
    #[case("2023/13/a.jpg", Some(utc_datetime!(2023-01-01 00:00)))]
    #[case("2023/02/30/a.jpg", Some(utc_datetime!(2023-02-01 00:00)))]
    #[case("1899/01/a.jpg", None)]
    #[case("2100/01/a.jpg", None)]
    #[case("IMG_20230615.jpg", None)]
    #[case("archive/12024/a.jpg", None)]
    #[case("c.mp4", None)]
    fn test_date_from_key(#[case] key: &str, #[case] expected: Option<UtcDateTime>) {
        assert_eq!(date_from_key(key), expected);
    }

    #[rstest]
    #[case(DateAccuracy::None, "2023/06/a.jpg", MODIFIED)]
    #[case(DateAccuracy::Folders, "2023/06/a.jpg", utc_datetime!(2023-06-01 00:00))]
    #[case(DateAccuracy::FoldersExif, "2023/06/a.jpg", utc_datetime!(2023-06-01 00:00))]
    #[case(DateAccuracy::Exif, "2023/06/a.jpg", utc_datetime!(2023-06-01 00:00))]
    #[case(DateAccuracy::Folders, "misc/a.jpg", MODIFIED)]
    fn test_resolve(#[case] accuracy: DateAccuracy, #[case] key: &str, #[case] expected: UtcDateTime) {
        assert_eq!(DateResolver::new(accuracy).resolve(key, MODIFIED), expected);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = DateResolver::new(DateAccuracy::Folders);
        let first = resolver.resolve("2021/11/02/x.png", MODIFIED);
        for _ in 0..10 {
            assert_eq!(resolver.resolve("2021/11/02/x.png", MODIFIED), first);
        }
    }

    #[rstest]
    #[case("none", DateAccuracy::None)]
    #[case("folders", DateAccuracy::Folders)]
    #[case("folders-exif", DateAccuracy::FoldersExif)]
    #[case("exif", DateAccuracy::Exif)]
    fn test_accuracy_names(#[case] name: &str, #[case] expected: DateAccuracy) {
        let value: DateAccuracy = serde::de::Deserialize::deserialize(
            serde::de::value::StrDeserializer::<serde::de::value::Error>::new(name),
        )
        .unwrap();
        assert_eq!(value, expected);
    }
}
