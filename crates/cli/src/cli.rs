use clap::{Args, Parser, Subcommand, ValueEnum};
use lumen_artifacts::ArtifactKind;
use lumen_index::{MediaType, Order, PhotoQuery, SortBy};
use std::path::PathBuf;
use time::macros::format_description;
use time::{Date, UtcDateTime};

/// Browse and serve a photo and video library kept in an object store.
#[derive(Debug, Parser)]
#[command(name = "lumen", version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON); defaults to `lumen.toml` in
    /// the platform config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index the object store, newest first
    Index {
        /// Objects to index before returning; the rest continue in the
        /// background
        #[arg(long)]
        limit: Option<usize>,
        /// Block until background indexing has finished
        #[arg(long)]
        wait: bool,
    },
    /// Index the next batch of objects not yet in the index
    NextBatch {
        /// Defaults to `indexing.batch_size`
        count: Option<usize>,
    },
    /// List indexed media
    List(ListArgs),
    /// Record counts per creation day
    Histogram,
    /// Write an artifact to a file
    Get {
        id: i64,
        #[arg(value_enum)]
        kind: Kind,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Delete an object from the store, the index and the cache
    Delete { id: i64 },
    /// Inspect or maintain the artifact cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    Stats,
    Clear,
    /// Rebuild size accounting from what is on disk
    Rescan,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// First day included, `YYYY-MM-DD`
    #[arg(long, value_parser = parse_day)]
    pub from: Option<Date>,
    /// First day excluded, `YYYY-MM-DD`
    #[arg(long, value_parser = parse_day)]
    pub to: Option<Date>,
    #[arg(long = "type", value_enum)]
    pub media_type: Option<Media>,
    #[arg(long, value_enum, default_value_t = Sort::Date)]
    pub sort: Sort,
    #[arg(long, value_enum, default_value_t = Direction::Desc)]
    pub order: Direction,
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

impl ListArgs {
    pub fn query(&self) -> PhotoQuery {
        let midnight = |date: Date| UtcDateTime::new(date, time::Time::MIDNIGHT);
        PhotoQuery {
            from: self.from.map(midnight),
            to: self.to.map(midnight),
            media_type: self.media_type.map(MediaType::from),
            sort: self.sort.into(),
            order: self.order.into(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn parse_day(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    Thumbnail,
    Preview,
    Original,
}
impl From<Kind> for ArtifactKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Thumbnail => Self::Thumbnail,
            Kind::Preview => Self::Preview,
            Kind::Original => Self::Original,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Media {
    Photo,
    Video,
}
impl From<Media> for MediaType {
    fn from(media: Media) -> Self {
        match media {
            Media::Photo => Self::Photo,
            Media::Video => Self::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Sort {
    Date,
    Name,
}
impl From<Sort> for SortBy {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::Date => Self::Date,
            Sort::Name => Self::Name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Asc,
    Desc,
}
impl From<Direction> for Order {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Asc => Self::Asc,
            Direction::Desc => Self::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;
    use time::macros::{date, utc_datetime};

    #[test]
    fn test_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_list_builds_half_open_query() {
        let cli = Cli::try_parse_from([
            "lumen", "list", "--from", "2024-01-01", "--to", "2024-02-01", "--type", "video", "--sort", "name",
            "--order", "asc", "--limit", "10",
        ])
        .unwrap();
        let Command::List(args) = cli.command else { panic!("expected list") };
        assert_eq!(args.from, Some(date!(2024-01-01)));
        let query = args.query();
        assert_eq!(query.from, Some(utc_datetime!(2024-01-01 00:00)));
        assert_eq!(query.to, Some(utc_datetime!(2024-02-01 00:00)));
        assert_eq!(query.media_type, Some(MediaType::Video));
        assert_eq!((query.sort, query.order, query.limit, query.offset), (SortBy::Name, Order::Asc, 10, 0));
    }

    #[test]
    fn test_list_defaults_match_index_defaults() {
        let cli = Cli::try_parse_from(["lumen", "list"]).unwrap();
        let Command::List(args) = cli.command else { panic!("expected list") };
        assert_eq!(args.query(), PhotoQuery::default());
    }

    #[rstest]
    #[case(&["lumen", "get", "7", "thumbnail", "-o", "t.jpg"])]
    #[case(&["lumen", "--config", "lumen.yaml", "index", "--limit", "5", "--wait"])]
    #[case(&["lumen", "next-batch"])]
    #[case(&["lumen", "cache", "rescan"])]
    fn test_parses(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[rstest]
    #[case(&["lumen", "get", "7", "poster", "-o", "t.jpg"])]
    #[case(&["lumen", "list", "--from", "2024-13-01"])]
    #[case(&["lumen", "get", "7", "thumbnail"])]
    #[case(&["lumen", "cache"])]
    fn test_rejects(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }
}
