//! `lumen` command-line front end.

mod cli;
mod error;

use crate::cli::{CacheCommand, Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::{OptionExt, ResultExt};
use lumen_artifacts::ArtifactCache;
use lumen_config::{Config, StorageConfig};
use lumen_index::Database;
use lumen_library::Library;
use lumen_render::Renderer;
use lumen_storage::BackendHandle;
use lumen_storage::backend::{LocalBackend, S3Backend};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let library = open(&config).await?;
    let result = execute(&library, &config, cli.command).await;
    library.close().await;
    result
}

async fn open(config: &Config) -> Result<Library> {
    let storage: BackendHandle = match &config.storage {
        StorageConfig::Local { root } => {
            Arc::new(LocalBackend::new("local", root).or_raise(|| ErrorKind::Setup("object store"))?)
        },
        s3 @ StorageConfig::S3 { .. } => {
            let options = s3.s3_options().ok_or_raise(|| ErrorKind::Config)?;
            Arc::new(S3Backend::new("s3", options).or_raise(|| ErrorKind::Setup("object store"))?)
        },
    };
    let database = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Setup("index database"))?;
    let cache = ArtifactCache::open(config.cache.options()).await.or_raise(|| ErrorKind::Setup("artifact cache"))?;
    let renderer = match &config.artifacts.ffmpeg {
        Some(ffmpeg) => Renderer::with_ffmpeg(config.artifacts.render_options(), Some(ffmpeg.clone())),
        None => Renderer::new(config.artifacts.render_options()),
    };
    tracing::debug!(backend = storage.name(), database = %config.database.path.display(), "library opened");
    Ok(Library::new(storage, database, cache, renderer, config.indexing.library_options()))
}

async fn execute(library: &Library, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Index { limit, wait } => {
            let summary = match limit {
                Some(limit) => library.indexer().run(limit).await,
                None => library.trigger_index().await,
            }
            .or_raise(|| ErrorKind::Library)?;
            println!(
                "{} objects in store: {} indexed, {} failed{}",
                summary.total,
                summary.indexed,
                summary.failed,
                if summary.background_indexing { ", continuing in background" } else { "" },
            );
            if summary.background_indexing {
                if wait {
                    library.indexer().wait().await;
                    let status = library.indexing_status();
                    println!("{}: {} of {} indexed, {} failed", status.phase, status.indexed, status.total, status.failed);
                } else {
                    // The background task dies with the process.
                    tracing::info!("exiting before background indexing finished; pass --wait to let it complete");
                }
            }
        },
        Command::NextBatch { count } => {
            let batch = library
                .trigger_next_batch(count.unwrap_or(config.indexing.batch_size))
                .await
                .or_raise(|| ErrorKind::Library)?;
            println!("{} indexed, {} failed, {} remaining", batch.indexed, batch.failed, batch.remaining);
        },
        Command::List(args) => {
            let page = library.get_page(&args.query()).await.or_raise(|| ErrorKind::Library)?;
            for record in &page.items {
                let size = match (record.width, record.height) {
                    (Some(width), Some(height)) => format!("{width}x{height}"),
                    _ => "-".to_string(),
                };
                println!(
                    "{:>8}  {}  {:<5}  {:>11}  {}",
                    record.id, record.created_at, record.media_type, size, record.remote_key,
                );
            }
            println!("{} of {} shown{}", page.items.len(), page.total, if page.has_more { ", more available" } else { "" });
        },
        Command::Histogram => {
            for day in library.date_histogram().await.or_raise(|| ErrorKind::Library)? {
                println!("{}  {}", day.date, day.count);
            }
        },
        Command::Get { id, kind, output } => {
            let artifact = library.get_artifact(id, kind.into()).await.or_raise(|| ErrorKind::Library)?;
            tokio::fs::write(&output, &artifact.bytes).await.or_raise(|| ErrorKind::Output(output.clone()))?;
            println!("wrote {} bytes of {} to {}", artifact.bytes.len(), artifact.mime_type, output.display());
        },
        Command::Delete { id } => {
            library.delete(id).await.or_raise(|| ErrorKind::Library)?;
            println!("deleted {id}");
        },
        Command::Cache { command } => match command {
            CacheCommand::Stats => {
                let stats = library.cache_stats();
                println!("items      {}", stats.item_count);
                println!("size       {} / {} bytes", stats.total_size, stats.max_size);
                println!("hits       {}", stats.hits);
                println!("misses     {}", stats.misses);
                println!("hit ratio  {:.3}", stats.hit_ratio);
            },
            CacheCommand::Clear => {
                let removed = library.clear_cache().await.or_raise(|| ErrorKind::Library)?;
                println!("removed {removed} artifacts");
            },
            CacheCommand::Rescan => {
                let found = library.rescan_cache().await.or_raise(|| ErrorKind::Library)?;
                let stats = library.cache_stats();
                println!("found {found} artifacts, {} bytes", stats.total_size);
            },
        },
    }
    Ok(())
}
