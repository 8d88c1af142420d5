//! High-level runner API for the trip-data loader.
//!
//! This module provides the public interface that encapsulates connection
//! setup, source resolution, progress tracking, and pipeline wiring.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use url::Url;

pub use crate::config::{DEFAULT_CHUNK_ROWS, DEFAULT_WORKER_COUNT};
use crate::config::{DOWNLOAD_TIMEOUT, INSERT_BATCH_ROWS};
use crate::db::pool::{self as db_pool, DbArgsBuilder};
use crate::formats::{delimited, parquet};
use crate::io::http::Downloader;
use crate::io::uri::SourceUri;
use crate::loader::ChunkedLoader;
use crate::pipeline::{PublishConfig, Publisher, PublishSummary};
use crate::store::S3Sink;
use crate::telemetry::{ProgressEvent, ProgressStats};

/// File format of the source data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

impl SourceFormat {
    /// Parse format from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "parquet" => Ok(SourceFormat::Parquet),
            _ => Err(anyhow::anyhow!(
                "Unsupported format: {}. Supported formats: csv, parquet",
                s
            )),
        }
    }
}

/// Arguments for running an ingest operation
#[derive(Debug, Clone)]
pub struct IngestArgs {
    // Connection configuration
    pub pg_username: String,
    pub pg_password: String,
    pub pg_host: String,
    pub pg_port: u16,
    pub pg_database: String,

    // Source configuration
    pub source_uri: String,
    pub target_table: String,
    pub format: SourceFormat,

    // Performance tuning
    pub chunk_size: usize,

    // Options
    pub quiet: bool,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<crate::db::pool::Pool>,
}

/// Result of a completed ingest operation
#[derive(Debug)]
pub struct IngestResult {
    pub rows_loaded: u64,
    pub chunks_written: usize,
    pub duration: Duration,
}

/// Run an ingest: read the source file and bulk-load it into a table.
///
/// The destination table is replaced. Remote (http/https) sources are
/// downloaded to scratch space first; local paths are read in place.
pub async fn run_ingest(args: IngestArgs) -> Result<IngestResult> {
    anyhow::ensure!(args.chunk_size > 0, "chunk size must be at least 1");

    let start = Instant::now();

    // Create connection pool (or use test pool if provided)
    #[cfg(test)]
    let pool = if let Some(test_pool) = args.test_pool {
        test_pool
    } else {
        connect(&args).await?
    };

    #[cfg(not(test))]
    let pool = connect(&args).await?;

    // Resolve the source to a local file
    let parsed_uri = SourceUri::parse(&args.source_uri)?;
    let _scratch: Option<TempDir>;
    let local_path: PathBuf = match &parsed_uri {
        SourceUri::Local(path) => {
            _scratch = None;
            path.clone()
        }
        SourceUri::Http(url) => {
            let temp_dir = TempDir::new().context("Failed to create scratch directory")?;
            let file_name = parsed_uri
                .file_name()
                .unwrap_or_else(|| "source.dat".to_string());
            let dest = temp_dir.path().join(file_name);

            let downloader = Downloader::new(DOWNLOAD_TIMEOUT)?;
            downloader.fetch_to_file(url, &dest).await?;

            _scratch = Some(temp_dir);
            dest
        }
    };

    let batch = read_source(&local_path, args.format).await?;
    tracing::info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        source = %local_path.display(),
        "source read"
    );

    // Progress bar fed by loader events; only wired when it will be drawn,
    // an unconsumed channel would stall the loader once full
    let mut loader = ChunkedLoader::new(pool, args.chunk_size, INSERT_BATCH_ROWS);
    let bar_task = if args.quiet {
        None
    } else {
        let (progress_tx, progress_rx) = mpsc::channel(64);
        let expected_chunks = batch.num_rows().div_ceil(args.chunk_size);
        loader = loader.with_progress(progress_tx);
        Some(spawn_chunk_bar(expected_chunks as u64, progress_rx))
    };
    let report = loader.load(&args.target_table, &batch).await?;

    // Close the channel so the bar task can finish
    drop(loader);
    if let Some(task) = bar_task {
        let _ = task.await;
    }

    Ok(IngestResult {
        rows_loaded: report.rows_loaded,
        chunks_written: report.chunks_written,
        duration: start.elapsed(),
    })
}

async fn connect(args: &IngestArgs) -> Result<db_pool::Pool> {
    let db_args = DbArgsBuilder::default()
        .username(&args.pg_username)
        .password(&args.pg_password)
        .host(&args.pg_host)
        .port(args.pg_port)
        .database(&args.pg_database)
        .build()?;
    db_pool::pool(db_args).await
}

/// Read the source file into a RecordBatch on a blocking thread.
async fn read_source(
    path: &Path,
    format: SourceFormat,
) -> Result<arrow::record_batch::RecordBatch> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || match format {
        SourceFormat::Csv => delimited::read_file(&path),
        SourceFormat::Parquet => parquet::read_file(&path),
    })
    .await
    .context("Source read task failed")?
}

fn spawn_chunk_bar(
    total_chunks: u64,
    mut progress_rx: mpsc::Receiver<ProgressEvent>,
) -> tokio::task::JoinHandle<()> {
    let bar = ProgressBar::new(total_chunks);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] Chunks: [{bar:30.cyan/blue}] {pos}/{len} ({percent}%) | {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    tokio::spawn(async move {
        let mut stats = ProgressStats::new();
        while let Some(event) = progress_rx.recv().await {
            stats.update(&event);
            bar.set_position(stats.chunks_loaded as u64);
            bar.set_message(format!("{} rows", stats.rows_loaded));
        }
        bar.finish();
    })
}

/// Arguments for running a publish operation
#[derive(Debug, Clone)]
pub struct PublishArgs {
    pub bucket: String,
    pub services: Vec<String>,
    pub years: Vec<u16>,
    pub base_url: String,
    pub worker_count: usize,
    pub work_dir: Option<PathBuf>,
    pub quiet: bool,
}

/// Result of a completed publish operation
#[derive(Debug)]
pub struct PublishResult {
    pub published: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// Run a publish: download every configured partition, convert to parquet
/// aligned per service, and upload to object storage.
pub async fn run_publish(args: PublishArgs) -> Result<PublishResult> {
    let start = Instant::now();

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let sink = Arc::new(S3Sink::new(s3_client, &args.bucket));

    let downloader = Downloader::new(DOWNLOAD_TIMEOUT)?;

    let _scratch: Option<TempDir>;
    let work_dir = match &args.work_dir {
        Some(dir) => {
            _scratch = None;
            dir.clone()
        }
        None => {
            let temp_dir = TempDir::new().context("Failed to create scratch directory")?;
            let path = temp_dir.path().to_path_buf();
            _scratch = Some(temp_dir);
            path
        }
    };

    let config = PublishConfig {
        services: args.services.clone(),
        years: args.years.clone(),
        base_url: Url::parse(&args.base_url).context("Invalid base URL")?,
        worker_count: args.worker_count,
        work_dir,
    };

    let total_partitions = (config.services.len() * config.years.len() * 12) as u64;

    let mut publisher = Publisher::new(sink, downloader, config);
    let bar_task = if args.quiet {
        None
    } else {
        let (progress_tx, progress_rx) = mpsc::channel(64);
        publisher = publisher.with_progress(progress_tx);
        Some(spawn_partition_bar(total_partitions, progress_rx))
    };
    let summary: PublishSummary = publisher.run().await?;

    drop(publisher);
    if let Some(task) = bar_task {
        let _ = task.await;
    }

    Ok(PublishResult {
        published: summary.published,
        failed: summary.failed,
        duration: start.elapsed(),
    })
}

fn spawn_partition_bar(
    total_partitions: u64,
    mut progress_rx: mpsc::Receiver<ProgressEvent>,
) -> tokio::task::JoinHandle<()> {
    let bar = ProgressBar::new(total_partitions);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "[{elapsed_precise}] Partitions: [{bar:30.green/blue}] {pos}/{len} ({percent}%) | {msg}",
            )
            .unwrap()
            .progress_chars("=>-"),
    );

    tokio::spawn(async move {
        let mut stats = ProgressStats::new();
        while let Some(event) = progress_rx.recv().await {
            stats.update(&event);
            bar.set_position(stats.partitions_settled() as u64);
            bar.set_message(format!(
                "{} started, {} converted, {} failed",
                stats.partitions_started, stats.partitions_converted, stats.partitions_failed
            ));
        }
        bar.finish();
    })
}
