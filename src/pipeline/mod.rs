//! Parallel download/convert/upload pipeline for monthly trip-data partitions.
//!
//! The run proceeds in three phases. First the canonical partition of each
//! service (the earliest month of the earliest year) is converted alone and
//! its layout captured as the service's reference schema, then uploaded
//! immediately. Second, every remaining partition is downloaded and converted
//! by a bounded worker pool, aligned to its service's reference. Third, the
//! converted files are uploaded with retries. A failed partition is logged
//! and skipped; it never aborts the run.

pub mod partition;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use url::Url;

use crate::align::{self, ReferenceSchema};
use crate::error::PipelineError;
use crate::formats::{delimited, parquet};
use crate::io::http::Downloader;
use crate::store::{self, ObjectSink};
use crate::telemetry::ProgressEvent;
use partition::Partition;

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub services: Vec<String>,
    pub years: Vec<u16>,
    pub base_url: Url,
    pub worker_count: usize,
    /// Scratch directory for downloaded and converted files
    pub work_dir: PathBuf,
}

impl PublishConfig {
    /// The partition whose layout becomes the service's reference schema:
    /// the first month of the earliest configured year.
    fn canonical(&self, service: &str) -> Option<Partition> {
        let year = self.years.iter().min().copied()?;
        Some(Partition::new(service, year, 1))
    }

    /// Every (service, year, month) combination in the run.
    fn all_partitions(&self) -> Vec<Partition> {
        let mut partitions = Vec::new();
        for service in &self.services {
            for &year in &self.years {
                for month in 1..=12 {
                    partitions.push(Partition::new(service.clone(), year, month));
                }
            }
        }
        partitions
    }
}

/// Outcome of a full publish run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishSummary {
    pub published: usize,
    pub failed: usize,
}

/// A partition converted locally and awaiting upload
struct ConvertedPartition {
    partition: Partition,
    parquet_path: PathBuf,
}

pub struct Publisher {
    sink: Arc<dyn ObjectSink>,
    downloader: Downloader,
    config: PublishConfig,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl Publisher {
    pub fn new(sink: Arc<dyn ObjectSink>, downloader: Downloader, config: PublishConfig) -> Self {
        assert!(config.worker_count > 0, "worker count must be positive");
        Self {
            sink,
            downloader,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run the whole pipeline. Only a missing destination bucket is fatal;
    /// per-partition failures are counted in the summary.
    pub async fn run(&self) -> Result<PublishSummary, PipelineError> {
        self.sink.ensure_bucket().await?;

        let result = self.run_inner().await;

        // Scratch files from failed partitions must not survive the run
        self.cleanup_leftovers().await;

        result
    }

    async fn run_inner(&self) -> Result<PublishSummary, PipelineError> {
        let mut summary = PublishSummary::default();

        // Phase 1: canonical partition per service; captures the reference
        // schema and uploads immediately
        let mut references: HashMap<String, ReferenceSchema> = HashMap::new();
        let mut canonical: Vec<Partition> = Vec::new();
        for service in &self.config.services {
            let Some(partition) = self.config.canonical(service) else {
                continue;
            };
            canonical.push(partition.clone());

            match self.prepare_canonical(&partition).await {
                Ok((reference, parquet_path)) => {
                    references.insert(service.clone(), reference);
                    match self.upload(&partition, &parquet_path).await {
                        Ok(()) => summary.published += 1,
                        Err(_) => summary.failed += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!(partition = %partition, error = %e, "canonical partition failed; service publishes unaligned");
                    summary.failed += 1;
                    self.notify(ProgressEvent::PartitionFailed {
                        key: partition.to_string(),
                    })
                    .await;
                }
            }
        }

        // Phase 2: bounded fan-out of download + convert for the rest
        let mut join_set: JoinSet<Result<ConvertedPartition, Partition>> = JoinSet::new();
        let mut converted: Vec<ConvertedPartition> = Vec::new();

        for partition in self.config.all_partitions() {
            if canonical.contains(&partition) {
                continue;
            }

            while join_set.len() >= self.config.worker_count {
                if let Some(result) = join_set.join_next().await {
                    self.collect(result, &mut converted, &mut summary).await;
                }
            }

            let downloader = self.downloader.clone();
            let base_url = self.config.base_url.clone();
            let work_dir = self.config.work_dir.clone();
            let reference = references.get(&partition.service).cloned();
            let progress = self.progress.clone();

            join_set.spawn(async move {
                if let Some(sender) = &progress {
                    let _ = sender
                        .send(ProgressEvent::PartitionStarted {
                            key: partition.to_string(),
                        })
                        .await;
                }

                match prepare_partition(&downloader, &partition, &base_url, &work_dir, reference.as_ref())
                    .await
                {
                    Ok((parquet_path, rows)) => {
                        if let Some(sender) = &progress {
                            let _ = sender
                                .send(ProgressEvent::PartitionConverted {
                                    key: partition.to_string(),
                                    rows,
                                })
                                .await;
                        }
                        Ok(ConvertedPartition {
                            partition,
                            parquet_path,
                        })
                    }
                    Err(e) => {
                        tracing::warn!(partition = %partition, error = %e, "partition failed");
                        Err(partition)
                    }
                }
            });
        }

        while let Some(result) = join_set.join_next().await {
            self.collect(result, &mut converted, &mut summary).await;
        }

        // Phase 3: upload the converted files
        for item in converted {
            match self.upload(&item.partition, &item.parquet_path).await {
                Ok(()) => summary.published += 1,
                Err(_) => summary.failed += 1,
            }
        }

        Ok(summary)
    }

    /// Convert the canonical partition and capture its layout.
    async fn prepare_canonical(
        &self,
        partition: &Partition,
    ) -> Result<(ReferenceSchema, PathBuf), PipelineError> {
        self.notify(ProgressEvent::PartitionStarted {
            key: partition.to_string(),
        })
        .await;

        let (parquet_path, rows) = prepare_partition(
            &self.downloader,
            partition,
            &self.config.base_url,
            &self.config.work_dir,
            None,
        )
        .await?;

        let batch = parquet::read_file(&parquet_path)
            .map_err(|e| PipelineError::source_unavailable(parquet_path.display().to_string(), e))?;
        let reference = align::capture_reference(&batch);

        tracing::info!(
            partition = %partition,
            columns = reference.columns.len(),
            "reference schema captured"
        );
        self.notify(ProgressEvent::PartitionConverted {
            key: partition.to_string(),
            rows,
        })
        .await;

        Ok((reference, parquet_path))
    }

    async fn upload(&self, partition: &Partition, parquet_path: &PathBuf) -> Result<(), PipelineError> {
        let result = store::upload_with_retry(&*self.sink, &partition.object_key(), parquet_path).await;

        match &result {
            Ok(()) => {
                let _ = tokio::fs::remove_file(parquet_path).await;
                self.notify(ProgressEvent::PartitionUploaded {
                    key: partition.to_string(),
                })
                .await;
            }
            Err(e) => {
                tracing::warn!(partition = %partition, error = %e, "upload failed");
                self.notify(ProgressEvent::PartitionFailed {
                    key: partition.to_string(),
                })
                .await;
            }
        }

        result
    }

    async fn collect(
        &self,
        result: Result<Result<ConvertedPartition, Partition>, tokio::task::JoinError>,
        converted: &mut Vec<ConvertedPartition>,
        summary: &mut PublishSummary,
    ) {
        match result {
            Ok(Ok(item)) => converted.push(item),
            Ok(Err(partition)) => {
                summary.failed += 1;
                self.notify(ProgressEvent::PartitionFailed {
                    key: partition.to_string(),
                })
                .await;
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "worker task panicked");
                summary.failed += 1;
            }
        }
    }

    async fn notify(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(event).await;
        }
    }

    /// Remove scratch files left behind by failed partitions.
    async fn cleanup_leftovers(&self) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.config.work_dir).await else {
            return;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();

            let is_scratch = self.config.services.iter().any(|service| {
                name.starts_with(&format!("{service}_tripdata_"))
                    && (name.ends_with(".parquet") || name.ends_with(".csv.gz"))
            });

            if is_scratch {
                if tokio::fs::remove_file(entry.path()).await.is_ok() {
                    tracing::debug!(file = %name, "removed leftover scratch file");
                }
            }
        }
    }
}

/// Download one partition and convert it to an aligned parquet file.
///
/// Returns the parquet path and the row count. The downloaded CSV is removed
/// whether or not conversion succeeds.
async fn prepare_partition(
    downloader: &Downloader,
    partition: &Partition,
    base_url: &Url,
    work_dir: &std::path::Path,
    reference: Option<&ReferenceSchema>,
) -> Result<(PathBuf, usize), PipelineError> {
    let url = partition
        .source_url(base_url)
        .map_err(|e| PipelineError::source_unavailable(partition.to_string(), e))?;
    let csv_path = partition.csv_path(work_dir);
    let parquet_path = partition.parquet_path(work_dir);

    let result = convert(downloader, &url, &csv_path, &parquet_path, reference).await;

    let _ = tokio::fs::remove_file(&csv_path).await;

    result.map(|rows| (parquet_path, rows))
}

async fn convert(
    downloader: &Downloader,
    url: &Url,
    csv_path: &std::path::Path,
    parquet_path: &std::path::Path,
    reference: Option<&ReferenceSchema>,
) -> Result<usize, PipelineError> {
    downloader.fetch_to_file(url, csv_path).await?;

    // Decode, align, and re-encode on a blocking thread; months run to
    // multiple gigabytes
    let source = url.clone();
    let csv_path = csv_path.to_path_buf();
    let parquet_path = parquet_path.to_path_buf();
    let reference = reference.cloned();

    tokio::task::spawn_blocking(move || {
        let batch = delimited::read_file(&csv_path)
            .map_err(|e| PipelineError::source_unavailable(source.as_str(), e))?;

        let batch = align::normalize_ambiguous(&batch)?;
        let batch = match &reference {
            Some(reference) => align::align(&batch, reference)?,
            None => batch,
        };

        let rows = batch.num_rows();
        parquet::write_file(&batch, &parquet_path)
            .map_err(|e| PipelineError::sink_write(parquet_path.display().to_string(), e))?;

        Ok(rows)
    })
    .await
    .map_err(|e| PipelineError::source_unavailable(url.as_str(), anyhow::Error::from(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(services: &[&str], years: &[u16]) -> PublishConfig {
        PublishConfig {
            services: services.iter().map(|s| s.to_string()).collect(),
            years: years.to_vec(),
            base_url: Url::parse("https://example.com/download/").unwrap(),
            worker_count: 4,
            work_dir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn test_canonical_is_first_month_of_earliest_year() {
        let config = config(&["yellow", "green"], &[2020, 2019]);

        assert_eq!(
            config.canonical("yellow"),
            Some(Partition::new("yellow", 2019, 1))
        );
    }

    #[test]
    fn test_all_partitions_covers_every_month() {
        let config = config(&["yellow", "green"], &[2019, 2020]);

        let partitions = config.all_partitions();

        assert_eq!(partitions.len(), 2 * 2 * 12);
        assert!(partitions.contains(&Partition::new("green", 2020, 12)));
        assert!(partitions.contains(&Partition::new("yellow", 2019, 1)));
    }
}
