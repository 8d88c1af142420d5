//! HTTP download of source partitions.

use std::path::Path;

use anyhow::Context;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::PipelineError;

/// Streams remote files to local scratch space.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// `timeout` bounds the connect phase and read inactivity, not the whole
    /// transfer; a monthly file streams for far longer than any fixed
    /// deadline, while a stalled connection still fails promptly.
    pub fn new(timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Download `url` to `dest`, streaming to disk.
    ///
    /// Any failure (connection, non-2xx status, truncated body) maps to
    /// [`PipelineError::SourceUnavailable`] so callers can skip the partition.
    pub async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<(), PipelineError> {
        let map_err =
            |cause: anyhow::Error| PipelineError::source_unavailable(url.as_str(), cause);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("Request failed")
            .map_err(map_err)?;

        let mut response = response
            .error_for_status()
            .context("Server returned error status")
            .map_err(map_err)?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))
            .map_err(map_err)?;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read response body")
            .map_err(map_err)?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write to {}", dest.display()))
                .map_err(map_err)?;
        }

        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", dest.display()))
            .map_err(map_err)?;

        tracing::debug!(url = %url, dest = %dest.display(), "download complete");
        Ok(())
    }
}
