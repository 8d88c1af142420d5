//! Object storage sink for published parquet files.

use std::path::Path;

use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::config::{UPLOAD_MAX_RETRIES, UPLOAD_RETRY_DELAY};
use crate::error::PipelineError;

/// Destination for converted partition files.
///
/// The production implementation is S3; tests substitute in-memory fakes.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Verify the destination bucket exists and is reachable.
    async fn ensure_bucket(&self) -> Result<(), PipelineError>;

    /// Upload a local file under `key`, replacing any existing object.
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), PipelineError>;
}

pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Sink {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    async fn ensure_bucket(&self) -> Result<(), PipelineError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| PipelineError::provisioning(&self.bucket, e.to_string()))?;
        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), PipelineError> {
        let target = format!("s3://{}/{}", self.bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| PipelineError::sink_write(&target, anyhow!(e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::sink_write(&target, anyhow!(e.to_string())))?;

        tracing::debug!(key, "object uploaded");
        Ok(())
    }
}

/// Upload with a bounded number of attempts and a fixed delay between them.
///
/// Transient store errors are common enough on large runs that one failed
/// PUT should not fail the partition outright.
pub async fn upload_with_retry(
    sink: &dyn ObjectSink,
    key: &str,
    path: &Path,
) -> Result<(), PipelineError> {
    let mut last_err = None;

    for attempt in 1..=UPLOAD_MAX_RETRIES {
        match sink.put_file(key, path).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(key, attempt, error = %e, "upload attempt failed");
                last_err = Some(e);
                if attempt < UPLOAD_MAX_RETRIES {
                    tokio::time::sleep(UPLOAD_RETRY_DELAY).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        PipelineError::sink_write(key, anyhow!("upload failed with no attempts made"))
    }))
}
