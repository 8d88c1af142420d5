//! Configuration constants for the trip-data loader
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Chunked Loader Configuration
// ============================================================================

/// Default number of rows per load chunk
///
/// Each chunk is written to the sink inside its own transaction, so this
/// bounds both memory pressure on the server and the amount of work lost on a
/// mid-run failure. 100k rows of trip data is a few tens of megabytes.
pub const DEFAULT_CHUNK_ROWS: usize = 100_000;

/// Number of rows packed into a single multi-row INSERT statement
///
/// Postgres caps bind parameters at 65535 per statement; taxi trip tables
/// carry ~20 columns, so 1000 rows stays comfortably below the limit while
/// amortizing statement overhead.
pub const INSERT_BATCH_ROWS: usize = 1_000;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

// ============================================================================
// Publish Pipeline Configuration
// ============================================================================

/// Fixed size of the download/convert worker pool
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Per-request timeout for a partition download
///
/// A partition that cannot be fetched within this window is marked failed and
/// skipped; it is not retried indefinitely.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of upload attempts before a partition is reported as failed
pub const UPLOAD_MAX_RETRIES: u32 = 3;

/// Fixed delay between upload attempts
pub const UPLOAD_RETRY_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// Format Configuration
// ============================================================================

/// Number of records sampled when inferring a CSV schema
///
/// Trip-data files are homogeneous after the first few thousand rows; a
/// bounded sample keeps inference cheap on multi-gigabyte months.
pub const CSV_INFER_MAX_RECORDS: usize = 1_000;

/// Batch size used when decoding CSV into record batches
pub const CSV_BATCH_SIZE: usize = 8_192;
