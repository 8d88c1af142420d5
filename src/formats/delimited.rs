//! CSV reading, with transparent gzip decompression.
//!
//! Trip-data months are published as plain `.csv` or `.csv.gz`; the two are
//! treated interchangeably by sniffing the file extension. The schema is
//! inferred from a bounded sample of the leading records, then the whole file
//! is decoded into a single RecordBatch.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::record_batch::RecordBatch;
use flate2::read::GzDecoder;

use crate::config::{CSV_BATCH_SIZE, CSV_INFER_MAX_RECORDS};

/// Create a reader that handles both .csv and .csv.gz files.
fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let path_str = path.to_string_lossy();
    if path_str.ends_with(".gz") {
        Ok(Box::new(GzDecoder::new(reader)))
    } else if path_str.ends_with(".csv") {
        Ok(Box::new(reader))
    } else {
        bail!("Unsupported delimited file extension: {}", path.display());
    }
}

/// Read an entire CSV file (optionally gzipped) into one RecordBatch.
///
/// The gzip stream cannot rewind, so the file is opened twice: once to infer
/// the schema from the leading records and once to decode.
pub fn read_file(path: &Path) -> Result<RecordBatch> {
    let format = Format::default().with_header(true);

    let (schema, _) = format
        .infer_schema(open_reader(path)?, Some(CSV_INFER_MAX_RECORDS))
        .with_context(|| format!("Failed to infer CSV schema for {}", path.display()))?;
    let schema = std::sync::Arc::new(schema);

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(open_reader(path)?)
        .with_context(|| format!("Failed to open CSV reader for {}", path.display()))?;

    let batches: Vec<RecordBatch> = reader
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Failed to decode CSV records from {}", path.display()))?;

    concat_batches(&schema, &batches)
        .with_context(|| format!("Failed to assemble record batch from {}", path.display()))
}
