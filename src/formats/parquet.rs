//! Parquet reading and writing.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

/// Read an entire parquet file into one RecordBatch.
pub fn read_file(path: &Path) -> Result<RecordBatch> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read parquet metadata from {}", path.display()))?;
    let schema = builder.schema().clone();

    let reader = builder
        .build()
        .with_context(|| format!("Failed to open parquet reader for {}", path.display()))?;

    let batches: Vec<RecordBatch> = reader
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Failed to decode parquet rows from {}", path.display()))?;

    concat_batches(&schema, &batches)
        .with_context(|| format!("Failed to assemble record batch from {}", path.display()))
}

/// Write a RecordBatch out as a parquet file, replacing any existing file.
pub fn write_file(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("Failed to open parquet writer for {}", path.display()))?;
    writer
        .write(batch)
        .with_context(|| format!("Failed to write rows to {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn sample_batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("vendor_id", DataType::Int64, true),
            Field::new("fare_amount", DataType::Float64, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(2), None])),
                Arc::new(Float64Array::from(vec![10.5, 7.25, 3.0])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_write_then_read_preserves_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trips.parquet");

        let batch = sample_batch();
        write_file(&batch, &path).unwrap();
        let read_back = read_file(&path).unwrap();

        assert_eq!(read_back, batch);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trips.parquet");

        write_file(&sample_batch(), &path).unwrap();

        let smaller = sample_batch().slice(0, 1);
        write_file(&smaller, &path).unwrap();

        let read_back = read_file(&path).unwrap();
        assert_eq!(read_back.num_rows(), 1);
    }

    #[test]
    fn test_read_missing_file_fails() {
        assert!(read_file(Path::new("/nonexistent/trips.parquet")).is_err());
    }
}
