//! Schema alignment across partitions of a dataset family.
//!
//! One canonical partition per family (the first published month) establishes
//! a [`ReferenceSchema`]: its column order plus a semantic target type per
//! column. Every other partition is reshaped to that layout before it is
//! written anywhere, so a family stays loadable into a single table or
//! queryable as one parquet dataset even when individual months drift
//! (columns added or removed, integer columns that suddenly carry missing
//! values, timestamps serialized as strings).
//!
//! Value-level problems are coerced to NULL rather than failing a partition;
//! only a column that cannot be reconciled at all raises
//! [`PipelineError::Alignment`].

use std::sync::Arc;

use arrow::array::{ArrayRef, new_null_array};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow::util::display::FormatOptions;

use crate::error::PipelineError;

/// Columns whose representation varies across months regardless of the rest
/// of the schema; normalized to Float64 before capture and before alignment
/// so the reference shape is stable for the whole family.
const AMBIGUOUS_COLUMNS: &[&str] = &["passenger_count", "trip_type"];

/// Semantic target type recorded for a reference column.
///
/// A deliberately small vocabulary: every integer column is promoted to a
/// nullable 64-bit representation at capture time, anticipating partitions
/// where a column that happens to be fully populated in the canonical month
/// carries missing values.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticType {
    IntegerNullable,
    Float,
    Timestamp,
    Text,
    Other(DataType),
}

impl SemanticType {
    fn of(data_type: &DataType) -> Self {
        use DataType::*;
        match data_type {
            Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 => {
                SemanticType::IntegerNullable
            }
            Float16 | Float32 | Float64 => SemanticType::Float,
            Timestamp(_, _) | Date32 | Date64 => SemanticType::Timestamp,
            Utf8 | LargeUtf8 => SemanticType::Text,
            other => SemanticType::Other(other.clone()),
        }
    }

    /// The concrete arrow type aligned columns are materialized as.
    pub fn arrow_type(&self) -> DataType {
        match self {
            SemanticType::IntegerNullable => DataType::Int64,
            SemanticType::Float => DataType::Float64,
            // Microsecond precision, non-zoned: what parquet trip data carries
            SemanticType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            SemanticType::Text => DataType::Utf8,
            SemanticType::Other(dt) => dt.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceColumn {
    pub name: String,
    pub semantic: SemanticType,
}

/// The canonical column-order/type layout all partitions of a family must
/// conform to. Captured once per run and immutable thereafter.
#[derive(Debug, Clone)]
pub struct ReferenceSchema {
    pub columns: Vec<ReferenceColumn>,
}

impl ReferenceSchema {
    /// Arrow schema of an aligned partition. Every column is nullable since
    /// alignment introduces nulls for missing columns and coerced values.
    pub fn arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.semantic.arrow_type(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// Capture the reference layout from a canonical partition.
///
/// Run [`normalize_ambiguous`] on the batch first so the known-unstable
/// columns are recorded with their canonical representation.
pub fn capture_reference(batch: &RecordBatch) -> ReferenceSchema {
    let columns = batch
        .schema()
        .fields()
        .iter()
        .map(|field| ReferenceColumn {
            name: field.name().clone(),
            semantic: SemanticType::of(field.data_type()),
        })
        .collect();
    ReferenceSchema { columns }
}

/// Normalize the small fixed set of known-ambiguous columns to Float64.
///
/// Runs before reference capture and before alignment, so these columns are
/// stable across the family regardless of per-partition quirks (string-typed
/// counts, missing values in an integer month, ...).
pub fn normalize_ambiguous(batch: &RecordBatch) -> Result<RecordBatch, PipelineError> {
    let lenient = lenient_cast();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns = Vec::with_capacity(batch.num_columns());

    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        if AMBIGUOUS_COLUMNS.contains(&field.name().as_str())
            && field.data_type() != &DataType::Float64
        {
            let coerced = coerce_to_float(column, &lenient)
                .map_err(|e| PipelineError::alignment(field.name(), e.to_string()))?;
            fields.push(Field::new(field.name(), DataType::Float64, true));
            columns.push(coerced);
        } else {
            fields.push(field.as_ref().clone());
            columns.push(column.clone());
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| PipelineError::alignment("<batch>", e.to_string()))
}

/// Reshape a partition to exactly match the reference layout.
///
/// Columns are re-projected to the reference's list and order: columns the
/// input lacks become all-null arrays, columns the reference lacks are
/// dropped. Each retained column is then converted to the reference's
/// recorded type, coercing unconvertible values to null. The result's column
/// set, order, and types equal the reference's, and aligning an already
/// aligned batch is a no-op.
pub fn align(batch: &RecordBatch, reference: &ReferenceSchema) -> Result<RecordBatch, PipelineError> {
    let lenient = lenient_cast();
    let strict = strict_cast();
    let num_rows = batch.num_rows();

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(reference.columns.len());
    for column in &reference.columns {
        let target = column.semantic.arrow_type();

        let source = match batch.column_by_name(&column.name) {
            Some(array) => array.clone(),
            None => {
                columns.push(new_null_array(&target, num_rows));
                continue;
            }
        };

        if source.data_type() == &target {
            columns.push(source);
            continue;
        }

        let converted = match &column.semantic {
            // Parse leniently; unparseable values become null
            SemanticType::Timestamp => cast_with_options(&source, &target, &lenient),
            // Coerce malformed values to null before casting down to integer
            SemanticType::IntegerNullable => coerce_to_float(&source, &lenient)
                .and_then(|floats| cast_with_options(&floats, &target, &lenient)),
            // Direct cast first; on failure fall back to numeric
            // coercion-with-null and retry
            _ => cast_with_options(&source, &target, &strict).or_else(|_| {
                coerce_to_float(&source, &lenient)
                    .and_then(|floats| cast_with_options(&floats, &target, &lenient))
            }),
        }
        .map_err(|e| PipelineError::alignment(&column.name, e.to_string()))?;

        columns.push(converted);
    }

    RecordBatch::try_new(reference.arrow_schema(), columns)
        .map_err(|e| PipelineError::alignment("<batch>", e.to_string()))
}

fn coerce_to_float(
    array: &ArrayRef,
    options: &CastOptions,
) -> Result<ArrayRef, arrow::error::ArrowError> {
    cast_with_options(array, &DataType::Float64, options)
}

fn lenient_cast() -> CastOptions<'static> {
    CastOptions {
        safe: true,
        format_options: FormatOptions::default(),
    }
}

fn strict_cast() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        format_options: FormatOptions::default(),
    }
}
