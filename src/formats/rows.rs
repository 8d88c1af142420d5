//! Conversion from Arrow RecordBatch to string-based rows.
//!
//! The loader binds values by the target SQL type, so the columnar batch is
//! flattened to rows of strings first. Nulls become empty strings; the loader
//! turns those back into typed NULLs at bind time.

use anyhow::{Context, Result};
use arrow::array::*;
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    TimeUnit, TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;

/// Flatten a RecordBatch to rows of string fields.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Vec<String>>> {
    let num_rows = batch.num_rows();
    let num_columns = batch.num_columns();

    if num_rows == 0 {
        return Ok(Vec::new());
    }

    let mut column_strings: Vec<Vec<String>> = Vec::with_capacity(num_columns);
    for col_idx in 0..num_columns {
        let array = batch.column(col_idx);
        let strings = array_to_strings(array).with_context(|| {
            format!(
                "Failed to convert column {} ({:?}) to strings",
                col_idx,
                array.data_type()
            )
        })?;
        column_strings.push(strings);
    }

    // Transpose to rows
    let mut rows = Vec::with_capacity(num_rows);
    for row_idx in 0..num_rows {
        rows.push(
            column_strings
                .iter()
                .map(|col| col[row_idx].clone())
                .collect(),
        );
    }

    Ok(rows)
}

/// Convert an Arrow array to a vector of string representations
fn array_to_strings(array: &dyn Array) -> Result<Vec<String>> {
    let mut strings = Vec::with_capacity(array.len());

    match array.data_type() {
        DataType::Boolean => {
            let arr = as_boolean_array(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    arr.value(i).to_string()
                });
            }
        }
        DataType::Int8 => convert_primitive::<Int8Type>(array, &mut strings),
        DataType::Int16 => convert_primitive::<Int16Type>(array, &mut strings),
        DataType::Int32 => convert_primitive::<Int32Type>(array, &mut strings),
        DataType::Int64 => convert_primitive::<Int64Type>(array, &mut strings),
        DataType::UInt8 => convert_primitive::<UInt8Type>(array, &mut strings),
        DataType::UInt16 => convert_primitive::<UInt16Type>(array, &mut strings),
        DataType::UInt32 => convert_primitive::<UInt32Type>(array, &mut strings),
        DataType::UInt64 => convert_primitive::<UInt64Type>(array, &mut strings),
        DataType::Float32 => convert_primitive::<Float32Type>(array, &mut strings),
        DataType::Float64 => convert_primitive::<Float64Type>(array, &mut strings),
        DataType::Utf8 => {
            let arr = as_string_array(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    arr.value(i).to_string()
                });
            }
        }
        DataType::LargeUtf8 => {
            let arr = as_largestring_array(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    arr.value(i).to_string()
                });
            }
        }
        DataType::Date32 => {
            let arr = as_primitive_array::<Date32Type>(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    let days = arr.value(i);
                    let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                        .unwrap()
                        .checked_add_signed(chrono::Duration::days(days as i64))
                        .context("Invalid date")?;
                    date.format("%Y-%m-%d").to_string()
                });
            }
        }
        DataType::Timestamp(unit, _) => {
            convert_timestamp(array, unit, &mut strings)?;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported array type for conversion: {:?}",
                array.data_type()
            ));
        }
    }

    Ok(strings)
}

/// Helper to convert primitive arrays
fn convert_primitive<T: ArrowPrimitiveType>(array: &dyn Array, strings: &mut Vec<String>)
where
    T::Native: std::fmt::Display,
{
    let arr = as_primitive_array::<T>(array);
    for i in 0..arr.len() {
        strings.push(if arr.is_null(i) {
            String::new()
        } else {
            arr.value(i).to_string()
        });
    }
}

/// Convert timestamp arrays to strings
fn convert_timestamp(array: &dyn Array, unit: &TimeUnit, strings: &mut Vec<String>) -> Result<()> {
    match unit {
        TimeUnit::Second => {
            let arr = as_primitive_array::<TimestampSecondType>(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    let seconds = arr.value(i);
                    let datetime = chrono::DateTime::from_timestamp(seconds, 0)
                        .context("Invalid timestamp")?;
                    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
                });
            }
        }
        TimeUnit::Millisecond => {
            let arr = as_primitive_array::<TimestampMillisecondType>(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    let millis = arr.value(i);
                    let datetime = chrono::DateTime::from_timestamp_millis(millis)
                        .context("Invalid timestamp")?;
                    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
                });
            }
        }
        TimeUnit::Microsecond => {
            let arr = as_primitive_array::<TimestampMicrosecondType>(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    let micros = arr.value(i);
                    let datetime = chrono::DateTime::from_timestamp_micros(micros)
                        .context("Invalid timestamp")?;
                    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
                });
            }
        }
        TimeUnit::Nanosecond => {
            let arr = as_primitive_array::<TimestampNanosecondType>(array);
            for i in 0..arr.len() {
                strings.push(if arr.is_null(i) {
                    String::new()
                } else {
                    let nanos = arr.value(i);
                    let datetime = chrono::DateTime::from_timestamp_nanos(nanos);
                    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_batch_to_rows_mixed_types() {
        let schema = Schema::new(vec![
            Field::new("vendor_id", DataType::Int64, true),
            Field::new("zone", DataType::Utf8, true),
            Field::new("fare_amount", DataType::Float64, true),
        ]);

        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(2)])),
                Arc::new(StringArray::from(vec![Some("Astoria"), None])),
                Arc::new(Float64Array::from(vec![Some(10.5), None])),
            ],
        )
        .unwrap();

        let rows = batch_to_rows(&batch).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["1", "Astoria", "10.5"]);
        assert_eq!(rows[1], vec!["2", "", ""]); // Nulls become empty strings
    }

    #[test]
    fn test_batch_to_rows_timestamps() {
        let schema = Schema::new(vec![Field::new(
            "pickup",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        )]);

        // 2019-01-01 00:30:00 UTC
        let micros = 1_546_302_600_000_000i64;
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(TimestampMicrosecondArray::from(vec![
                Some(micros),
                None,
            ]))],
        )
        .unwrap();

        let rows = batch_to_rows(&batch).unwrap();

        assert_eq!(rows[0], vec!["2019-01-01 00:30:00"]);
        assert_eq!(rows[1], vec![""]);
    }

    #[test]
    fn test_batch_to_rows_empty() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from(Vec::<i64>::new()))],
        )
        .unwrap();

        let rows = batch_to_rows(&batch).unwrap();

        assert!(rows.is_empty());
    }
}
