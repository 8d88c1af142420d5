//! Chunked bulk loading of a RecordBatch into a database table.
//!
//! The destination table is replaced (dropped and recreated from the batch's
//! schema), then the batch is written in fixed-size chunks. Each chunk commits
//! in its own transaction, so a mid-run failure loses at most one chunk of
//! work and never leaves a partially written chunk behind.

use anyhow::{Context, Result, anyhow};
use arrow::record_batch::RecordBatch;
use tokio::sync::mpsc;

use crate::db::pool::{Pool, PoolConnection};
use crate::db::schema::{SqlType, TableSchema};
use crate::error::PipelineError;
use crate::formats::rows::batch_to_rows;
use crate::telemetry::ProgressEvent;

/// Outcome of a completed load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub rows_loaded: u64,
    pub chunks_written: usize,
}

pub struct ChunkedLoader {
    pool: Pool,
    /// Rows per transaction
    chunk_rows: usize,
    /// Rows per INSERT statement within a chunk
    insert_batch_rows: usize,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl ChunkedLoader {
    pub fn new(pool: Pool, chunk_rows: usize, insert_batch_rows: usize) -> Self {
        assert!(chunk_rows > 0, "chunk size must be positive");
        assert!(insert_batch_rows > 0, "insert batch size must be positive");
        Self {
            pool,
            chunk_rows,
            insert_batch_rows,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Replace `table_name` with the contents of `batch`.
    ///
    /// An empty batch still replaces the table, leaving it empty with the
    /// batch's column layout.
    pub async fn load(
        &self,
        table_name: &str,
        batch: &RecordBatch,
    ) -> Result<LoadReport, PipelineError> {
        let schema = TableSchema::from_arrow(table_name, &batch.schema())
            .map_err(|e| PipelineError::provisioning(table_name, e.to_string()))?;

        self.replace_table(&schema).await?;

        let bounds = chunk_bounds(batch.num_rows(), self.chunk_rows);
        let mut rows_loaded = 0u64;

        for (chunk_index, (offset, length)) in bounds.iter().enumerate() {
            let chunk = batch.slice(*offset, *length);
            self.append_chunk(&schema, &chunk)
                .await
                .map_err(|e| PipelineError::sink_write(table_name, e))?;

            rows_loaded += *length as u64;
            tracing::debug!(table_name, chunk_index, rows = length, "chunk committed");

            if let Some(sender) = &self.progress {
                let _ = sender
                    .send(ProgressEvent::ChunkLoaded {
                        chunk_index,
                        rows: *length,
                    })
                    .await;
            }
        }

        Ok(LoadReport {
            rows_loaded,
            chunks_written: bounds.len(),
        })
    }

    /// Drop and recreate the destination table from the batch layout.
    async fn replace_table(&self, schema: &TableSchema) -> Result<(), PipelineError> {
        self.pool
            .execute(&schema.drop_ddl())
            .await
            .map_err(|e| PipelineError::provisioning(&schema.table_name, e.to_string()))?;
        self.pool
            .execute(&schema.create_ddl())
            .await
            .map_err(|e| PipelineError::provisioning(&schema.table_name, e.to_string()))?;

        tracing::info!(table_name = %schema.table_name, "table replaced");
        Ok(())
    }

    /// Write one chunk inside a single transaction.
    async fn append_chunk(&self, schema: &TableSchema, chunk: &RecordBatch) -> Result<()> {
        let rows = batch_to_rows(chunk)?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection from pool")?;

        execute(&mut conn, "BEGIN").await?;

        let mut result = Ok(());
        for insert_batch in rows.chunks(self.insert_batch_rows) {
            if let Err(e) = Self::insert_rows(&mut conn, schema, insert_batch).await {
                result = Err(e);
                break;
            }
        }

        match result {
            Ok(()) => execute(&mut conn, "COMMIT").await,
            Err(e) => {
                let _ = execute(&mut conn, "ROLLBACK").await;
                Err(e)
            }
        }
    }

    /// Execute one multi-row INSERT statement.
    async fn insert_rows(
        conn: &mut PoolConnection,
        schema: &TableSchema,
        rows: &[Vec<String>],
    ) -> Result<()> {
        let insert_sql = build_insert_sql(schema, rows.len());

        match conn {
            PoolConnection::Postgres(pg_conn) => {
                let mut query = sqlx::query(&insert_sql);
                for row in rows {
                    for (field, column) in row.iter().zip(&schema.columns) {
                        query = bind_typed_value(query, field, &column.sql_type)?;
                    }
                }
                query
                    .execute(&mut **pg_conn)
                    .await
                    .context("Failed to execute batch insert")?;
            }
            #[cfg(test)]
            PoolConnection::Sqlite(sqlite_conn) => {
                let sqlite_sql = convert_to_sqlite_placeholders(&insert_sql);
                let mut query = sqlx::query(&sqlite_sql);
                for row in rows {
                    for field in row {
                        // Empty string marks NULL; otherwise bind as text and
                        // let SQLite's affinity rules convert
                        if field.is_empty() {
                            query = query.bind(None::<String>);
                        } else {
                            query = query.bind(field);
                        }
                    }
                }
                query
                    .execute(&mut **sqlite_conn)
                    .await
                    .context("Failed to execute batch insert")?;
            }
        }

        Ok(())
    }
}

/// (offset, length) windows covering `num_rows` in `chunk_rows` steps
fn chunk_bounds(num_rows: usize, chunk_rows: usize) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut offset = 0;
    while offset < num_rows {
        let length = chunk_rows.min(num_rows - offset);
        bounds.push((offset, length));
        offset += length;
    }
    bounds
}

/// Build `INSERT INTO table (cols) VALUES ($1, ...), (...)` for `num_rows` rows.
fn build_insert_sql(schema: &TableSchema, num_rows: usize) -> String {
    let col_names: Vec<String> = schema
        .columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect();
    let column_list = format!("({})", col_names.join(", "));

    let num_columns = schema.columns.len();
    let mut value_groups = Vec::with_capacity(num_rows);
    let mut param_idx = 1;
    for _ in 0..num_rows {
        let placeholders: Vec<String> = (0..num_columns)
            .map(|_| {
                let placeholder = format!("${param_idx}");
                param_idx += 1;
                placeholder
            })
            .collect();
        value_groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO \"{}\" {} VALUES {}",
        schema.table_name,
        column_list,
        value_groups.join(", ")
    )
}

/// Bind a single value with proper type conversion
fn bind_typed_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q str,
    sql_type: &SqlType,
) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>> {
    // Empty string marks NULL in the row representation
    if value.is_empty() {
        return Ok(bind_null(query, sql_type));
    }

    Ok(match sql_type {
        SqlType::Boolean => query.bind(parse_bool(value)),
        SqlType::SmallInt => query.bind(parse::<i16>(value, sql_type)?),
        SqlType::Integer => query.bind(parse::<i32>(value, sql_type)?),
        SqlType::BigInt => query.bind(parse::<i64>(value, sql_type)?),
        SqlType::Real => query.bind(parse::<f32>(value, sql_type)?),
        SqlType::DoublePrecision => query.bind(parse::<f64>(value, sql_type)?),
        SqlType::Timestamp => {
            let timestamp = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
                .with_context(|| {
                    format!("Cannot convert '{value}' to TIMESTAMP (expected '2019-01-01 00:30:00')")
                })?;
            query.bind(timestamp)
        }
        SqlType::Date => {
            let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .with_context(|| format!("Cannot convert '{value}' to DATE"))?;
            query.bind(date)
        }
        SqlType::Text => query.bind(value),
    })
}

/// Bind NULL value for the appropriate type
fn bind_null<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    sql_type: &SqlType,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match sql_type {
        SqlType::Boolean => query.bind(None::<bool>),
        SqlType::SmallInt => query.bind(None::<i16>),
        SqlType::Integer => query.bind(None::<i32>),
        SqlType::BigInt => query.bind(None::<i64>),
        SqlType::Real => query.bind(None::<f32>),
        SqlType::DoublePrecision => query.bind(None::<f64>),
        SqlType::Timestamp => query.bind(None::<chrono::NaiveDateTime>),
        SqlType::Date => query.bind(None::<chrono::NaiveDate>),
        SqlType::Text => query.bind(None::<String>),
    }
}

/// Parse a value from string
fn parse<T: std::str::FromStr>(value: &str, sql_type: &SqlType) -> Result<T>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow!("Cannot convert '{value}' to {sql_type:?}: {e}"))
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("t") || value == "1"
}

async fn execute(conn: &mut PoolConnection, sql: &str) -> Result<()> {
    match conn {
        PoolConnection::Postgres(pg_conn) => {
            sqlx::query(sql)
                .execute(&mut **pg_conn)
                .await
                .with_context(|| format!("Failed to execute: {sql}"))?;
        }
        #[cfg(test)]
        PoolConnection::Sqlite(sqlite_conn) => {
            sqlx::query(sql)
                .execute(&mut **sqlite_conn)
                .await
                .with_context(|| format!("Failed to execute: {sql}"))?;
        }
    }
    Ok(())
}

/// Convert Postgres-style placeholders ($1, $2, ...) to SQLite-style (?, ?, ...)
#[cfg(test)]
fn convert_to_sqlite_placeholders(sql: &str) -> String {
    let mut result = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                chars.next();
            }
            result.push('?');
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::Column;

    #[test]
    fn test_chunk_bounds_exact_and_remainder() {
        assert_eq!(
            chunk_bounds(250_000, 100_000),
            vec![(0, 100_000), (100_000, 100_000), (200_000, 50_000)]
        );
        assert_eq!(chunk_bounds(200, 100), vec![(0, 100), (100, 100)]);
        assert_eq!(chunk_bounds(50, 100), vec![(0, 50)]);
        assert_eq!(chunk_bounds(0, 100), Vec::<(usize, usize)>::new());
    }

    #[test]
    fn test_build_insert_sql() {
        let schema = TableSchema {
            table_name: "trips".to_string(),
            columns: vec![
                Column {
                    name: "vendor_id".to_string(),
                    sql_type: SqlType::BigInt,
                },
                Column {
                    name: "fare_amount".to_string(),
                    sql_type: SqlType::DoublePrecision,
                },
            ],
        };

        let sql = build_insert_sql(&schema, 2);

        assert_eq!(
            sql,
            "INSERT INTO \"trips\" (\"vendor_id\", \"fare_amount\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_convert_to_sqlite_placeholders() {
        assert_eq!(
            convert_to_sqlite_placeholders("VALUES ($1, $2), ($3, $4)"),
            "VALUES (?, ?), (?, ?)"
        );
        assert_eq!(
            convert_to_sqlite_placeholders("VALUES ($10, $11)"),
            "VALUES (?, ?)"
        );
    }
}
