//! Integration tests for the chunked loader.
//!
//! These tests use SQLite in-memory databases and real data files to test
//! end to end scenarios of the loader.

#[cfg(test)]
mod tests {
    use crate::{
        db::pool::{Pool, PoolConnection},
        loader::ChunkedLoader,
        runner::{IngestArgs, SourceFormat, run_ingest},
        telemetry::ProgressEvent,
    };
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    // ============ Test Helpers ============

    /// Trip-shaped batch with `num_rows` rows
    fn trip_batch(num_rows: usize) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("vendor_id", DataType::Int64, true),
            Field::new("zone", DataType::Utf8, true),
            Field::new("fare_amount", DataType::Float64, true),
        ]);

        let vendor_ids: Int64Array = (0..num_rows).map(|i| Some(i as i64 % 3 + 1)).collect();
        let zones: StringArray = (0..num_rows).map(|i| Some(format!("zone_{i}"))).collect();
        let fares: Float64Array = (0..num_rows).map(|i| Some(i as f64 * 0.5)).collect();

        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(vendor_ids) as ArrayRef,
                Arc::new(zones) as ArrayRef,
                Arc::new(fares) as ArrayRef,
            ],
        )
        .unwrap()
    }

    /// Helper to query table row count
    async fn get_table_count(pool: &Pool, table_name: &str) -> i64 {
        if let Ok(mut conn) = pool.acquire().await
            && let PoolConnection::Sqlite(ref mut sqlite_conn) = conn
        {
            let sql = format!("SELECT COUNT(*) FROM \"{}\"", table_name);
            let (count,): (i64,) = sqlx::query_as(&sql)
                .fetch_one(&mut **sqlite_conn)
                .await
                .unwrap();
            return count;
        }
        0
    }

    /// Helper to list column names of a table
    async fn get_table_columns(pool: &Pool, table_name: &str) -> Vec<String> {
        let mut columns = Vec::new();
        if let Ok(mut conn) = pool.acquire().await
            && let PoolConnection::Sqlite(ref mut sqlite_conn) = conn
        {
            let sql = format!("PRAGMA table_info(\"{}\")", table_name);
            let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
                sqlx::query_as(&sql)
                    .fetch_all(&mut **sqlite_conn)
                    .await
                    .unwrap();
            columns = rows.into_iter().map(|row| row.1).collect();
        }
        columns
    }

    // ============ Tests ============

    #[tokio::test]
    async fn test_load_splits_into_chunks() {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let batch = trip_batch(25);

        let loader = ChunkedLoader::new(pool.clone(), 10, 5);
        let report = loader.load("trips", &batch).await.unwrap();

        // 25 rows at 10 per chunk: 10, 10, 5
        assert_eq!(report.chunks_written, 3);
        assert_eq!(report.rows_loaded, 25);
        assert_eq!(get_table_count(&pool, "trips").await, 25);
    }

    #[tokio::test]
    async fn test_load_emits_chunk_events() {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let batch = trip_batch(25);
        let (tx, mut rx) = mpsc::channel(16);

        let loader = ChunkedLoader::new(pool, 10, 5).with_progress(tx);
        loader.load("trips", &batch).await.unwrap();
        drop(loader);

        let mut chunk_rows = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ProgressEvent::ChunkLoaded { rows, .. } = event {
                chunk_rows.push(rows);
            }
        }
        assert_eq!(chunk_rows, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_load_creates_table_with_source_columns() {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let batch = trip_batch(3);

        let loader = ChunkedLoader::new(pool.clone(), 100, 100);
        loader.load("trips", &batch).await.unwrap();

        assert_eq!(
            get_table_columns(&pool, "trips").await,
            vec!["vendor_id", "zone", "fare_amount"]
        );
    }

    #[tokio::test]
    async fn test_load_twice_replaces_table() {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let loader = ChunkedLoader::new(pool.clone(), 100, 100);

        loader.load("trips", &trip_batch(50)).await.unwrap();
        loader.load("trips", &trip_batch(7)).await.unwrap();

        // Second load replaces, it does not append
        assert_eq!(get_table_count(&pool, "trips").await, 7);
    }

    #[tokio::test]
    async fn test_load_preserves_row_order() {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let batch = trip_batch(30);

        let loader = ChunkedLoader::new(pool.clone(), 7, 3);
        loader.load("trips", &batch).await.unwrap();

        if let Ok(mut conn) = pool.acquire().await
            && let PoolConnection::Sqlite(ref mut sqlite_conn) = conn
        {
            let zones: Vec<(String,)> =
                sqlx::query_as("SELECT zone FROM \"trips\" ORDER BY rowid")
                    .fetch_all(&mut **sqlite_conn)
                    .await
                    .unwrap();

            let expected: Vec<String> = (0..30).map(|i| format!("zone_{i}")).collect();
            let actual: Vec<String> = zones.into_iter().map(|(z,)| z).collect();
            assert_eq!(actual, expected);
        }
    }

    #[tokio::test]
    async fn test_load_handles_null_values() {
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let schema = Schema::new(vec![
            Field::new("vendor_id", DataType::Int64, true),
            Field::new("zone", DataType::Utf8, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])) as ArrayRef,
                Arc::new(StringArray::from(vec![Some("a"), Some("b"), None])) as ArrayRef,
            ],
        )
        .unwrap();

        let loader = ChunkedLoader::new(pool.clone(), 100, 100);
        loader.load("trips", &batch).await.unwrap();

        if let Ok(mut conn) = pool.acquire().await
            && let PoolConnection::Sqlite(ref mut sqlite_conn) = conn
        {
            let (null_vendors,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM \"trips\" WHERE vendor_id IS NULL")
                    .fetch_one(&mut **sqlite_conn)
                    .await
                    .unwrap();
            let (null_zones,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM \"trips\" WHERE zone IS NULL")
                    .fetch_one(&mut **sqlite_conn)
                    .await
                    .unwrap();

            assert_eq!(null_vendors, 1);
            assert_eq!(null_zones, 1);
        }
    }

    #[tokio::test]
    async fn test_load_empty_batch_leaves_empty_table() {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let batch = trip_batch(0);

        let loader = ChunkedLoader::new(pool.clone(), 100, 100);
        let report = loader.load("trips", &batch).await.unwrap();

        assert_eq!(report.rows_loaded, 0);
        assert_eq!(report.chunks_written, 0);
        assert_eq!(get_table_count(&pool, "trips").await, 0);
        assert_eq!(
            get_table_columns(&pool, "trips").await,
            vec!["vendor_id", "zone", "fare_amount"]
        );
    }

    #[tokio::test]
    async fn test_run_ingest_from_parquet_file() {
        let temp_dir = TempDir::new().unwrap();
        let parquet_path = temp_dir.path().join("trips.parquet");
        crate::formats::parquet::write_file(&trip_batch(42), &parquet_path).unwrap();

        let pool = Pool::sqlite_in_memory().await.unwrap();

        let result = run_ingest(IngestArgs {
            pg_username: "unused".to_string(),
            pg_password: "unused".to_string(),
            pg_host: "unused".to_string(),
            pg_port: 5432,
            pg_database: "unused".to_string(),
            source_uri: parquet_path.to_str().unwrap().to_string(),
            target_table: "taxi_trips".to_string(),
            format: SourceFormat::Parquet,
            chunk_size: 10,
            quiet: true,
            test_pool: Some(pool.clone()),
        })
        .await
        .unwrap();

        assert_eq!(result.rows_loaded, 42);
        assert_eq!(result.chunks_written, 5);
        assert_eq!(get_table_count(&pool, "taxi_trips").await, 42);
    }

    #[tokio::test]
    async fn test_run_ingest_rejects_zero_chunk_size() {
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let result = run_ingest(IngestArgs {
            pg_username: "unused".to_string(),
            pg_password: "unused".to_string(),
            pg_host: "unused".to_string(),
            pg_port: 5432,
            pg_database: "unused".to_string(),
            source_uri: "trips.parquet".to_string(),
            target_table: "trips".to_string(),
            format: SourceFormat::Parquet,
            chunk_size: 0,
            quiet: true,
            test_pool: Some(pool),
        })
        .await;

        // An error, not a panic
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_ingest_from_csv_file() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("zones.csv");
        let mut content = String::from("zone_id,borough\n");
        for i in 0..12 {
            content.push_str(&format!("{i},borough_{i}\n"));
        }
        std::fs::write(&csv_path, content).unwrap();

        let pool = Pool::sqlite_in_memory().await.unwrap();

        let result = run_ingest(IngestArgs {
            pg_username: "unused".to_string(),
            pg_password: "unused".to_string(),
            pg_host: "unused".to_string(),
            pg_port: 5432,
            pg_database: "unused".to_string(),
            source_uri: csv_path.to_str().unwrap().to_string(),
            target_table: "zones".to_string(),
            format: SourceFormat::Csv,
            chunk_size: 5,
            quiet: true,
            test_pool: Some(pool.clone()),
        })
        .await
        .unwrap();

        assert_eq!(result.rows_loaded, 12);
        assert_eq!(result.chunks_written, 3);
        assert_eq!(
            get_table_columns(&pool, "zones").await,
            vec!["zone_id", "borough"]
        );
    }
}
