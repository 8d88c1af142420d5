use clap::{Parser, Subcommand};
use tripdata_loader::runner::{
    DEFAULT_CHUNK_ROWS, DEFAULT_WORKER_COUNT, IngestArgs, PublishArgs, SourceFormat, run_ingest,
    run_publish,
};

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Load a trip-data file into a Postgres table in chunks
    Ingest {
        /// Path or URL of the source file (local path, file://, http(s)://)
        #[arg(short, long)]
        source_uri: String,

        /// Target table name
        #[arg(short, long)]
        table: String,

        /// File format (csv, parquet) - auto-detected from extension if not specified
        #[arg(short, long)]
        format: Option<String>,

        /// Database username
        #[arg(long, default_value = "postgres")]
        pg_username: String,

        /// Database password
        #[arg(long, default_value = "postgres")]
        pg_password: String,

        /// Database host
        #[arg(long, default_value = "localhost")]
        pg_host: String,

        /// Database port
        #[arg(long, default_value = "5432")]
        pg_port: u16,

        /// Database name
        #[arg(long, default_value = "ny_taxi")]
        pg_database: String,

        /// Rows per load chunk (one transaction per chunk)
        #[arg(short, long, default_value_t = DEFAULT_CHUNK_ROWS)]
        chunk_size: usize,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
    /// Download monthly partitions, convert to parquet, upload to object storage
    Publish {
        /// Destination bucket
        #[arg(short, long)]
        bucket: String,

        /// Services to publish (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "green,yellow")]
        services: Vec<String>,

        /// Years to publish (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "2019,2020")]
        years: Vec<u16>,

        /// Base URL the monthly release files are downloaded from
        #[arg(
            long,
            default_value = "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/"
        )]
        base_url: String,

        /// Number of download/convert workers
        #[arg(short, long, default_value_t = DEFAULT_WORKER_COUNT)]
        workers: usize,

        /// Scratch directory for downloads (default: system temp directory)
        #[arg(long)]
        work_dir: Option<String>,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Ingest {
            source_uri,
            table,
            format,
            pg_username,
            pg_password,
            pg_host,
            pg_port,
            pg_database,
            chunk_size,
            quiet,
        } => {
            init_tracing(quiet);

            if !quiet {
                println!("Trip Data Loader");
                println!("================");
                println!("Source: {}", source_uri);
                println!("Table: {}", table);
                println!("Chunk size: {}", chunk_size);
                println!();
            }

            // Auto-detect format from file extension if not provided
            let format = if let Some(f) = format {
                f
            } else {
                cli::detect_format_from_path(&source_uri).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Could not detect format from file '{}'.\n\
                         Supported extensions: .csv, .csv.gz, .parquet\n\
                         Please specify --format explicitly.",
                        source_uri
                    )
                })?
            };

            let result = run_ingest(IngestArgs {
                pg_username,
                pg_password,
                pg_host,
                pg_port,
                pg_database,
                source_uri,
                target_table: table,
                format: SourceFormat::parse(&format)?,
                chunk_size,
                quiet,
            })
            .await?;

            println!();
            println!("Ingest Summary");
            println!("==============");
            println!("Rows loaded: {}", result.rows_loaded);
            println!("Chunks written: {}", result.chunks_written);
            println!("Duration: {:.2}s", result.duration.as_secs_f64());
            if result.duration.as_secs_f64() > 0.0 {
                println!(
                    "Throughput: {:.2} rows/sec",
                    result.rows_loaded as f64 / result.duration.as_secs_f64()
                );
            }
        }
        Command::Publish {
            bucket,
            services,
            years,
            base_url,
            workers,
            work_dir,
            quiet,
        } => {
            init_tracing(quiet);

            if !quiet {
                println!("Trip Data Publisher");
                println!("===================");
                println!("Bucket: {}", bucket);
                println!("Services: {}", services.join(", "));
                println!(
                    "Years: {}",
                    years
                        .iter()
                        .map(|y| y.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                println!("Workers: {}", workers);
                println!();
            }

            let result = run_publish(PublishArgs {
                bucket,
                services,
                years,
                base_url,
                worker_count: workers,
                work_dir: work_dir.map(Into::into),
                quiet,
            })
            .await?;

            println!();
            println!("Publish Summary");
            println!("===============");
            println!("Partitions published: {}", result.published);
            println!("Partitions failed: {}", result.failed);
            println!("Duration: {:.2}s", result.duration.as_secs_f64());
        }
    }
    Ok(())
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new("tripdata_loader=warn,sqlx=off")
    } else {
        EnvFilter::new("tripdata_loader=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// CLI utility functions for parsing command-line arguments
mod cli {
    /// Auto-detect file format from path/URI
    pub fn detect_format_from_path(path: &str) -> Option<String> {
        let lower = path.to_lowercase();

        if lower.ends_with(".csv") || lower.ends_with(".csv.gz") {
            Some("csv".to_string())
        } else if lower.ends_with(".parquet") {
            Some("parquet".to_string())
        } else {
            None
        }
    }

}
