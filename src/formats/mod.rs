pub mod delimited;
pub mod parquet;
pub mod rows;
