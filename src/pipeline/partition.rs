//! Identity of a single month of trip data for one service.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use url::Url;

/// One (service, year, month) unit of work in the publish pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub service: String,
    pub year: u16,
    pub month: u8,
}

impl Partition {
    pub fn new(service: impl Into<String>, year: u16, month: u8) -> Self {
        Self {
            service: service.into(),
            year,
            month,
        }
    }

    /// Name of the compressed source file, e.g. `yellow_tripdata_2019-01.csv.gz`
    pub fn csv_name(&self) -> String {
        format!(
            "{}_tripdata_{}-{:02}.csv.gz",
            self.service, self.year, self.month
        )
    }

    /// Name of the converted file, e.g. `yellow_tripdata_2019-01.parquet`
    pub fn parquet_name(&self) -> String {
        format!(
            "{}_tripdata_{}-{:02}.parquet",
            self.service, self.year, self.month
        )
    }

    /// Download URL under the release base, `{base}{service}/{csv_name}`
    pub fn source_url(&self, base_url: &Url) -> Result<Url> {
        base_url
            .join(&format!("{}/{}", self.service, self.csv_name()))
            .with_context(|| format!("Invalid source URL for {self}"))
    }

    /// Object key in the destination store, `{service}/{parquet_name}`
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.service, self.parquet_name())
    }

    pub fn csv_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.csv_name())
    }

    pub fn parquet_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.parquet_name())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{:02}", self.service, self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let partition = Partition::new("yellow", 2019, 1);
        assert_eq!(partition.csv_name(), "yellow_tripdata_2019-01.csv.gz");
        assert_eq!(partition.parquet_name(), "yellow_tripdata_2019-01.parquet");

        let december = Partition::new("green", 2020, 12);
        assert_eq!(december.csv_name(), "green_tripdata_2020-12.csv.gz");
    }

    #[test]
    fn test_source_url() {
        let base =
            Url::parse("https://github.com/DataTalksClub/nyc-tlc-data/releases/download/").unwrap();
        let partition = Partition::new("green", 2020, 2);

        let url = partition.source_url(&base).unwrap();

        assert_eq!(
            url.as_str(),
            "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/green/green_tripdata_2020-02.csv.gz"
        );
    }

    #[test]
    fn test_object_key() {
        let partition = Partition::new("yellow", 2019, 7);
        assert_eq!(
            partition.object_key(),
            "yellow/yellow_tripdata_2019-07.parquet"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Partition::new("green", 2019, 3).to_string(), "green 2019-03");
    }
}
