use anyhow::{Result, anyhow};
use std::path::PathBuf;
use url::Url;

/// Represents a parsed source URI
#[derive(Debug, Clone)]
pub enum SourceUri {
    Local(PathBuf),
    Http(Url),
}

impl SourceUri {
    /// Parse a URI string into a SourceUri
    pub fn parse(uri: &str) -> Result<Self> {
        // Try parsing as URL first
        if let Ok(url) = Url::parse(uri) {
            match url.scheme() {
                "http" | "https" => Ok(SourceUri::Http(url)),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                    Ok(SourceUri::Local(path))
                }
                scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
            }
        } else {
            // Treat as local file path
            Ok(SourceUri::Local(PathBuf::from(uri)))
        }
    }

    /// Last path segment, used to name downloaded scratch files
    pub fn file_name(&self) -> Option<String> {
        match self {
            SourceUri::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            SourceUri::Http(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_string()),
        }
    }
}
