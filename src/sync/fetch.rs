//! Fetchers: retrieve raw JSON arrays from bundled assets or over HTTP.
//!
//! Both produce `Vec<serde_json::Value>`; decoding into typed records is
//! left to the reconcilers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Asset not found: {0}")]
    AssetMissing(PathBuf),

    #[error("Failed to read asset {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed JSON from {origin}: {source}")]
    Malformed {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a JSON array from {0}")]
    NotAnArray(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Network-level failures that a later run may not hit again.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http { source, .. } => source.is_timeout() || source.is_connect(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Source of one JSON array payload. `source` is an asset file name for
/// local fetchers and a URL for remote ones.
pub trait Fetcher: Send {
    fn fetch(&self, source: &str) -> Result<Vec<Value>, FetchError>;
}

/// Parse a payload that must be a top-level JSON array.
pub fn parse_json_array(origin: &str, body: &[u8]) -> Result<Vec<Value>, FetchError> {
    let value: Value = serde_json::from_slice(body).map_err(|source| FetchError::Malformed {
        origin: origin.to_string(),
        source,
    })?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(FetchError::NotAnArray(origin.to_string())),
    }
}

// =============================================================================
// Local assets
// =============================================================================

/// Reads bundled snapshots (`cache-rooms.json`, ...) from a directory.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    assets_dir: PathBuf,
}

impl LocalFetcher {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, source: &str) -> Result<Vec<Value>, FetchError> {
        let path = self.assets_dir.join(source);
        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::AssetMissing(path));
            }
            Err(source) => return Err(FetchError::Asset { path, source }),
        };
        let items = parse_json_array(&path.display().to_string(), &body)?;
        log::debug!("Read {} records from {}", items.len(), path.display());
        Ok(items)
    }
}

// =============================================================================
// Remote endpoint
// =============================================================================

/// Blocking HTTP GET fetcher. Only `200 OK` is accepted.
pub struct RemoteFetcher {
    client: reqwest::blocking::Client,
}

impl RemoteFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("confsched/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl Fetcher for RemoteFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        let http_err = |source: reqwest::Error| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(http_err)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(http_err)?;
        let items = parse_json_array(url, &body)?;
        log::info!("Fetched {} records from {}", items.len(), url);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array_accepts_arrays_only() {
        let items = parse_json_array("test", br#"[{"id": 1}, {"id": 2}]"#).expect("array");
        assert_eq!(items.len(), 2);

        assert!(parse_json_array("test", b"[]").expect("empty").is_empty());

        let err = parse_json_array("test", br#"{"id": 1}"#).expect_err("object");
        assert!(matches!(err, FetchError::NotAnArray(_)));

        let err = parse_json_array("test", b"[{").expect_err("truncated");
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn test_local_fetcher_reads_assets() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("cache-rooms.json"),
            r#"[{"id": "room8", "name": "Room 8", "capacity": "340"}]"#,
        )
        .expect("write");

        let fetcher = LocalFetcher::new(dir.path());
        let items = fetcher.fetch("cache-rooms.json").expect("fetch");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "Room 8");
    }

    #[test]
    fn test_local_fetcher_missing_asset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = LocalFetcher::new(dir.path())
            .fetch("cache-labs-speakers.json")
            .expect_err("missing");
        assert!(matches!(err, FetchError::AssetMissing(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_status_errors_classified() {
        let server_error = FetchError::Status {
            url: "http://x".into(),
            status: 503,
        };
        assert!(server_error.is_transient());
        let not_found = FetchError::Status {
            url: "http://x".into(),
            status: 404,
        };
        assert!(!not_found.is_transient());
    }
}
