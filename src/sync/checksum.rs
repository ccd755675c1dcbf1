//! Content checksums for change detection.
//!
//! A checksum only answers "did this endpoint's content change since we
//! last synced it"; it is never used for integrity checks. `Ok(None)`
//! means the digest is unknown, which never counts as a change.

use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::sync::fetch::{FetchError, Fetcher};

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("Invalid checksum service URL {url}: {source}")]
    InvalidServiceUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Checksum request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Checksum service returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to fetch {url} for digest: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub trait ChecksumService: Send {
    /// Current content digest of `url`, or `None` when unknown.
    fn checksum(&self, url: &str) -> Result<Option<String>, ChecksumError>;
}

/// Queries a caching checksum service: `GET <service>?requestUri=<url>`.
/// The body is a hex digest, or `NOK` when the service couldn't compute one.
pub struct RemoteChecksumService {
    service_url: url::Url,
    client: reqwest::blocking::Client,
}

impl RemoteChecksumService {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, ChecksumError> {
        let service_url =
            url::Url::parse(service_url).map_err(|source| ChecksumError::InvalidServiceUrl {
                url: service_url.to_string(),
                source,
            })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ChecksumError::Client)?;
        Ok(Self {
            service_url,
            client,
        })
    }

    /// Service URL with `requestUri` set to `url`.
    pub fn request_url(&self, url: &str) -> url::Url {
        let mut request = self.service_url.clone();
        request.query_pairs_mut().append_pair("requestUri", url);
        request
    }
}

impl ChecksumService for RemoteChecksumService {
    fn checksum(&self, url: &str) -> Result<Option<String>, ChecksumError> {
        let http_err = |source: reqwest::Error| ChecksumError::Http {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(self.request_url(url))
            .send()
            .map_err(http_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChecksumError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(http_err)?;
        Ok(parse_checksum_body(&body))
    }
}

/// `NOK` and empty bodies mean "unknown".
pub fn parse_checksum_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() || body.eq_ignore_ascii_case("NOK") {
        None
    } else {
        Some(body.to_lowercase())
    }
}

/// Computes the digest locally by fetching the payload and hashing its
/// canonical JSON form. For deployments without a checksum service.
pub struct DigestChecksumService {
    fetcher: Box<dyn Fetcher>,
}

impl DigestChecksumService {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

impl ChecksumService for DigestChecksumService {
    fn checksum(&self, url: &str) -> Result<Option<String>, ChecksumError> {
        let items = self
            .fetcher
            .fetch(url)
            .map_err(|source| ChecksumError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let mut hasher = Sha256::new();
        for item in &items {
            hasher.update(item.to_string().as_bytes());
            hasher.update(b"\n");
        }
        Ok(Some(hex::encode(hasher.finalize())))
    }
}

/// Has content changed since `stored` was persisted? An unknown current
/// digest never counts as a change.
pub fn is_changed(current: Option<&str>, stored: Option<&str>) -> bool {
    match current {
        Some(digest) => stored != Some(digest),
        None => false,
    }
}
