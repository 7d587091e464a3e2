//! Integrity-checked downloads
//!
//! Fetches a URL to a local file and verifies its SHA-256 digest. Content is
//! written to a temporary file next to the target and only moved into place
//! once the digest matches, so a mismatching file never sits at the target.

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Whole-request timeout for downloads and registry calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection establishment timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur during downloads
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure while fetching
    #[error("Downloading {url} failed: {message}")]
    Download { url: String, message: String },

    /// Non-success HTTP status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    /// Digest mismatch
    #[error("Downloading {url} failed: SHA-256 digest {actual} did not match expected {expected}")]
    Integrity {
        url: String,
        expected: String,
        actual: String,
    },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Build the HTTP client shared by downloads and registry queries
pub fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("larder/{}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Downloader with digest verification
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// Create a downloader with its own HTTP client
    pub fn new() -> Result<Self, FetchError> {
        let client = http_client().map_err(|e| FetchError::Download {
            url: String::new(),
            message: format!("failed to create HTTP client: {}", e),
        })?;
        Ok(Self { client })
    }

    /// Create a downloader sharing an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch `url` to `target`, verifying `expected_digest` (hex SHA-256)
    ///
    /// If `target` already exists with the expected digest nothing is fetched.
    /// A stale file is deleted first. On any failure `target` is left absent.
    pub fn download_checked(
        &self,
        url: &str,
        target: &Path,
        expected_digest: &str,
    ) -> Result<(), FetchError> {
        let expected = normalize_digest(expected_digest);

        if target.exists() {
            if compute_file_checksum(target)? == expected {
                debug!("Cache hit for {} at {}", url, target.display());
                return Ok(());
            }
            debug!("Removing stale download {}", target.display());
            fs::remove_file(target)?;
        }

        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        info!("Downloading {}", url);
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        self.fetch_into(url, tmp.as_file_mut())?;

        let actual = compute_file_checksum(tmp.path())?;
        if actual != expected {
            // Dropping `tmp` deletes the partial download
            return Err(FetchError::Integrity {
                url: url.to_string(),
                expected,
                actual,
            });
        }

        tmp.persist(target).map_err(|e| FetchError::IoError(e.error))?;
        Ok(())
    }

    /// Stream the body of `url` into `out`
    fn fetch_into(&self, url: &str, out: &mut File) -> Result<(), FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => {
                let mut response =
                    self.client
                        .get(url)
                        .send()
                        .map_err(|e| FetchError::Download {
                            url: url.to_string(),
                            message: e.to_string(),
                        })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }

                response.copy_to(out).map_err(|e| FetchError::Download {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            }
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
                let mut file = File::open(&path).map_err(|e| FetchError::Download {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
                io::copy(&mut file, out)?;
            }
            _ => return Err(FetchError::InvalidUrl(url.to_string())),
        }

        out.sync_all()?;
        Ok(())
    }
}

/// Lowercase a hex digest and drop an optional `sha256:` prefix
pub fn normalize_digest(digest: &str) -> String {
    let digest = digest.trim();
    digest
        .strip_prefix("sha256:")
        .unwrap_or(digest)
        .to_ascii_lowercase()
}

/// Compute SHA-256 checksum of bytes
pub fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute SHA-256 checksum of a file
pub fn compute_file_checksum(path: &Path) -> Result<String, FetchError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
