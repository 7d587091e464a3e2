//! Remote package registry
//!
//! Speaks a small JSON API:
//!
//! - `GET {base}/packages/{name}` lists a package's versions
//! - `GET {base}/packages/{name}/{version}` lists a version's release files
//!
//! The registry may answer the first call under a different spelling of the
//! name (its canonical name); later calls for that package use it.

use super::{Fetched, Source, SourceError};
use crate::archive::ArchiveFormat;
use crate::fetch::{http_client, Downloader};
use crate::requirement::normalize_name;
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use url::Url;

/// Package type of a source archive
pub const SDIST: &str = "sdist";

/// Package metadata
///
/// Response from GET /packages/{name}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Canonical package name
    pub name: String,

    /// Package description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Available versions, in the registry's order
    pub versions: Vec<String>,
}

/// Version information
///
/// Response from GET /packages/{name}/{version}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,

    /// Release files for this version
    #[serde(default)]
    pub files: Vec<ReleaseFile>,
}

/// One downloadable file of a release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub filename: String,
    pub url: String,

    /// `sdist` for source archives
    pub packagetype: String,

    /// Hex SHA-256 of the file
    pub sha256: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl VersionInfo {
    /// First source archive of the release
    pub fn source_archive(&self) -> Option<&ReleaseFile> {
        self.files.iter().find(|f| f.packagetype == SDIST)
    }
}

/// A source backed by a remote registry
#[derive(Debug)]
pub struct RegistrySource {
    base_url: String,
    client: Client,
    downloader: Downloader,

    /// Normalized name -> canonical name, per instance
    canonical: Mutex<HashMap<String, String>>,
}

impl RegistrySource {
    /// Create a registry source for `base_url`
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        Url::parse(base_url).map_err(|_| SourceError::InvalidUrl(base_url.to_string()))?;
        let client = http_client()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            downloader: Downloader::with_client(client.clone()),
            client,
            canonical: Mutex::new(HashMap::new()),
        })
    }

    /// Get package metadata, `None` when the registry does not know it
    pub fn get_package(&self, name: &str) -> Result<Option<PackageMetadata>, SourceError> {
        let url = self.endpoint(&[name])?;
        self.get_json(url)
    }

    /// Get version information, `None` when the version is unknown
    pub fn get_version(&self, name: &str, version: &str) -> Result<Option<VersionInfo>, SourceError> {
        let url = self.endpoint(&[name, version])?;
        self.get_json(url)
    }

    /// Canonical spelling of `name`, looked up once and then cached
    pub fn canonical_name(&self, name: &str) -> Result<String, SourceError> {
        let key = normalize_name(name);
        if let Some(canonical) = self.canonical.lock().get(&key) {
            return Ok(canonical.clone());
        }

        let canonical = match self.get_package(name)? {
            Some(metadata) => metadata.name,
            None => name.to_string(),
        };
        self.canonical.lock().insert(key, canonical.clone());
        Ok(canonical)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|_| SourceError::InvalidUrl(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("packages")
            .extend(segments);
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, SourceError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(SourceError::Unavailable {
                source_url: self.base_url.clone(),
                message: format!("registry returned status {}", response.status()),
            });
        }

        let body = response.text()?;
        Ok(Some(serde_json::from_str(&body)?))
    }
}

impl Source for RegistrySource {
    fn url(&self) -> &str {
        &self.base_url
    }

    fn available_versions(&self, name: &str) -> Result<Vec<String>, SourceError> {
        match self.get_package(name)? {
            Some(metadata) => {
                self.canonical
                    .lock()
                    .insert(normalize_name(name), metadata.name.clone());
                Ok(metadata.versions)
            }
            None => Ok(Vec::new()),
        }
    }

    fn fetch(&self, name: &str, version: &str, cache_dir: &Path) -> Result<Fetched, SourceError> {
        let no_artifact = || SourceError::NoArtifact {
            name: name.to_string(),
            version: version.to_string(),
            source_url: self.base_url.clone(),
        };

        let canonical = self.canonical_name(name)?;
        let info = self.get_version(&canonical, version)?.ok_or_else(no_artifact)?;
        let file = info.source_archive().ok_or_else(no_artifact)?;

        // Reject formats we cannot unpack before touching the network
        let file_name = Path::new(&file.filename)
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(no_artifact)?;
        if ArchiveFormat::from_file_name(file_name).is_none() {
            return Err(crate::archive::ArchiveError::Unsupported(file_name.into()).into());
        }

        let target = cache_dir.join(file_name);
        self.downloader
            .download_checked(&file.url, &target, &file.sha256)?;
        Ok(Fetched::Archive(target))
    }
}
