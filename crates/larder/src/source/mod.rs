//! Package sources
//!
//! A source answers two questions for a package name: which versions it
//! offers (in the source's own order) and how to materialize one of them.
//! Remote registries return archives; local directories hand out their
//! units in place.

mod local;
mod registry;

pub use local::LocalDirectory;
pub use registry::{PackageMetadata, RegistrySource, ReleaseFile, VersionInfo, SDIST};

use crate::archive::ArchiveError;
use crate::artifact::ArtifactError;
use crate::fetch::FetchError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while querying or fetching from a source
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source has no suitable artifact for this exact version
    #[error("No source archive for {name} {version} at {source_url}")]
    NoArtifact {
        name: String,
        version: String,
        source_url: String,
    },

    /// The source answered with an error status
    #[error("Source {source_url} unavailable: {message}")]
    Unavailable { source_url: String, message: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Malformed JSON response
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid source URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Download or integrity failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The artifact is in a format that cannot be unpacked
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A local unit has unreadable metadata
    #[error(transparent)]
    Metadata(#[from] ArtifactError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// What a source produced for one exact version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// A verified archive file that still needs unpacking
    Archive(PathBuf),

    /// A ready unit directory, used in place
    Directory(PathBuf),
}

/// A provider of package versions
pub trait Source: fmt::Debug + Send + Sync {
    /// Identity recorded in the lockfile
    fn url(&self) -> &str;

    /// Versions offered for `name`, in the source's order
    ///
    /// An unknown package yields an empty list, so the next source can be
    /// consulted.
    fn available_versions(&self, name: &str) -> Result<Vec<String>, SourceError>;

    /// Materialize `name` at exactly `version`
    ///
    /// Downloads land under `cache_dir`; sources that serve directories
    /// ignore it.
    fn fetch(&self, name: &str, version: &str, cache_dir: &Path) -> Result<Fetched, SourceError>;
}
