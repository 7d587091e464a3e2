//! Local directory source
//!
//! Serves units that already sit on disk: the directory itself when it holds
//! a `package.toml`, plus every immediate subdirectory that does (vendored
//! units, `*.installed` records).

use super::{Fetched, Source, SourceError};
use crate::artifact::UnitMetadata;
use crate::requirement::normalize_name;
use std::fs;
use std::path::{Path, PathBuf};

/// A source backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    path: PathBuf,
    url: String,
}

impl LocalDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let url = path.display().to_string();
        Self { path, url }
    }

    /// Record `url` in lockfiles instead of the resolved path
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All units found in the directory, sorted by location
    pub fn units(&self) -> Result<Vec<(PathBuf, UnitMetadata)>, SourceError> {
        let mut units = Vec::new();

        if UnitMetadata::exists_in(&self.path) {
            units.push((self.path.clone(), UnitMetadata::load(&self.path)?));
        }

        if self.path.is_dir() {
            let mut children: Vec<PathBuf> = fs::read_dir(&self.path)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_dir() && UnitMetadata::exists_in(path))
                .collect();
            children.sort();

            for child in children {
                let metadata = UnitMetadata::load(&child)?;
                units.push((child, metadata));
            }
        }

        Ok(units)
    }

    fn units_named(&self, name: &str) -> Result<Vec<(PathBuf, UnitMetadata)>, SourceError> {
        let key = normalize_name(name);
        Ok(self
            .units()?
            .into_iter()
            .filter(|(_, metadata)| normalize_name(&metadata.name) == key)
            .collect())
    }
}

impl Source for LocalDirectory {
    fn url(&self) -> &str {
        &self.url
    }

    fn available_versions(&self, name: &str) -> Result<Vec<String>, SourceError> {
        Ok(self
            .units_named(name)?
            .into_iter()
            .map(|(_, metadata)| metadata.version)
            .collect())
    }

    fn fetch(&self, name: &str, version: &str, _cache_dir: &Path) -> Result<Fetched, SourceError> {
        self.units_named(name)?
            .into_iter()
            .find(|(_, metadata)| metadata.version == version)
            .map(|(path, _)| Fetched::Directory(path))
            .ok_or_else(|| SourceError::NoArtifact {
                name: name.to_string(),
                version: version.to_string(),
                source_url: self.url.clone(),
            })
    }
}
