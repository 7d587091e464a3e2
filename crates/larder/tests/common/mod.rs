//! Shared fixtures for integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use larder::fetch::{compute_file_checksum, Downloader};
use larder::{normalize_name, Fetched, Source, SourceError, Store, StoreConfig, UnitMetadata};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Build script that records a marker file in the library directory
pub const BUILD_OK: &str = "mkdir -p \"$LARDER_LIB_DIR\"\necho \"$LARDER_PACKAGE $LARDER_VERSION\" > \"$LARDER_LIB_DIR/$LARDER_PACKAGE.built\"\n";

/// Build script that fails
pub const BUILD_FAIL: &str = "echo \"compiler exploded\" >&2\nexit 1\n";

/// Write a unit (package.toml + build.sh) into `dir`
pub fn write_unit(dir: &Path, name: &str, version: &str, requires: &[&str], script: &str) {
    let mut metadata = UnitMetadata::new(name, version);
    metadata.requires = requires.iter().map(|r| r.to_string()).collect();
    metadata.save(dir).unwrap();
    fs::write(dir.join("build.sh"), script).unwrap();
}

/// Pack `src` into a gzipped tarball under a single top-level directory
pub fn pack_tgz(src: &Path, top: &str, dest: &Path) {
    let file = File::create(dest).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(top, src).unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

/// Open a store rooted inside `temp`
pub fn store_in(temp: &TempDir) -> Store {
    Store::open(StoreConfig::new(temp.path().join("store")).with_runtime("test-rt")).unwrap()
}

#[derive(Debug)]
struct Release {
    url: String,
    file_name: String,
    sha256: String,
}

/// A source serving tarballs from a fixture directory
///
/// Versions are listed in the order they were added.
#[derive(Debug)]
pub struct MemorySource {
    url: String,
    dir: TempDir,
    versions: HashMap<String, Vec<String>>,
    releases: HashMap<(String, String), Release>,
    downloader: Downloader,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            dir: TempDir::new().unwrap(),
            versions: HashMap::new(),
            releases: HashMap::new(),
            downloader: Downloader::new().unwrap(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Offer `name` at `version` with a working build
    pub fn add(&mut self, name: &str, version: &str, requires: &[&str]) -> &mut Self {
        self.add_with_script(name, version, requires, BUILD_OK)
    }

    /// Offer `name` at `version` with a custom build script
    pub fn add_with_script(
        &mut self,
        name: &str,
        version: &str,
        requires: &[&str],
        script: &str,
    ) -> &mut Self {
        let top = format!("{}-{}", name, version);
        let unit_dir = self.dir.path().join("units").join(&top);
        fs::create_dir_all(&unit_dir).unwrap();
        write_unit(&unit_dir, name, version, requires, script);

        let file_name = format!("{}.tar.gz", top);
        let archive = self.dir.path().join(&file_name);
        pack_tgz(&unit_dir, &top, &archive);

        let release = Release {
            url: url::Url::from_file_path(&archive).unwrap().to_string(),
            file_name,
            sha256: compute_file_checksum(&archive).unwrap(),
        };
        self.list(name, version);
        self.releases
            .insert((normalize_name(name), version.to_string()), release);
        self
    }

    /// List a version without providing an archive for it
    pub fn list(&mut self, name: &str, version: &str) -> &mut Self {
        self.versions
            .entry(normalize_name(name))
            .or_default()
            .push(version.to_string());
        self
    }

    /// Replace the published digest of a release
    pub fn corrupt(&mut self, name: &str, version: &str) -> &mut Self {
        let key = (normalize_name(name), version.to_string());
        if let Some(release) = self.releases.get_mut(&key) {
            release.sha256 = "0".repeat(64);
        }
        self
    }

    /// Number of `fetch` calls so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Source for MemorySource {
    fn url(&self) -> &str {
        &self.url
    }

    fn available_versions(&self, name: &str) -> Result<Vec<String>, SourceError> {
        Ok(self
            .versions
            .get(&normalize_name(name))
            .cloned()
            .unwrap_or_default())
    }

    fn fetch(&self, name: &str, version: &str, cache_dir: &Path) -> Result<Fetched, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let release = self
            .releases
            .get(&(normalize_name(name), version.to_string()))
            .ok_or_else(|| SourceError::NoArtifact {
                name: name.to_string(),
                version: version.to_string(),
                source_url: self.url.clone(),
            })?;

        let target: PathBuf = cache_dir.join(&release.file_name);
        self.downloader
            .download_checked(&release.url, &target, &release.sha256)?;
        Ok(Fetched::Archive(target))
    }
}
