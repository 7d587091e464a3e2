//! Bundle installation
//!
//! A bundle is a project directory holding `Larder.toml`. Installing it
//! collects the requirements of the selected groups, resolves them against
//! the declared sources, builds whatever is still pending, and only then
//! writes `Larder.lock`.

use crate::lockfile::{Lockfile, LockfileError, LOCK_FILE};
use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use crate::path::{find_project_root, resolve_path};
use crate::requirement::Requirement;
use crate::resolver::{Resolver, ResolverError};
use crate::source::{LocalDirectory, RegistrySource, Source, SourceError};
use crate::store::{Store, StoreConfig, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors that can occur while installing a bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// No Larder.toml found
    #[error("No Larder.toml found. Run `larder init` to create one.")]
    NoManifest,

    /// Locked install without a lockfile
    #[error("No lockfile at {}. Run `larder install` first.", .0.display())]
    NoLockfile(PathBuf),

    /// A requested group is not declared
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    /// Manifest error
    #[error("Manifest error: {0}")]
    ManifestError(#[from] ManifestError),

    /// Lockfile error
    #[error("Lockfile error: {0}")]
    LockfileError(#[from] LockfileError),

    /// Resolution error
    #[error(transparent)]
    ResolverError(#[from] ResolverError),

    /// A declared source could not be set up
    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    /// Store error
    #[error(transparent)]
    StoreError(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A project and the store it installs into
#[derive(Debug)]
pub struct Bundle {
    root: PathBuf,
    manifest: Manifest,
    sources: Vec<Arc<dyn Source>>,
    store: Store,
    platform: String,
}

impl Bundle {
    /// Find the project containing `start_dir` (or the current directory)
    /// and open the store configured by the environment
    pub fn load(start_dir: Option<&Path>) -> Result<Self, BundleError> {
        let start = match start_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let root = find_project_root(&start).ok_or(BundleError::NoManifest)?;
        let store = Store::open(StoreConfig::from_env()?)?;
        Self::open(root, store)
    }

    /// Open the project at `root` with an explicit store
    pub fn open(root: impl Into<PathBuf>, store: Store) -> Result<Self, BundleError> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(BundleError::NoManifest);
        }

        let manifest = Manifest::from_file(&manifest_path)?;
        let sources = declared_sources(&manifest, &root)?;

        Ok(Self {
            root,
            manifest,
            sources,
            store,
            platform: std::env::consts::OS.to_string(),
        })
    }

    /// Install for `platform` instead of the running one
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Replace the declared sources
    pub fn with_sources(mut self, sources: Vec<Arc<dyn Source>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Resolve, build and lock the requirements of `groups`
    ///
    /// The lockfile is written only after every package is installed.
    pub fn install(&self, groups: &[&str]) -> Result<Lockfile, BundleError> {
        self.check_groups(groups)?;
        let requirements = self.manifest.collect(groups, &self.platform)?;
        self.install_requirements(requirements, groups)
    }

    /// Reinstall exactly the versions recorded in the lockfile
    ///
    /// Only packages reachable from the requirements of `groups` are
    /// replayed, so the new lockfile never carries pins from groups that
    /// were not requested.
    pub fn install_locked(&self, groups: &[&str]) -> Result<Lockfile, BundleError> {
        self.check_groups(groups)?;
        let path = self.lockfile_path();
        if !path.is_file() {
            return Err(BundleError::NoLockfile(path));
        }

        let lock = Lockfile::from_file(&path)?;
        let roots = self.manifest.collect(groups, &self.platform)?;
        info!("Installing from {}", LOCK_FILE);
        self.install_requirements(lock.requirements_for(&roots)?, groups)
    }

    fn install_requirements(
        &self,
        requirements: Vec<Requirement>,
        groups: &[&str],
    ) -> Result<Lockfile, BundleError> {
        let resolver = Resolver::new(self.sources.clone(), &self.store).with_base_dir(&self.root);
        let mut resolution = resolver.resolve(requirements, &self.platform)?;
        resolution.install_pending(&self.store)?;

        let lock = Lockfile::from_resolution(&resolution, &self.sources, groups);
        lock.to_file(&self.lockfile_path())?;
        info!(
            "Your bundle is complete: {} packages locked in {}",
            resolution.len(),
            LOCK_FILE
        );
        Ok(lock)
    }

    fn check_groups(&self, groups: &[&str]) -> Result<(), BundleError> {
        match groups.iter().find(|g| self.manifest.group(g).is_none()) {
            Some(missing) => Err(BundleError::UnknownGroup(missing.to_string())),
            None => Ok(()),
        }
    }
}

/// Build the sources declared in the manifest
///
/// `http://` and `https://` entries are registries; anything else is a
/// local directory relative to the project root.
pub fn declared_sources(
    manifest: &Manifest,
    root: &Path,
) -> Result<Vec<Arc<dyn Source>>, BundleError> {
    manifest
        .sources
        .iter()
        .map(|entry| -> Result<Arc<dyn Source>, BundleError> {
            if entry.starts_with("http://") || entry.starts_with("https://") {
                Ok(Arc::new(RegistrySource::new(entry)?))
            } else {
                let path = resolve_path(Path::new(entry), root);
                Ok(Arc::new(LocalDirectory::new(path).with_url(entry.clone())))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> Store {
        Store::open(StoreConfig::new(temp.path().join("store"))).unwrap()
    }

    #[test]
    fn test_open_without_manifest() {
        let temp = TempDir::new().unwrap();
        let result = Bundle::open(temp.path(), store_in(&temp));
        assert!(matches!(result, Err(BundleError::NoManifest)));
    }

    #[test]
    fn test_declared_sources() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(MANIFEST_FILE),
            r#"sources = ["https://registry.example.org/api/v1", "vendor"]"#,
        )
        .unwrap();

        let bundle = Bundle::open(temp.path(), store_in(&temp)).unwrap();
        let urls: Vec<_> = bundle.sources.iter().map(|s| s.url()).collect();
        assert_eq!(urls, vec!["https://registry.example.org/api/v1", "vendor"]);
    }

    #[test]
    fn test_unknown_group() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST_FILE), "sources = []\n").unwrap();

        let bundle = Bundle::open(temp.path(), store_in(&temp)).unwrap();
        assert!(matches!(
            bundle.install(&["default", "docs"]),
            Err(BundleError::UnknownGroup(g)) if g == "docs"
        ));
        assert!(!bundle.lockfile_path().exists());
    }

    #[test]
    fn test_install_locked_without_lockfile() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST_FILE), "sources = []\n").unwrap();

        let bundle = Bundle::open(temp.path(), store_in(&temp)).unwrap();
        assert!(matches!(
            bundle.install_locked(&["default"]),
            Err(BundleError::NoLockfile(_))
        ));
    }

    #[test]
    fn test_empty_bundle_writes_lockfile() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST_FILE), "sources = []\n").unwrap();

        let bundle = Bundle::open(temp.path(), store_in(&temp)).unwrap();
        let lock = bundle.install(&["default"]).unwrap();
        assert_eq!(lock.groups, vec!["default"]);
        assert_eq!(Lockfile::from_file(&bundle.lockfile_path()).unwrap(), lock);
    }
}
