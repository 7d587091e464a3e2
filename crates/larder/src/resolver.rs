//! Dependency resolution
//!
//! Resolution is a fixpoint over packages keyed by normalized name. Each
//! pass pins every unpinned package to the first version that satisfies it
//! (sources in order, versions in the order each source lists them),
//! materializes an artifact for every package that lacks one, and reads
//! the declared requirements of newly materialized artifacts. Names not seen
//! before become new packages; names already present keep their first
//! requirement. Resolution ends after a pass that adds no package.
//!
//! There is no backtracking: a transitive requirement that conflicts with an
//! earlier pin is not revisited.

use crate::artifact::{Artifact, ArtifactError};
use crate::path::resolve_path;
use crate::requirement::Requirement;
use crate::source::{LocalDirectory, Source, SourceError};
use crate::store::{Store, StoreError};
use crate::version::{Version, VersionError};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during dependency resolution
#[derive(Debug, Error)]
pub enum ResolverError {
    /// No source offers a version that satisfies the requirement
    #[error("Could not find a version of {package} that satisfies {constraint}")]
    Unresolvable { package: String, constraint: String },

    /// A path override holds no unit with this name
    #[error("{package} is not available at {}", .path.display())]
    NotAtPath { package: String, path: PathBuf },

    /// A path override holds several versions of this package
    #[error("{package} is ambiguous at {}: found versions {versions:?}", .path.display())]
    AmbiguousAtPath {
        package: String,
        path: PathBuf,
        versions: Vec<String>,
    },

    /// A path override declares a version that cannot be parsed
    #[error("Invalid version {version} for {package}: {error}")]
    InvalidVersion {
        package: String,
        version: String,
        error: VersionError,
    },

    /// A source query failed
    #[error("Looking up {package} failed: {error}")]
    Source { package: String, error: SourceError },

    /// Declared requirements could not be read
    #[error("Reading requirements of {package} {version} failed: {error}")]
    Metadata {
        package: String,
        version: String,
        error: ArtifactError,
    },

    /// Fetching, unpacking or installing failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One package under resolution
#[derive(Debug, Clone)]
pub struct Package {
    requirement: Requirement,
    version: Option<Version>,
    source: Option<Arc<dyn Source>>,
    artifact: Option<Artifact>,
    requires: Option<Vec<Requirement>>,
}

impl Package {
    fn new(requirement: Requirement) -> Self {
        Self {
            requirement,
            version: None,
            source: None,
            artifact: None,
            requires: None,
        }
    }

    /// Name as first requested
    pub fn name(&self) -> &str {
        &self.requirement.name
    }

    /// Normalized identity key
    pub fn key(&self) -> String {
        self.requirement.key()
    }

    /// The requirement this package was created from
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    /// Local directory override, as written
    pub fn path(&self) -> Option<&Path> {
        self.requirement.path.as_deref()
    }

    /// Pinned exact version
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.version.is_some() && self.source.is_some()
    }

    /// Source the pinned version comes from
    pub fn source(&self) -> Option<&Arc<dyn Source>> {
        self.source.as_ref()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// Declared requirements of the artifact, in declared order
    pub fn requires(&self) -> &[Requirement] {
        self.requires.as_deref().unwrap_or(&[])
    }

    fn version_text(&self) -> &str {
        self.version.as_ref().map(Version::as_str).unwrap_or("")
    }
}

/// Result of a resolution
#[derive(Debug)]
pub struct Resolution {
    packages: BTreeMap<String, Package>,
    passes: usize,
}

impl Resolution {
    /// Resolved packages, sorted by normalized name
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Look up a package by name
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(&crate::requirement::normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Number of fixpoint passes that ran
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Build and install every package whose artifact is still unpacked
    ///
    /// Returns how many packages were installed.
    pub fn install_pending(&mut self, store: &Store) -> Result<usize, ResolverError> {
        let mut installed = 0;
        for package in self.packages.values_mut() {
            let Some(artifact) = package.artifact.as_ref() else {
                continue;
            };
            if !artifact.is_unpacked() {
                continue;
            }

            let result = store.install(package.name(), package.version_text(), artifact)?;
            package.artifact = Some(result);
            installed += 1;
        }
        Ok(installed)
    }
}

/// Dependency resolver over an ordered list of sources
pub struct Resolver<'a> {
    sources: Vec<Arc<dyn Source>>,
    store: &'a Store,

    /// Directory that relative path overrides are resolved against
    base_dir: PathBuf,
}

impl<'a> Resolver<'a> {
    /// Create a resolver consulting `sources` in order
    pub fn new(sources: Vec<Arc<dyn Source>>, store: &'a Store) -> Self {
        Self {
            sources,
            store,
            base_dir: PathBuf::from("."),
        }
    }

    /// Resolve relative path overrides against `base_dir`
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Resolve `requirements` for `platform` to exact versions with artifacts
    ///
    /// Requirements restricted to another platform are skipped. When a name
    /// appears more than once the first requirement wins.
    pub fn resolve(
        &self,
        requirements: Vec<Requirement>,
        platform: &str,
    ) -> Result<Resolution, ResolverError> {
        let mut packages: BTreeMap<String, Package> = BTreeMap::new();
        for requirement in requirements {
            if !requirement.applies_to(platform) {
                debug!("Skipping {} on {}", requirement, platform);
                continue;
            }
            packages
                .entry(requirement.key())
                .or_insert_with(|| Package::new(requirement));
        }

        let mut passes = 0;
        loop {
            passes += 1;
            debug!("Resolution pass {} over {} packages", passes, packages.len());

            for package in packages.values_mut() {
                if !package.is_pinned() {
                    self.select(package)?;
                }
            }

            for package in packages.values_mut() {
                if package.artifact.is_none() {
                    self.materialize(package)?;
                }
            }

            let mut discovered = Vec::new();
            for package in packages.values_mut() {
                if package.requires.is_some() {
                    continue;
                }
                let Some(artifact) = package.artifact.as_ref() else {
                    continue;
                };
                let requires = artifact.requires().map_err(|error| ResolverError::Metadata {
                    package: package.name().to_string(),
                    version: package.version_text().to_string(),
                    error,
                })?;
                discovered.extend(requires.iter().cloned());
                package.requires = Some(requires);
            }

            let mut added = 0;
            for requirement in discovered {
                if let Entry::Vacant(entry) = packages.entry(requirement.key()) {
                    debug!("Discovered {}", requirement);
                    entry.insert(Package::new(requirement));
                    added += 1;
                }
            }

            if added == 0 {
                break;
            }
        }

        info!(
            "Resolved {} packages in {} passes",
            packages.len(),
            passes
        );
        Ok(Resolution { packages, passes })
    }

    /// Pin a package to an exact version and source
    fn select(&self, package: &mut Package) -> Result<(), ResolverError> {
        if let Some(path) = package.requirement.path.clone() {
            return self.select_at_path(package, &path);
        }

        let name = package.name().to_string();
        for source in &self.sources {
            let versions = source
                .available_versions(&name)
                .map_err(|error| ResolverError::Source {
                    package: name.clone(),
                    error,
                })?;

            for text in versions {
                let version = match Version::parse(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Ignoring version {} of {} from {}: {}", text, name, source.url(), e);
                        continue;
                    }
                };
                if package.requirement.constraint.matches(&version) {
                    debug!("Selected {} {} from {}", name, version, source.url());
                    package.version = Some(version);
                    package.source = Some(Arc::clone(source));
                    return Ok(());
                }
            }
        }

        Err(ResolverError::Unresolvable {
            package: name,
            constraint: package.requirement.constraint.to_string(),
        })
    }

    fn select_at_path(&self, package: &mut Package, path: &Path) -> Result<(), ResolverError> {
        let name = package.name().to_string();
        let source = LocalDirectory::new(resolve_path(path, &self.base_dir))
            .with_url(path.display().to_string());

        let mut versions = source
            .available_versions(&name)
            .map_err(|error| ResolverError::Source {
                package: name.clone(),
                error,
            })?;

        let text = match versions.len() {
            1 => versions.remove(0),
            0 => {
                return Err(ResolverError::NotAtPath {
                    package: name,
                    path: path.to_path_buf(),
                })
            }
            _ => {
                return Err(ResolverError::AmbiguousAtPath {
                    package: name,
                    path: path.to_path_buf(),
                    versions,
                })
            }
        };

        let version = Version::parse(&text).map_err(|error| ResolverError::InvalidVersion {
            package: name.clone(),
            version: text.clone(),
            error,
        })?;
        debug!("Selected {} {} at {}", name, version, path.display());
        package.version = Some(version);
        package.source = Some(Arc::new(source));
        Ok(())
    }

    /// Bind an artifact: the local unit, an existing install, or a fresh fetch
    fn materialize(&self, package: &mut Package) -> Result<(), ResolverError> {
        let Some(source) = package.source.clone() else {
            return Ok(());
        };
        let name = package.name().to_string();
        let version = package.version_text().to_string();

        if package.path().is_none() {
            if let Some(installed) = self.store.get(&name, &version)? {
                debug!("{} {} is already installed", name, version);
                package.artifact = Some(installed);
                return Ok(());
            }
        }

        let artifact = self.store.prepare(&name, &version, source.as_ref())?;
        package.artifact = Some(artifact);
        Ok(())
    }
}
