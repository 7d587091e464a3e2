//! Lockfile management (Larder.lock)
//!
//! A lockfile is a projection of a finished resolution: every pinned package
//! with its exact version and declared requirements, grouped under the
//! source it came from. Packages pinned to a local directory are listed
//! separately. Sources keep their declaration order and packages are sorted
//! by normalized name, so the same resolution always yields the same bytes.

use crate::requirement::{normalize_name, Requirement, RequirementError};
use crate::resolver::{Package, Resolution};
use crate::source::Source;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Lockfile file name
pub const LOCK_FILE: &str = "Larder.lock";

/// Lockfile format version
pub const LOCKFILE_VERSION: u32 = 1;

/// Errors that can occur during lockfile operations
#[derive(Debug, Error)]
pub enum LockfileError {
    /// Failed to read lockfile
    #[error("Failed to read lockfile: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse lockfile: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize lockfile
    #[error("Failed to serialize lockfile: {0}")]
    SerializeError(String),

    /// Validation error
    #[error("Invalid lockfile: {0}")]
    ValidationError(String),

    /// A requested package has no pin
    #[error("{0} is not in Larder.lock. Run `larder install` to update it.")]
    NotLocked(String),

    /// A locked entry does not form a valid requirement
    #[error("Invalid locked package {package}: {error}")]
    InvalidRequirement {
        package: String,
        error: RequirementError,
    },
}

/// Lockfile (Larder.lock)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lockfile {
    /// Lockfile format version
    pub version: u32,

    /// Groups that were installed
    #[serde(default)]
    pub groups: Vec<String>,

    /// Packages pinned to local directories
    #[serde(default)]
    pub local: Vec<LockedPackage>,

    /// Packages grouped by originating source
    #[serde(default, rename = "source")]
    pub sources: Vec<LockedSource>,
}

/// Packages that came from one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedSource {
    pub url: String,

    #[serde(default)]
    pub packages: Vec<LockedPackage>,
}

/// A pinned package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,
    pub exact_version: String,

    /// Local directory override, as written in the manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Declared requirements, in declared order
    #[serde(default)]
    pub requires: Vec<LockedRequirement>,
}

/// A requirement recorded in the lockfile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedRequirement {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_req: Option<String>,
}

impl From<&Requirement> for LockedRequirement {
    fn from(requirement: &Requirement) -> Self {
        Self {
            name: requirement.name.clone(),
            version_req: requirement.version_req.clone(),
        }
    }
}

impl LockedPackage {
    fn from_package(package: &Package) -> Self {
        Self {
            name: package.name().to_string(),
            exact_version: package
                .version()
                .map(|v| v.as_str().to_string())
                .unwrap_or_default(),
            path: package.path().map(|p| p.display().to_string()),
            requires: package.requires().iter().map(LockedRequirement::from).collect(),
        }
    }

    /// Exact requirement that reproduces this pin
    pub fn to_requirement(&self) -> Result<Requirement, LockfileError> {
        let constraint = format!("=={}", self.exact_version);
        let requirement = Requirement::new(&self.name, Some(&constraint)).map_err(|error| {
            LockfileError::InvalidRequirement {
                package: self.name.clone(),
                error,
            }
        })?;

        Ok(match &self.path {
            Some(path) => requirement.with_path(path),
            None => requirement,
        })
    }

    /// Check if this package is pinned to a local directory
    pub fn is_path(&self) -> bool {
        self.path.is_some()
    }
}

impl Lockfile {
    /// Create a new empty lockfile
    pub fn new(groups: Vec<String>) -> Self {
        Self {
            version: LOCKFILE_VERSION,
            groups,
            local: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// Project a resolution into a lockfile
    ///
    /// Every source in `sources` gets an entry, even when nothing was pinned
    /// from it.
    pub fn from_resolution(
        resolution: &Resolution,
        sources: &[Arc<dyn Source>],
        groups: &[&str],
    ) -> Self {
        let mut lock = Self::new(groups.iter().map(|g| g.to_string()).collect());

        for source in sources {
            if lock.sources.iter().any(|s| s.url == source.url()) {
                continue;
            }
            lock.sources.push(LockedSource {
                url: source.url().to_string(),
                packages: Vec::new(),
            });
        }

        for package in resolution.packages() {
            let locked = LockedPackage::from_package(package);
            if package.path().is_some() {
                lock.local.push(locked);
                continue;
            }

            let Some(url) = package.source().map(|s| s.url()) else {
                continue;
            };
            match lock.sources.iter_mut().find(|s| s.url == url) {
                Some(entry) => entry.packages.push(locked),
                None => lock.sources.push(LockedSource {
                    url: url.to_string(),
                    packages: vec![locked],
                }),
            }
        }

        lock.sort_packages();
        lock
    }

    /// Parse a lockfile from a file
    pub fn from_file(path: &Path) -> Result<Self, LockfileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a lockfile from a string
    pub fn from_str(content: &str) -> Result<Self, LockfileError> {
        let lockfile: Lockfile = toml::from_str(content)?;
        lockfile.validate()?;
        Ok(lockfile)
    }

    /// Validate the lockfile
    pub fn validate(&self) -> Result<(), LockfileError> {
        if self.version != LOCKFILE_VERSION {
            return Err(LockfileError::ValidationError(format!(
                "Unsupported lockfile version: {} (expected {})",
                self.version, LOCKFILE_VERSION
            )));
        }

        for source in &self.sources {
            if source.url.is_empty() {
                return Err(LockfileError::ValidationError(
                    "Source url cannot be empty".to_string(),
                ));
            }
        }

        for pkg in self.packages() {
            if pkg.name.is_empty() {
                return Err(LockfileError::ValidationError(
                    "Package name cannot be empty".to_string(),
                ));
            }

            if pkg.exact_version.is_empty() {
                return Err(LockfileError::ValidationError(format!(
                    "Package '{}' has empty version",
                    pkg.name
                )));
            }
        }

        for pkg in &self.local {
            if !pkg.is_path() {
                return Err(LockfileError::ValidationError(format!(
                    "Local package '{}' has no path",
                    pkg.name
                )));
            }
        }

        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, LockfileError> {
        toml::to_string_pretty(self).map_err(|e| LockfileError::SerializeError(e.to_string()))
    }

    /// Write lockfile to a file
    pub fn to_file(&self, path: &Path) -> Result<(), LockfileError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// All locked packages, local ones first
    pub fn packages(&self) -> impl Iterator<Item = &LockedPackage> {
        self.local
            .iter()
            .chain(self.sources.iter().flat_map(|s| s.packages.iter()))
    }

    /// Get a locked package by name
    pub fn get_package(&self, name: &str) -> Option<&LockedPackage> {
        let key = normalize_name(name);
        self.packages().find(|p| normalize_name(&p.name) == key)
    }

    /// Exact requirements that replay the part of this lockfile reachable
    /// from `roots`
    ///
    /// Roots come first in their given order, followed by the locked
    /// requirements they pull in, breadth first. A root without a pin is an
    /// error. A locked requirement without a pin was skipped for the
    /// platform and is ignored.
    pub fn requirements_for(&self, roots: &[Requirement]) -> Result<Vec<Requirement>, LockfileError> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            let locked = self
                .get_package(&root.name)
                .ok_or_else(|| LockfileError::NotLocked(root.name.clone()))?;
            if seen.insert(normalize_name(&locked.name)) {
                queue.push_back(locked);
            }
        }

        let mut requirements = Vec::new();
        while let Some(locked) = queue.pop_front() {
            requirements.push(locked.to_requirement()?);
            for dep in &locked.requires {
                let Some(next) = self.get_package(&dep.name) else {
                    continue;
                };
                if seen.insert(normalize_name(&next.name)) {
                    queue.push_back(next);
                }
            }
        }

        Ok(requirements)
    }

    /// Sort packages by normalized name (for deterministic output)
    pub fn sort_packages(&mut self) {
        let by_key = |a: &LockedPackage, b: &LockedPackage| {
            normalize_name(&a.name).cmp(&normalize_name(&b.name))
        };
        self.local.sort_by(by_key);
        for source in &mut self.sources {
            source.packages.sort_by(by_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
groups = ["default", "dev"]

[[local]]
name = "mylib"
exact_version = "0.1.0"
path = "../mylib"
requires = []

[[source]]
url = "https://registry.example.org/api/v1"

[[source.packages]]
name = "Flask"
exact_version = "0.9"
requires = [{ name = "Werkzeug", version_req = ">=0.7" }, { name = "Jinja2" }]

[[source.packages]]
name = "Werkzeug"
exact_version = "0.8.3"
"#;

    fn package(name: &str, version: &str) -> LockedPackage {
        LockedPackage {
            name: name.to_string(),
            exact_version: version.to_string(),
            path: None,
            requires: Vec::new(),
        }
    }

    #[test]
    fn test_create_empty_lockfile() {
        let lock = Lockfile::new(vec!["default".to_string()]);
        assert_eq!(lock.version, LOCKFILE_VERSION);
        assert_eq!(lock.groups, vec!["default"]);
        assert_eq!(lock.packages().count(), 0);
    }

    #[test]
    fn test_parse_lockfile() {
        let lock = Lockfile::from_str(SAMPLE).unwrap();
        assert_eq!(lock.groups, vec!["default", "dev"]);
        assert_eq!(lock.local.len(), 1);
        assert_eq!(lock.sources.len(), 1);

        let flask = lock.get_package("flask").unwrap();
        assert_eq!(flask.exact_version, "0.9");
        assert_eq!(flask.requires.len(), 2);
        assert_eq!(flask.requires[0].version_req.as_deref(), Some(">=0.7"));
        assert_eq!(flask.requires[1].version_req, None);

        let werkzeug = lock.get_package("Werkzeug").unwrap();
        assert!(werkzeug.requires.is_empty());
    }

    #[test]
    fn test_replay_requirements() {
        let lock = Lockfile::from_str(SAMPLE).unwrap();
        let roots = vec![
            Requirement::new("mylib", None).unwrap(),
            Requirement::new("flask", None).unwrap(),
        ];
        let requirements = lock.requirements_for(&roots).unwrap();
        let names: Vec<_> = requirements.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["mylib", "Flask", "Werkzeug"]);

        assert_eq!(requirements[0].path.as_deref(), Some(Path::new("../mylib")));
        assert_eq!(requirements[1].version_req.as_deref(), Some("==0.9"));
        assert_eq!(
            requirements[1].constraint.exact_version().map(|v| v.as_str()),
            Some("0.9")
        );
    }

    #[test]
    fn test_replay_only_reachable_packages() {
        let lock = Lockfile::from_str(SAMPLE).unwrap();
        let roots = vec![Requirement::new("werkzeug", None).unwrap()];
        let requirements = lock.requirements_for(&roots).unwrap();
        let names: Vec<_> = requirements.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Werkzeug"]);
    }

    #[test]
    fn test_replay_unlocked_root() {
        let lock = Lockfile::from_str(SAMPLE).unwrap();
        let roots = vec![Requirement::new("requests", None).unwrap()];
        assert!(matches!(
            lock.requirements_for(&roots),
            Err(LockfileError::NotLocked(name)) if name == "requests"
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let result = Lockfile::from_str("version = 2\n");
        assert!(matches!(result, Err(LockfileError::ValidationError(_))));
    }

    #[test]
    fn test_local_without_path() {
        let toml = r#"
version = 1

[[local]]
name = "mylib"
exact_version = "0.1.0"
"#;
        assert!(Lockfile::from_str(toml).is_err());
    }

    #[test]
    fn test_empty_version() {
        let toml = r#"
version = 1

[[source]]
url = "https://registry.example.org/api/v1"

[[source.packages]]
name = "Flask"
exact_version = ""
"#;
        assert!(Lockfile::from_str(toml).is_err());
    }

    #[test]
    fn test_sort_packages() {
        let mut lock = Lockfile::new(Vec::new());
        lock.sources.push(LockedSource {
            url: "https://registry.example.org/api/v1".to_string(),
            packages: vec![package("zebra", "1.0"), package("Alpha", "1.0"), package("beta", "1.0")],
        });

        lock.sort_packages();

        let names: Vec<_> = lock.packages().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "zebra"]);
    }

    #[test]
    fn test_roundtrip_is_stable() {
        let lock = Lockfile::from_str(SAMPLE).unwrap();
        let first = lock.to_toml().unwrap();
        let parsed = Lockfile::from_str(&first).unwrap();
        assert_eq!(lock, parsed);
        assert_eq!(first, parsed.to_toml().unwrap());
    }
}
