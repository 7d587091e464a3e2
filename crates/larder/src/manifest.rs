//! Bundle manifest parsing (Larder.toml)
//!
//! Provides the declared sources and the named requirement groups that seed
//! a resolution.

use crate::requirement::{normalize_name, Requirement, RequirementError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Manifest file name
pub const MANIFEST_FILE: &str = "Larder.toml";

/// Name of the group every manifest has
pub const DEFAULT_GROUP: &str = "default";

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    ValidationError(String),

    /// Invalid requirement
    #[error("Invalid requirement in group '{group}': {error}")]
    InvalidRequirement {
        group: String,
        error: RequirementError,
    },

    /// Manifest already exists
    #[error("Refusing to overwrite existing manifest at {0}")]
    AlreadyExists(String),
}

/// Bundle manifest (Larder.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Package sources in lookup order
    #[serde(default)]
    pub sources: Vec<String>,

    /// Requirement groups in declaration order
    #[serde(default, rename = "group")]
    pub groups: Vec<Group>,
}

/// A named group of requirements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    /// Group name
    pub name: String,

    /// Requirements, in declaration order
    #[serde(default)]
    pub requires: Vec<RequirementSpec>,
}

/// Requirement specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequirementSpec {
    /// Requirement line: "Werkzeug>=0.7"
    Simple(String),

    /// Detailed requirement
    Detailed {
        /// Package name
        name: String,

        /// Version constraint
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,

        /// Only install on this platform
        #[serde(skip_serializing_if = "Option::is_none")]
        platform: Option<String>,

        /// Local directory override
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl RequirementSpec {
    /// Convert to a requirement
    pub fn to_requirement(&self) -> Result<Requirement, RequirementError> {
        match self {
            RequirementSpec::Simple(line) => Requirement::parse(line),
            RequirementSpec::Detailed {
                name,
                version,
                platform,
                path,
            } => {
                let mut req = Requirement::new(name.as_str(), version.as_deref())?;
                req.platform = platform.clone();
                req.path = path.as_ref().map(Into::into);
                Ok(req)
            }
        }
    }
}

impl Manifest {
    /// Parse a manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a string
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        if manifest.group(DEFAULT_GROUP).is_none() {
            manifest.groups.insert(
                0,
                Group {
                    name: DEFAULT_GROUP.to_string(),
                    requires: Vec::new(),
                },
            );
        }
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(ManifestError::ValidationError(
                    "Group name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(ManifestError::ValidationError(format!(
                    "Group '{}' is declared twice",
                    group.name
                )));
            }
            for spec in &group.requires {
                spec.to_requirement()
                    .map_err(|error| ManifestError::InvalidRequirement {
                        group: group.name.clone(),
                        error,
                    })?;
            }
        }

        for source in &self.sources {
            if source.trim().is_empty() {
                return Err(ManifestError::ValidationError(
                    "Source cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Get a group by name
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Collect the requirements of the selected groups that apply on `platform`
    ///
    /// Groups are visited in declaration order. A name already collected is
    /// dropped on later declarations, whatever their constraint.
    pub fn collect(&self, groups: &[&str], platform: &str) -> Result<Vec<Requirement>, ManifestError> {
        let mut seen = HashSet::new();
        let mut collected = Vec::new();

        for group in self.groups.iter().filter(|g| groups.contains(&g.name.as_str())) {
            for spec in &group.requires {
                let req = spec.to_requirement().map_err(|error| {
                    ManifestError::InvalidRequirement {
                        group: group.name.clone(),
                        error,
                    }
                })?;
                if !req.applies_to(platform) {
                    continue;
                }
                if seen.insert(normalize_name(&req.name)) {
                    collected.push(req);
                }
            }
        }

        Ok(collected)
    }

    /// Template written by `larder init`
    pub fn template() -> &'static str {
        r#"# Larder bundle manifest
sources = ["https://registry.example.org/api/v1"]

[[group]]
name = "default"
requires = [
    # "Flask",
    # { name = "requests", version = ">=2.0" },
    # { name = "mylib", path = "../mylib" },
]
"#
    }

    /// Write the template manifest into `dir`
    pub fn write_template(dir: &Path) -> Result<std::path::PathBuf, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        if path.exists() {
            return Err(ManifestError::AlreadyExists(path.display().to_string()));
        }
        std::fs::write(&path, Self::template())?;
        Ok(path)
    }
}
