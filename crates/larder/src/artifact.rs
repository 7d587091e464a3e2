//! Artifacts and installable-unit metadata
//!
//! Every installable unit carries a `package.toml` describing its name,
//! version, declared requirements and build command. The file sits at the
//! root of an unpacked source archive, inside a local package directory, and
//! inside the record the store writes for each installed unit.

use crate::requirement::{Requirement, RequirementError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metadata file name inside every unit
pub const METADATA_FILE: &str = "package.toml";

/// Errors that can occur while reading unit metadata
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// No metadata file in the unit directory
    #[error("No package.toml found in {}", .0.display())]
    MissingMetadata(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse {path}: {error}")]
    ParseError {
        path: PathBuf,
        error: toml::de::Error,
    },

    /// Failed to serialize metadata
    #[error("Failed to serialize metadata: {0}")]
    SerializeError(String),

    /// A declared requirement is malformed
    #[error("Invalid requirement in {path}: {error}")]
    InvalidRequirement {
        path: PathBuf,
        error: RequirementError,
    },
}

/// Build harness declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSpec {
    /// Program and arguments, run from the unit's source directory
    pub command: Vec<String>,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            command: vec!["sh".to_string(), "build.sh".to_string()],
        }
    }
}

/// Contents of `package.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitMetadata {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Declared requirements, one requirement line each
    #[serde(default)]
    pub requires: Vec<String>,

    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Build harness (defaults to `sh build.sh`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
}

impl UnitMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            requires: Vec::new(),
            description: None,
            build: None,
        }
    }

    /// Load the metadata file of the unit in `dir`
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let path = dir.join(METADATA_FILE);
        if !path.is_file() {
            return Err(ArtifactError::MissingMetadata(dir.to_path_buf()));
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|error| ArtifactError::ParseError { path, error })
    }

    /// Write the metadata file into `dir`
    pub fn save(&self, dir: &Path) -> Result<(), ArtifactError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ArtifactError::SerializeError(e.to_string()))?;
        fs::create_dir_all(dir)?;
        fs::write(dir.join(METADATA_FILE), content)?;
        Ok(())
    }

    /// Check whether `dir` holds a unit
    pub fn exists_in(dir: &Path) -> bool {
        dir.join(METADATA_FILE).is_file()
    }

    /// Parse the declared requirements
    pub fn requirements(&self, dir: &Path) -> Result<Vec<Requirement>, ArtifactError> {
        self.requires
            .iter()
            .map(|line| {
                Requirement::parse(line).map_err(|error| ArtifactError::InvalidRequirement {
                    path: dir.join(METADATA_FILE),
                    error,
                })
            })
            .collect()
    }

    /// Build command to run
    pub fn build_command(&self) -> Vec<String> {
        self.build.clone().unwrap_or_default().command
    }
}

/// Where an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Installed into the store
    Installed,

    /// Freshly unpacked source that still needs its build step
    Unpacked,

    /// Used in place from a local directory
    Linked,
}

/// Filesystem representation of one exact package version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    kind: ArtifactKind,
}

impl Artifact {
    pub fn installed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Installed,
        }
    }

    pub fn unpacked(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Unpacked,
        }
    }

    pub fn linked(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Linked,
        }
    }

    /// Directory holding the unit's `package.toml`
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Check if this artifact still needs to be built and installed
    pub fn is_unpacked(&self) -> bool {
        self.kind == ArtifactKind::Unpacked
    }

    /// Read the unit metadata
    pub fn metadata(&self) -> Result<UnitMetadata, ArtifactError> {
        UnitMetadata::load(&self.path)
    }

    /// Enumerate the artifact's declared dependencies
    pub fn requires(&self) -> Result<Vec<Requirement>, ArtifactError> {
        self.metadata()?.requirements(&self.path)
    }
}
