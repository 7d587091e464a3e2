//! Package requirements
//!
//! A requirement names a package, optionally constrains its version, and may
//! be restricted to one platform or pinned to a local directory.

use crate::version::{Constraint, VersionError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while parsing a requirement
#[derive(Debug, Error)]
pub enum RequirementError {
    /// The requirement has no package name
    #[error("Missing package name in requirement: '{0}'")]
    MissingName(String),

    /// The version constraint could not be parsed
    #[error("Invalid version constraint for {name}: {error}")]
    InvalidConstraint { name: String, error: VersionError },
}

/// A request for a package
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// Package name as written
    pub name: String,

    /// Constraint text as written (`None` when unconstrained)
    pub version_req: Option<String>,

    /// Parsed constraint
    pub constraint: Constraint,

    /// Only applies on this platform
    pub platform: Option<String>,

    /// Local directory override
    pub path: Option<PathBuf>,
}

/// Normalize a package name into its identity key
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl Requirement {
    /// Create a requirement from a name and an optional constraint
    pub fn new(name: impl Into<String>, version_req: Option<&str>) -> Result<Self, RequirementError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RequirementError::MissingName(name));
        }

        let version_req = version_req
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        let constraint = match &version_req {
            Some(text) => Constraint::parse(text).map_err(|error| {
                RequirementError::InvalidConstraint {
                    name: name.clone(),
                    error,
                }
            })?,
            None => Constraint::any(),
        };

        Ok(Self {
            name: name.trim().to_string(),
            version_req,
            constraint,
            platform: None,
            path: None,
        })
    }

    /// Parse a requirement line such as `Werkzeug>=0.7,<1.0`
    ///
    /// Extras (`name[extra]`) and environment markers (`; ...`) are dropped.
    pub fn parse(line: &str) -> Result<Self, RequirementError> {
        let line = match line.find(';') {
            Some(pos) => &line[..pos],
            None => line,
        }
        .trim();

        let name_len = line.find(|c: char| !is_name_char(c)).unwrap_or(line.len());
        let (name, mut rest) = line.split_at(name_len);
        if name.is_empty() {
            return Err(RequirementError::MissingName(line.to_string()));
        }

        rest = rest.trim_start();
        if rest.starts_with('[') {
            rest = match rest.find(']') {
                Some(end) => &rest[end + 1..],
                None => "",
            };
        }

        let rest = rest.trim();
        let rest = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);

        Self::new(name, Some(rest))
    }

    /// Restrict the requirement to a platform
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Pin the requirement to a local directory
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Normalized identity key
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Check whether this requirement applies on `platform`
    pub fn applies_to(&self, platform: &str) -> bool {
        match &self.platform {
            Some(p) => p == platform,
            None => true,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(req) = &self.version_req {
            write!(f, " {}", req)?;
        }
        Ok(())
    }
}
