//! Release version parsing and constraint matching
//!
//! Versions are dotted release numbers (`0.9`, `1.0.1`, `2.10.3.4`) with an
//! optional stage suffix (`1.0a1`, `2.0b2`, `3.1rc1`, `1.0.dev4`,
//! `1.0.post2`). Constraints are comma-joined clauses (`>=1.0,<2.0`).

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during version parsing
#[derive(Debug, Error)]
pub enum VersionError {
    /// Invalid version format
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Invalid constraint format
    #[error("Invalid constraint format: {0}")]
    InvalidConstraint(String),

    /// Invalid stage suffix
    #[error("Invalid release stage: {0}")]
    InvalidStage(String),
}

/// Release stage, ordered from earliest to latest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Dev,
    Alpha,
    Beta,
    Candidate,
    Final,
    Post,
}

impl Stage {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "dev" => Some(Stage::Dev),
            "a" | "alpha" => Some(Stage::Alpha),
            "b" | "beta" => Some(Stage::Beta),
            "rc" | "c" | "pre" | "preview" => Some(Stage::Candidate),
            "post" | "rev" | "r" => Some(Stage::Post),
            _ => None,
        }
    }
}

/// A package version as offered by a source
///
/// Keeps the text it was parsed from, so pinned versions are written back
/// exactly as the source spelled them. Comparison pads release segments with
/// zeros, so `1.0` and `1.0.0` are equal.
#[derive(Debug, Clone)]
pub struct Version {
    release: Vec<u64>,
    stage: Stage,
    stage_number: u64,
    text: String,
}

impl Version {
    /// Parse a version string
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let text = s.trim();
        let s = text.strip_prefix('v').unwrap_or(text);

        // Local labels (+abc) never take part in ordering
        let s = match s.find('+') {
            Some(pos) => &s[..pos],
            None => s,
        };

        let bytes = s.as_bytes();
        let mut release = Vec::new();
        let mut pos = 0;
        loop {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if start == pos {
                return Err(VersionError::InvalidVersion(format!(
                    "Expected a release number in '{}'",
                    text
                )));
            }
            let segment = s[start..pos].parse().map_err(|_| {
                VersionError::InvalidVersion(format!("Release segment out of range: {}", text))
            })?;
            release.push(segment);

            // A dot followed by a digit continues the release part
            if pos + 1 < bytes.len() && bytes[pos] == b'.' && bytes[pos + 1].is_ascii_digit() {
                pos += 1;
                continue;
            }
            break;
        }

        let (stage, stage_number) = Self::parse_stage(&s[pos..], text)?;

        Ok(Version {
            release,
            stage,
            stage_number,
            text: text.to_string(),
        })
    }

    fn parse_stage(rest: &str, text: &str) -> Result<(Stage, u64), VersionError> {
        if rest.is_empty() {
            return Ok((Stage::Final, 0));
        }

        let rest = rest.trim_start_matches(['.', '-', '_']);
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let (tag, number) = rest.split_at(tag_len);
        let number = number.trim_start_matches(['.', '-', '_']);

        let stage = Stage::from_tag(&tag.to_ascii_lowercase())
            .ok_or_else(|| VersionError::InvalidStage(text.to_string()))?;
        let stage_number = if number.is_empty() {
            0
        } else {
            number
                .parse()
                .map_err(|_| VersionError::InvalidStage(text.to_string()))?
        };

        Ok((stage, stage_number))
    }

    /// Check if this is a dev, alpha, beta or candidate release
    pub fn is_prerelease(&self) -> bool {
        self.stage < Stage::Final
    }

    /// The text this version was parsed from
    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn segment(&self, index: usize) -> u64 {
        self.release.get(index).copied().unwrap_or(0)
    }

    /// Check whether the release part starts with `prefix` (zero-padded)
    fn has_prefix(&self, prefix: &[u64]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(i, segment)| self.segment(i) == *segment)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            match self.segment(i).cmp(&other.segment(i)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        self.stage
            .cmp(&other.stage)
            .then(self.stage_number.cmp(&other.stage_number))
    }
}

/// A single comparison inside a constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    /// `==1.0` or a bare `1.0`
    Exact(Version),

    /// `==1.0.*`
    Prefix(Vec<u64>),

    /// `!=1.0`
    NotEqual(Version),

    /// `!=1.0.*`
    NotPrefix(Vec<u64>),

    /// `~=1.4.2` (>=1.4.2, ==1.4.*)
    Compatible(Version),

    /// `>1.0`
    GreaterThan(Version),

    /// `>=1.0`
    GreaterThanOrEqual(Version),

    /// `<1.0`
    LessThan(Version),

    /// `<=1.0`
    LessThanOrEqual(Version),
}

impl Comparator {
    /// Parse a single clause such as `>=1.0` or `==2.*`
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();

        if let Some(rest) = s.strip_prefix("===").or_else(|| s.strip_prefix("==")) {
            return Self::parse_equality(rest.trim(), s, false);
        }

        if let Some(rest) = s.strip_prefix("!=") {
            return Self::parse_equality(rest.trim(), s, true);
        }

        if let Some(rest) = s.strip_prefix("~=") {
            let version = Version::parse(rest)?;
            if version.release.len() < 2 {
                return Err(VersionError::InvalidConstraint(format!(
                    "'~=' needs at least two release segments: {}",
                    s
                )));
            }
            return Ok(Comparator::Compatible(version));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(Comparator::GreaterThanOrEqual(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix("<=") {
            return Ok(Comparator::LessThanOrEqual(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix('>') {
            return Ok(Comparator::GreaterThan(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix('<') {
            return Ok(Comparator::LessThan(Version::parse(rest)?));
        }

        // `=1.0` and bare `1.0` both mean an exact pin
        let rest = s.strip_prefix('=').unwrap_or(s);
        Self::parse_equality(rest.trim(), s, false)
    }

    fn parse_equality(rest: &str, clause: &str, negated: bool) -> Result<Self, VersionError> {
        if let Some(prefix) = rest.strip_suffix(".*") {
            let segments = prefix
                .split('.')
                .map(|p| p.parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    VersionError::InvalidConstraint(format!("Invalid wildcard: {}", clause))
                })?;
            return Ok(if negated {
                Comparator::NotPrefix(segments)
            } else {
                Comparator::Prefix(segments)
            });
        }

        let version = Version::parse(rest)?;
        Ok(if negated {
            Comparator::NotEqual(version)
        } else {
            Comparator::Exact(version)
        })
    }

    /// Check if a version satisfies this comparison
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Comparator::Exact(v) => version == v,
            Comparator::Prefix(prefix) => version.has_prefix(prefix),
            Comparator::NotEqual(v) => version != v,
            Comparator::NotPrefix(prefix) => !version.has_prefix(prefix),
            Comparator::Compatible(v) => {
                let prefix = &v.release[..v.release.len() - 1];
                version >= v && version.has_prefix(prefix)
            }
            Comparator::GreaterThan(v) => version > v,
            Comparator::GreaterThanOrEqual(v) => version >= v,
            Comparator::LessThan(v) => version < v,
            Comparator::LessThanOrEqual(v) => version <= v,
        }
    }
}

fn write_prefix(f: &mut fmt::Formatter<'_>, op: &str, prefix: &[u64]) -> fmt::Result {
    let joined = prefix
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".");
    write!(f, "{}{}.*", op, joined)
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Exact(v) => write!(f, "=={}", v),
            Comparator::Prefix(p) => write_prefix(f, "==", p),
            Comparator::NotEqual(v) => write!(f, "!={}", v),
            Comparator::NotPrefix(p) => write_prefix(f, "!=", p),
            Comparator::Compatible(v) => write!(f, "~={}", v),
            Comparator::GreaterThan(v) => write!(f, ">{}", v),
            Comparator::GreaterThanOrEqual(v) => write!(f, ">={}", v),
            Comparator::LessThan(v) => write!(f, "<{}", v),
            Comparator::LessThanOrEqual(v) => write!(f, "<={}", v),
        }
    }
}

/// Version constraint: every clause must match. No clauses means any version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Constraint {
    clauses: Vec<Comparator>,
}

impl Constraint {
    /// The unconstrained constraint
    pub fn any() -> Self {
        Self::default()
    }

    /// An exact pin on `version`
    pub fn exact(version: Version) -> Self {
        Self {
            clauses: vec![Comparator::Exact(version)],
        }
    }

    /// Parse a constraint string
    ///
    /// Empty strings and `*` are unconstrained.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let mut clauses = Vec::new();
        for clause in s.split(',') {
            let clause = clause.trim();
            if clause.is_empty() || clause == "*" {
                continue;
            }
            clauses.push(Comparator::parse(clause)?);
        }
        Ok(Self { clauses })
    }

    /// Check if a version satisfies this constraint
    pub fn matches(&self, version: &Version) -> bool {
        self.clauses.iter().all(|c| c.matches(version))
    }

    /// Check if this constraint accepts any version
    pub fn is_any(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The pinned version, when this is a single exact clause
    pub fn exact_version(&self) -> Option<&Version> {
        match self.clauses.as_slice() {
            [Comparator::Exact(v)] => Some(v),
            _ => None,
        }
    }

    pub fn clauses(&self) -> &[Comparator] {
        &self.clauses
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "*");
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_release_segments() {
        assert_eq!(v("0.9").release, vec![0, 9]);
        assert_eq!(v("1.0.1").release, vec![1, 0, 1]);
        assert_eq!(v("2").release, vec![2]);
        assert_eq!(v("v1.2.3").release, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_keeps_text() {
        assert_eq!(v("1.0").to_string(), "1.0");
        assert_eq!(v(" 0.9 ").as_str(), "0.9");
    }

    #[test]
    fn test_parse_stages() {
        assert!(v("1.0a1").is_prerelease());
        assert!(v("1.0.dev3").is_prerelease());
        assert!(v("2.0rc1").is_prerelease());
        assert!(!v("1.0.post1").is_prerelease());
        assert!(!v("1.0").is_prerelease());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("abc").is_err());
        assert!(Version::parse("1.0zz").is_err());
    }

    #[test]
    fn test_zero_padding_equality() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(v("1.0") < v("1.0.1"));
    }

    #[test]
    fn test_stage_ordering() {
        assert!(v("1.0.dev1") < v("1.0a1"));
        assert!(v("1.0a1") < v("1.0a2"));
        assert!(v("1.0a2") < v("1.0b1"));
        assert!(v("1.0b1") < v("1.0rc1"));
        assert!(v("1.0rc1") < v("1.0"));
        assert!(v("1.0") < v("1.0.post1"));
        assert!(v("1.0.post1") < v("1.0.1"));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let c = Constraint::parse("1.0").unwrap();
        assert!(c.matches(&v("1.0")));
        assert!(c.matches(&v("1.0.0")));
        assert!(!c.matches(&v("1.0.1")));
        assert_eq!(c.exact_version(), Some(&v("1.0")));
    }

    #[test]
    fn test_range() {
        let c = Constraint::parse(">=1.0, <2.0").unwrap();
        assert!(c.matches(&v("1.0")));
        assert!(c.matches(&v("1.9.9")));
        assert!(!c.matches(&v("2.0")));
        assert!(!c.matches(&v("0.9")));
        assert_eq!(c.to_string(), ">=1.0,<2.0");
    }

    #[test]
    fn test_wildcard() {
        let c = Constraint::parse("==1.2.*").unwrap();
        assert!(c.matches(&v("1.2")));
        assert!(c.matches(&v("1.2.7")));
        assert!(!c.matches(&v("1.3")));

        let c = Constraint::parse("!=1.2.*").unwrap();
        assert!(!c.matches(&v("1.2.7")));
        assert!(c.matches(&v("1.3")));
    }

    #[test]
    fn test_compatible_release() {
        let c = Constraint::parse("~=1.4.2").unwrap();
        assert!(c.matches(&v("1.4.2")));
        assert!(c.matches(&v("1.4.9")));
        assert!(!c.matches(&v("1.5")));
        assert!(!c.matches(&v("1.4.1")));

        assert!(Constraint::parse("~=1").is_err());
    }

    #[test]
    fn test_not_equal() {
        let c = Constraint::parse("!=1.0").unwrap();
        assert!(!c.matches(&v("1.0.0")));
        assert!(c.matches(&v("1.0.1")));
    }

    #[test]
    fn test_any_constraint() {
        for text in ["", "*", " "] {
            let c = Constraint::parse(text).unwrap();
            assert!(c.is_any());
            assert!(c.matches(&v("0.0.1")));
            assert!(c.matches(&v("999.1")));
        }
        assert_eq!(Constraint::any().to_string(), "*");
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(Constraint::parse(">=").is_err());
        assert!(Constraint::parse("==a.*").is_err());
    }
}
