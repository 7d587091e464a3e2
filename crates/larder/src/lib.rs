//! Larder Library
//!
//! Resolves bundles of package requirements into exact versions, fetches
//! and verifies their archives, builds them into a local store and records
//! the result in a lockfile. This crate provides:
//! - Version parsing and constraint matching
//! - Bundle manifests (Larder.toml) and lockfiles (Larder.lock)
//! - Package sources (remote registries, local directories)
//! - Integrity-checked downloads and archive unpacking
//! - The package store and its build harness
//! - Fixpoint dependency resolution

pub mod archive;
pub mod artifact;
pub mod bundle;
pub mod fetch;
pub mod lockfile;
pub mod manifest;
pub mod path;
pub mod requirement;
pub mod resolver;
pub mod source;
pub mod store;
pub mod version;

pub use archive::{content_root, Archive, ArchiveError, ArchiveFormat, TarCompression};
pub use artifact::{Artifact, ArtifactError, ArtifactKind, BuildSpec, UnitMetadata, METADATA_FILE};
pub use bundle::{declared_sources, Bundle, BundleError};
pub use fetch::{compute_checksum, compute_file_checksum, Downloader, FetchError};
pub use lockfile::{
    LockedPackage, LockedRequirement, LockedSource, Lockfile, LockfileError, LOCK_FILE,
};
pub use manifest::{Group, Manifest, ManifestError, RequirementSpec, DEFAULT_GROUP, MANIFEST_FILE};
pub use path::find_project_root;
pub use requirement::{normalize_name, Requirement, RequirementError};
pub use resolver::{Package, Resolution, Resolver, ResolverError};
pub use source::{Fetched, LocalDirectory, RegistrySource, Source, SourceError};
pub use store::{Store, StoreConfig, StoreError};
pub use version::{Comparator, Constraint, Stage, Version, VersionError};
