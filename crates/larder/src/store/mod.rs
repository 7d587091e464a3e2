//! Package store
//!
//! Keeps downloads and installed units under one root directory, separated
//! by runtime so several interpreters or platforms can share a store.
//!
//! Directory structure:
//! ```text
//! <root>/
//! ├── cache/<name>/<version>/<archive>
//! └── packages/<runtime>/<name>-<version>/
//!     ├── bin/
//!     └── lib/
//!         └── <name>-<version>.installed/package.toml
//! ```

mod build;

pub use build::{
    BuildEnv, BuildFailure, BIN_DIR_ENV, LIB_DIR_ENV, PACKAGE_ENV, PREFIX_ENV, VERSION_ENV,
};

use crate::archive::{content_root, Archive, ArchiveError};
use crate::artifact::{Artifact, ArtifactError, UnitMetadata};
use crate::requirement::normalize_name;
use crate::source::{Fetched, Source, SourceError};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable overriding the store root
pub const STORE_ENV: &str = "LARDER_STORE";

/// Environment variable overriding the runtime identifier
pub const RUNTIME_ENV: &str = "LARDER_RUNTIME";

/// Suffix of install record directories
pub const RECORD_SUFFIX: &str = ".installed";

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error (file operations)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Store directory could not be determined or created
    #[error("Failed to initialize store: {0}")]
    StoreInitError(String),

    /// The source could not provide the package
    #[error("Fetching {name} {version} failed: {error}")]
    Source {
        name: String,
        version: String,
        error: SourceError,
    },

    /// The downloaded archive could not be unpacked
    #[error("Unpacking {name} {version} failed: {error}")]
    Unpack {
        name: String,
        version: String,
        error: ArchiveError,
    },

    /// The unit's metadata is unreadable
    #[error("Reading metadata of {name} {version} failed: {error}")]
    Metadata {
        name: String,
        version: String,
        error: ArtifactError,
    },

    /// The build command could not be started
    #[error("Could not run build `{command}` for {name} {version}: {error}")]
    BuildSpawn {
        name: String,
        version: String,
        command: String,
        error: std::io::Error,
    },

    /// The build command failed
    #[error(
        "Building {name} {version} failed (exit code {}); sources kept in {}, log in {}:\n{log}",
        .code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()),
        .source_dir.display(),
        .log_path.display()
    )]
    Build {
        name: String,
        version: String,
        code: Option<i32>,
        log: String,
        log_path: PathBuf,
        source_dir: PathBuf,
    },

    /// The build succeeded but left no usable install record
    #[error("{name} {version} built but no install record was found")]
    NotInstalled { name: String, version: String },
}

/// Where the store lives and which runtime it installs for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub runtime: String,
}

impl StoreConfig {
    /// Store at `root` for the current runtime
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            runtime: default_runtime(),
        }
    }

    /// Read the configuration from `LARDER_STORE` and `LARDER_RUNTIME`
    ///
    /// Without `LARDER_STORE` the store lives in the user cache directory.
    pub fn from_env() -> Result<Self, StoreError> {
        let root = match std::env::var_os(STORE_ENV) {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => dirs::cache_dir()
                .ok_or_else(|| {
                    StoreError::StoreInitError("Could not determine cache directory".to_string())
                })?
                .join("larder"),
        };

        let runtime = std::env::var(RUNTIME_ENV)
            .ok()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(default_runtime);

        Ok(Self { root, runtime })
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }
}

/// Runtime identifier of the running process
pub fn default_runtime() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Persistent store of downloads and installed packages
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,

    /// Per-run unpack directory, created on first use
    work_dir: OnceCell<PathBuf>,
}

impl Store {
    /// Open the store, creating its directories if needed
    ///
    /// # Example
    /// ```no_run
    /// # use larder::{Store, StoreConfig};
    /// let store = Store::open(StoreConfig::from_env().unwrap()).unwrap();
    /// println!("store at {}", store.root().display());
    /// ```
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(config.root.join("cache"))?;
        fs::create_dir_all(config.root.join("packages").join(&config.runtime))?;

        Ok(Self {
            config,
            work_dir: OnceCell::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn runtime(&self) -> &str {
        &self.config.runtime
    }

    /// Download directory for one exact version
    pub fn cache_dir(&self, name: &str, version: &str) -> PathBuf {
        self.config
            .root
            .join("cache")
            .join(normalize_name(name))
            .join(version)
    }

    /// Install prefix for one exact version
    pub fn path_for(&self, name: &str, version: &str) -> PathBuf {
        self.config
            .root
            .join("packages")
            .join(&self.config.runtime)
            .join(unit_dir_name(name, version))
    }

    /// Library directory of an install prefix
    pub fn lib_dir(&self, name: &str, version: &str) -> PathBuf {
        self.path_for(name, version).join("lib")
    }

    /// Executable directory of an install prefix
    pub fn bin_dir(&self, name: &str, version: &str) -> PathBuf {
        self.path_for(name, version).join("bin")
    }

    /// Look up an installed package
    ///
    /// Only an install directory holding exactly one install record counts;
    /// anything else is treated as not installed.
    pub fn get(&self, name: &str, version: &str) -> Result<Option<Artifact>, StoreError> {
        let lib_dir = self.lib_dir(name, version);
        if !lib_dir.is_dir() {
            return Ok(None);
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&lib_dir)? {
            let path = entry?.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(RECORD_SUFFIX));
            if is_record && UnitMetadata::exists_in(&path) {
                records.push(path);
            }
        }

        match records.len() {
            1 => Ok(records.pop().map(Artifact::installed)),
            0 => Ok(None),
            n => {
                warn!(
                    "Ignoring {} {}: found {} install records in {}",
                    name,
                    version,
                    n,
                    lib_dir.display()
                );
                Ok(None)
            }
        }
    }

    /// Fetch a package from `source` and make it ready to install
    ///
    /// # Arguments
    /// * `name` - Package name
    /// * `version` - Exact version to fetch
    /// * `source` - Source offering that version
    ///
    /// # Returns
    /// * `Ok(Artifact)` - An unpacked source tree, or a linked local unit
    /// * `Err(StoreError)` - The fetch, integrity check or unpack failed
    pub fn prepare(
        &self,
        name: &str,
        version: &str,
        source: &dyn Source,
    ) -> Result<Artifact, StoreError> {
        let fetched = source
            .fetch(name, version, &self.cache_dir(name, version))
            .map_err(|error| StoreError::Source {
                name: name.to_string(),
                version: version.to_string(),
                error,
            })?;

        let archive_path = match fetched {
            Fetched::Directory(path) => {
                info!("Using {} {} from {}", name, version, path.display());
                return Ok(Artifact::linked(path));
            }
            Fetched::Archive(path) => path,
        };

        let unpack_error = |error: ArchiveError| StoreError::Unpack {
            name: name.to_string(),
            version: version.to_string(),
            error,
        };

        let archive = Archive::open(&archive_path).map_err(unpack_error)?;
        let destination = self
            .work_dir()?
            .join(normalize_name(name))
            .join(version);
        debug!(
            "Unpacking {} into {}",
            archive.path().display(),
            destination.display()
        );
        archive.unpack(&destination).map_err(unpack_error)?;

        Ok(Artifact::unpacked(content_root(&destination)?))
    }

    /// Build and install an unpacked artifact
    ///
    /// Artifacts that are already installed or linked are returned as they
    /// are. An install that already exists in the store is reused without
    /// running the build again.
    pub fn install(
        &self,
        name: &str,
        version: &str,
        artifact: &Artifact,
    ) -> Result<Artifact, StoreError> {
        if !artifact.is_unpacked() {
            return Ok(artifact.clone());
        }
        if let Some(installed) = self.get(name, version)? {
            return Ok(installed);
        }

        info!("Installing {} {}", name, version);
        let metadata = artifact.metadata().map_err(|error| StoreError::Metadata {
            name: name.to_string(),
            version: version.to_string(),
            error,
        })?;

        let prefix = self.path_for(name, version);
        if prefix.exists() {
            debug!("Removing incomplete install at {}", prefix.display());
            fs::remove_dir_all(&prefix)?;
        }

        let env = BuildEnv {
            lib_dir: prefix.join("lib"),
            bin_dir: prefix.join("bin"),
            prefix: prefix.clone(),
            name: name.to_string(),
            version: version.to_string(),
        };
        fs::create_dir_all(&env.lib_dir)?;
        fs::create_dir_all(&env.bin_dir)?;

        build::run(&metadata.build_command(), artifact.path(), &env).map_err(|failure| {
            match failure {
                BuildFailure::Spawn { command, error } => StoreError::BuildSpawn {
                    name: name.to_string(),
                    version: version.to_string(),
                    command,
                    error,
                },
                BuildFailure::Exit {
                    code,
                    log,
                    log_path,
                    ..
                } => StoreError::Build {
                    name: name.to_string(),
                    version: version.to_string(),
                    code,
                    log,
                    log_path,
                    source_dir: artifact.path().to_path_buf(),
                },
            }
        })?;

        let record = env
            .lib_dir
            .join(format!("{}{}", unit_dir_name(name, version), RECORD_SUFFIX));
        metadata.save(&record).map_err(|error| StoreError::Metadata {
            name: name.to_string(),
            version: version.to_string(),
            error,
        })?;

        self.get(name, version)?
            .ok_or_else(|| StoreError::NotInstalled {
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    fn work_dir(&self) -> Result<&Path, StoreError> {
        self.work_dir
            .get_or_try_init(|| {
                let dir = tempfile::Builder::new().prefix("larder-").tempdir()?;
                debug!("Unpacking into {}", dir.path().display());
                Ok::<_, std::io::Error>(dir.keep())
            })
            .map(PathBuf::as_path)
            .map_err(StoreError::from)
    }
}

fn unit_dir_name(name: &str, version: &str) -> String {
    format!("{}-{}", normalize_name(name), version)
}
