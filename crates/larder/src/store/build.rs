//! Build harness
//!
//! Runs a unit's build command from its source directory with the install
//! layout exported through the environment. Combined output goes to a log
//! file that is removed on success and kept on failure.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Install prefix for the unit
pub const PREFIX_ENV: &str = "LARDER_PREFIX";
/// Library directory inside the prefix
pub const LIB_DIR_ENV: &str = "LARDER_LIB_DIR";
/// Executable directory inside the prefix
pub const BIN_DIR_ENV: &str = "LARDER_BIN_DIR";
/// Name of the unit being built
pub const PACKAGE_ENV: &str = "LARDER_PACKAGE";
/// Version of the unit being built
pub const VERSION_ENV: &str = "LARDER_VERSION";

/// Layout and identity handed to a build
#[derive(Debug, Clone)]
pub struct BuildEnv {
    pub prefix: PathBuf,
    pub lib_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub name: String,
    pub version: String,
}

impl BuildEnv {
    fn vars(&self) -> Vec<(&'static str, OsString)> {
        vec![
            (PREFIX_ENV, self.prefix.clone().into_os_string()),
            (LIB_DIR_ENV, self.lib_dir.clone().into_os_string()),
            (BIN_DIR_ENV, self.bin_dir.clone().into_os_string()),
            (PACKAGE_ENV, OsString::from(&self.name)),
            (VERSION_ENV, OsString::from(&self.version)),
        ]
    }
}

/// Outcome of a failed build
#[derive(Debug)]
pub enum BuildFailure {
    /// The command could not be started
    Spawn { command: String, error: io::Error },

    /// The command ran and exited unsuccessfully
    Exit {
        command: String,
        code: Option<i32>,
        log: String,
        log_path: PathBuf,
    },
}

/// Run `command` in `source_dir`
pub fn run(command: &[String], source_dir: &Path, env: &BuildEnv) -> Result<(), BuildFailure> {
    let command_line = command.join(" ");
    let spawn_error = |error: io::Error| BuildFailure::Spawn {
        command: command_line.clone(),
        error,
    };

    let (program, args) = command.split_first().ok_or_else(|| {
        spawn_error(io::Error::new(io::ErrorKind::InvalidInput, "empty build command"))
    })?;

    let log = tempfile::Builder::new()
        .prefix("larder-build-")
        .suffix(".log")
        .tempfile()
        .map_err(spawn_error)?;
    // stdout and stderr share one file offset
    let stdout = log.as_file().try_clone().map_err(spawn_error)?;
    let stderr = stdout.try_clone().map_err(spawn_error)?;

    debug!("Running `{}` in {}", command_line, source_dir.display());
    let status = Command::new(program)
        .args(args)
        .current_dir(source_dir)
        .envs(env.vars())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .map_err(spawn_error)?;

    if status.success() {
        return Ok(());
    }

    let output = fs::read(log.path()).map_err(spawn_error)?;
    let (_, log_path) = log.keep().map_err(|e| spawn_error(e.error))?;

    Err(BuildFailure::Exit {
        command: command_line,
        code: status.code(),
        log: String::from_utf8_lossy(&output).into_owned(),
        log_path,
    })
}
