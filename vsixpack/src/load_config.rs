//! Optional YAML defaults for package options.
//!
//! A `vsixpack.yaml` in the project root is picked up when present; an
//! explicit `--config` file must exist. Keys mirror [`PackageOptions`]
//! field names. Command-line flags always override file values.

use anyhow::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use vsixpack_core::PackageOptions;

pub const DEFAULT_CONFIG_FILE: &str = "vsixpack.yaml";

/// Loads option defaults: from `explicit` if given, else from `<cwd>/vsixpack.yaml` if it exists.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<PackageOptions> {
    let (path, required): (PathBuf, bool) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (cwd.join(DEFAULT_CONFIG_FILE), false),
    };

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound && !required => {
            debug!(config_path = ?path, "No config file; using defaults");
            return Ok(PackageOptions::default());
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path, e));
        }
    };

    if content.trim().is_empty() {
        return Ok(PackageOptions::default());
    }

    let options: PackageOptions = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path)
    })?;
    info!(config_path = ?path, "Loaded config file");
    Ok(options)
}

/// Flag values given on the command line; `None`/`false` defer to the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub cwd: Option<PathBuf>,
    pub package_path: Option<PathBuf>,
    pub base_content_url: Option<String>,
    pub base_images_url: Option<String>,
    pub use_yarn: bool,
    pub dependency_entry_points: Vec<String>,
    pub ignore_file: Option<PathBuf>,
}

pub fn merge_options(mut options: PackageOptions, flags: Overrides) -> PackageOptions {
    if flags.cwd.is_some() {
        options.cwd = flags.cwd;
    }
    if flags.package_path.is_some() {
        options.package_path = flags.package_path;
    }
    if flags.base_content_url.is_some() {
        options.base_content_url = flags.base_content_url;
    }
    if flags.base_images_url.is_some() {
        options.base_images_url = flags.base_images_url;
    }
    if flags.ignore_file.is_some() {
        options.ignore_file = flags.ignore_file;
    }
    if !flags.dependency_entry_points.is_empty() {
        options.dependency_entry_points = Some(flags.dependency_entry_points);
    }
    options.use_yarn |= flags.use_yarn;
    options
}
