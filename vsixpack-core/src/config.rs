use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Options for one packaging run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PackageOptions {
    /// Project root; defaults to the process working directory.
    pub cwd: Option<PathBuf>,
    /// Output file, or a directory to place the default-named archive in.
    pub package_path: Option<PathBuf>,
    pub base_content_url: Option<String>,
    pub base_images_url: Option<String>,
    pub use_yarn: bool,
    /// Packages to include (with their dependencies) in yarn mode.
    pub dependency_entry_points: Option<Vec<String>>,
    /// Alternative ignore file; unlike the default `.vscodeignore` it must exist.
    pub ignore_file: Option<PathBuf>,
    /// Auto-accept confirmation prompts.
    pub non_interactive: bool,
}

impl PackageOptions {
    pub fn cwd(&self) -> std::io::Result<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            cwd = ?self.cwd,
            use_yarn = self.use_yarn,
            entry_points = self.dependency_entry_points.as_ref().map(|e| e.len()).unwrap_or(0),
            ignore_file = ?self.ignore_file,
            "Loaded package options"
        );
        debug!(?self, "Package options (full debug)");
    }
}
