//! Command-line surface: `package` and `ls`.
//!
//! All packaging logic lives in `vsixpack-core`; this module only maps
//! flags and config files onto [`PackageOptions`] and prints results.

use crate::load_config::{load_config, merge_options, Overrides};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vsixpack_core::command::ProcessRunner;
use vsixpack_core::{ls, pack, Collaborators, PackageOptions};

/// Package a VS Code extension into a .vsix archive.
#[derive(Parser)]
#[clap(name = "vsixpack", version, about = "Package a VS Code extension into a .vsix archive")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Extension project directory (defaults to the current directory)
    #[clap(long)]
    pub cwd: Option<PathBuf>,
    /// YAML file with option defaults (defaults to vsixpack.yaml in the project)
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Use yarn instead of npm to resolve dependencies
    #[clap(long)]
    pub yarn: bool,
    /// Ignore file to use instead of .vscodeignore
    #[clap(long)]
    pub ignore_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package the extension
    Package {
        #[clap(flatten)]
        project: ProjectArgs,
        /// Output .vsix path, or a directory to place it in
        #[clap(short = 'o', long = "out")]
        out: Option<PathBuf>,
        /// Prepend relative links in README.md with this URL
        #[clap(long)]
        base_content_url: Option<String>,
        /// Prepend relative images in README.md with this URL
        #[clap(long)]
        base_images_url: Option<String>,
    },
    /// List the files that would be packaged
    Ls {
        #[clap(flatten)]
        project: ProjectArgs,
        /// Only package these dependencies and what they need (yarn only; repeatable)
        #[clap(long = "packaged-dependencies")]
        packaged_dependencies: Vec<String>,
    },
}

fn resolve_options(project: &ProjectArgs, overrides: Overrides) -> Result<PackageOptions> {
    let cwd = match &project.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir()?,
    };
    let file = load_config(project.config.as_deref(), &cwd)?;
    let options = merge_options(
        file,
        Overrides {
            cwd: Some(cwd),
            use_yarn: project.yarn,
            ignore_file: project.ignore_file.clone(),
            ..overrides
        },
    );
    options.trace_loaded();
    Ok(options)
}

/// Async entrypoint shared by `main` and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Package {
            project,
            out,
            base_content_url,
            base_images_url,
        } => {
            tracing::info!(command = "package", "Starting packaging");
            let options = resolve_options(
                &project,
                Overrides {
                    package_path: out,
                    base_content_url,
                    base_images_url,
                    ..Default::default()
                },
            )?;
            let collaborators = Collaborators::system(&options);
            match pack(&options, &collaborators).await {
                Ok(result) => {
                    tracing::info!(
                        command = "package",
                        path = %result.package_path.display(),
                        files = result.files.len(),
                        "Packaging complete"
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "package", error = %e, "Packaging failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Ls {
            project,
            packaged_dependencies,
        } => {
            tracing::info!(command = "ls", "Listing package files");
            let options = resolve_options(
                &project,
                Overrides {
                    dependency_entry_points: packaged_dependencies,
                    ..Default::default()
                },
            )?;
            let files = ls(&options, &ProcessRunner).await.map_err(|e| {
                tracing::error!(command = "ls", error = %e, "Listing failed");
                anyhow::Error::new(e)
            })?;
            for file in files {
                println!("{file}");
            }
            Ok(())
        }
    }
}
