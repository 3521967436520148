//! # package: top-level packaging operations
//!
//! [`pack`] runs the whole pipeline: manifest, prepublish script,
//! dependency resolution, collection, ignore filtering, processors,
//! assembly and archive writing. [`list_files`] and [`ls`] stop after
//! filtering and report the relative paths that would be packaged.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{error, info, warn};

use crate::archive::ZipArchiveWriter;
use crate::assemble::assemble;
use crate::collect::collect_files;
use crate::command::ProcessRunner;
use crate::config::PackageOptions;
use crate::contract::{ArchiveWriter, CandidateFile, CommandRunner, FileEntry, Prompt};
use crate::dependencies::{resolve_dependencies, PackageManager};
use crate::error::{PackageError, Result};
use crate::ignore::IgnoreRules;
use crate::manifest::{read_manifest, Manifest};
use crate::pipeline::run_processors;
use crate::processors::create_default_processors;
use crate::prompt::default_prompt;

const PREPUBLISH_SCRIPT: &str = "vscode:prepublish";
const BUNDLE_FILE_THRESHOLD: usize = 5000;
const BUNDLE_JS_THRESHOLD: usize = 100;

static JS_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.js$").expect("valid regex"));

/// External collaborators of a packaging run.
#[derive(Clone)]
pub struct Collaborators {
    pub runner: Arc<dyn CommandRunner>,
    pub writer: Arc<dyn ArchiveWriter>,
    pub prompt: Arc<dyn Prompt>,
}

impl Collaborators {
    /// Real processes, a zip writer and a terminal-aware prompt.
    pub fn system(options: &PackageOptions) -> Self {
        Collaborators {
            runner: Arc::new(ProcessRunner),
            writer: Arc::new(ZipArchiveWriter),
            prompt: default_prompt(options.non_interactive),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageResult {
    pub manifest: Manifest,
    pub package_path: PathBuf,
    /// Every archive entry, descriptors first.
    pub files: Vec<FileEntry>,
}

fn default_package_name(manifest: &Manifest) -> String {
    format!("{}-{}.vsix", manifest.name, manifest.version)
}

/// Output path: `<cwd>/<name>-<version>.vsix` unless `package_path` is set;
/// an existing directory there receives the default file name.
pub async fn package_path(cwd: &Path, manifest: &Manifest, options: &PackageOptions) -> PathBuf {
    match &options.package_path {
        None => cwd.join(default_package_name(manifest)),
        Some(path) => match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => path.join(default_package_name(manifest)),
            _ => path.clone(),
        },
    }
}

/// Runs the manifest's `vscode:prepublish` script, installing dependencies first.
pub async fn prepublish(
    runner: &dyn CommandRunner,
    cwd: &Path,
    manifest: &Manifest,
    manager: PackageManager,
) -> Result<()> {
    if !manifest.scripts.contains_key(PREPUBLISH_SCRIPT) {
        return Ok(());
    }

    let (program, install) = match manager {
        PackageManager::Npm => ("npm", vec!["ci".to_string()]),
        PackageManager::Yarn => ("yarn", Vec::new()),
    };
    warn!(program, "Executing prepublish script '{program} run {PREPUBLISH_SCRIPT}'");

    for args in [install, vec!["run".to_string(), PREPUBLISH_SCRIPT.to_string()]] {
        let output = runner.run(cwd, program, args).await.map_err(|e| {
            error!(error = %e, program, "Prepublish step failed");
            PackageError::Resolution(e.to_string())
        })?;
        if !output.stdout.trim().is_empty() {
            info!(program, stdout = %output.stdout.trim_end(), "Prepublish output");
        }
        if !output.stderr.trim().is_empty() {
            warn!(program, stderr = %output.stderr.trim_end(), "Prepublish diagnostics");
        }
    }
    Ok(())
}

/// Resolves, collects and filters the files that belong in the package.
pub async fn collect_candidates(
    runner: &dyn CommandRunner,
    cwd: &Path,
    options: &PackageOptions,
) -> Result<Vec<CandidateFile>> {
    let manager = PackageManager::from_use_yarn(options.use_yarn);
    let roots = resolve_dependencies(
        runner,
        cwd,
        manager,
        options.dependency_entry_points.as_deref(),
    )
    .await?;
    let candidates = collect_files(&roots).await?;
    let rules = IgnoreRules::load(cwd, options.ignore_file.as_deref()).await?;
    Ok(rules.filter(candidates))
}

fn bundle_advisory(files: &[FileEntry]) {
    let js = files.iter().filter(|f| JS_FILE.is_match(&f.path)).count();
    if files.len() > BUNDLE_FILE_THRESHOLD || js > BUNDLE_JS_THRESHOLD {
        warn!(
            files = files.len(),
            js,
            "This extension consists of {} files, out of which {js} are JavaScript files. For performance reasons, you should bundle your extension: https://aka.ms/vscode-bundle-extension . You should also exclude unnecessary files by adding them to your .vscodeignore: https://aka.ms/vscode-vscodeignore",
            files.len()
        );
    }
}

/// Human-readable archive size: MB above one mebibyte, otherwise KB.
pub fn format_size(bytes: u64) -> String {
    if bytes > 1_048_576 {
        format!("{:.2}MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2}KB", bytes as f64 / 1024.0)
    }
}

pub async fn pack(options: &PackageOptions, collaborators: &Collaborators) -> Result<PackageResult> {
    let cwd = options.cwd()?;
    info!(cwd = %cwd.display(), "Packaging extension");

    let manifest = read_manifest(&cwd, true).await?;
    let manager = PackageManager::from_use_yarn(options.use_yarn);
    prepublish(collaborators.runner.as_ref(), &cwd, &manifest, manager).await?;

    let candidates = collect_candidates(collaborators.runner.as_ref(), &cwd, options).await?;
    let files: Vec<FileEntry> = candidates.into_iter().map(FileEntry::from_candidate).collect();

    let processors = create_default_processors(&manifest, options, collaborators.prompt.clone());
    let processed = run_processors(&processors, files).await?;
    let entries = assemble(&processors, processed)?;
    bundle_advisory(&entries);

    let target = package_path(&cwd, &manifest, options).await;
    collaborators.writer.write(&entries, &target).await?;

    let size = match tokio::fs::metadata(&target).await {
        Ok(meta) => format_size(meta.len()),
        Err(_) => "unknown size".to_string(),
    };
    info!(
        path = %target.display(),
        files = entries.len(),
        size = %size,
        "Packaged: {} ({} files, {size})",
        target.display(),
        entries.len()
    );

    Ok(PackageResult {
        manifest,
        package_path: target,
        files: entries,
    })
}

/// Relative paths of the files that would be packaged. Does not run prepublish.
pub async fn list_files(options: &PackageOptions, runner: &dyn CommandRunner) -> Result<Vec<String>> {
    let cwd = options.cwd()?;
    read_manifest(&cwd, true).await?;
    let candidates = collect_candidates(runner, &cwd, options).await?;
    Ok(candidates.into_iter().map(|c| c.relative_path).collect())
}

/// Like [`list_files`], but runs the prepublish script first.
pub async fn ls(options: &PackageOptions, runner: &dyn CommandRunner) -> Result<Vec<String>> {
    let cwd = options.cwd()?;
    let manifest = read_manifest(&cwd, true).await?;
    prepublish(runner, &cwd, &manifest, PackageManager::from_use_yarn(options.use_yarn)).await?;
    let candidates = collect_candidates(runner, &cwd, options).await?;
    Ok(candidates.into_iter().map(|c| c.relative_path).collect())
}
