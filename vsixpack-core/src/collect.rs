//! File universe collection: every regular file under every resolved root.

use std::io::ErrorKind;

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::contract::{CandidateFile, ResolvedRoot};
use crate::error::{PackageError, Result};

/// Enumerates candidate files for all roots, concatenated in root order.
pub async fn collect_files(roots: &[ResolvedRoot]) -> Result<Vec<CandidateFile>> {
    let tasks = roots.iter().cloned().map(|root| async move {
        tokio::task::spawn_blocking(move || collect_root(&root))
            .await
            .map_err(|e| PackageError::Assembly(format!("file collection task failed: {e}")))?
    });
    let per_root = try_join_all(tasks).await?;
    let files: Vec<CandidateFile> = per_root.into_iter().flatten().collect();
    info!(count = files.len(), roots = roots.len(), "Collected candidate files");
    Ok(files)
}

/// Walks one root. A root's own `node_modules` is skipped: installed
/// packages arrive as separate roots. A missing root yields no files.
/// Symlinks are followed, except those that loop back to an ancestor.
pub fn collect_root(root: &ResolvedRoot) -> Result<Vec<CandidateFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(&root.path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_type().is_dir() && e.file_name() == std::ffi::OsStr::new("node_modules")));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 && e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                debug!(root = %root.path.display(), "Resolved root does not exist; skipping");
                return Ok(Vec::new());
            }
            Err(e) if e.loop_ancestor().is_some() => {
                warn!(path = ?e.path(), "Symlink points to an ancestor directory; skipping");
                continue;
            }
            Err(e) => {
                error!(error = %e, root = %root.path.display(), "Failed to walk directory");
                return Err(PackageError::Io(e.into()));
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(within) = entry.path().strip_prefix(&root.path) else {
            continue;
        };
        let within = within
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let relative_path = if root.prefix.is_empty() {
            within
        } else {
            format!("{}/{within}", root.prefix)
        };
        if relative_path.ends_with('\r') {
            continue;
        }
        files.push(CandidateFile {
            relative_path,
            source: entry.into_path(),
        });
    }
    debug!(root = %root.path.display(), count = files.len(), "Walked resolved root");
    Ok(files)
}
