//! Zip serialization of the final entry list.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{error, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::contract::{ArchiveWriter, FileContent, FileEntry};
use crate::error::{PackageError, Result};

/// Writes entries as a deflated zip, in the given order.
#[derive(Debug, Default, Clone)]
pub struct ZipArchiveWriter;

fn assembly(context: &str, e: impl std::fmt::Display) -> PackageError {
    PackageError::Assembly(format!("{context}: {e}"))
}

fn write_zip(entries: &[FileEntry], target: &Path) -> Result<()> {
    let file = File::create(target).map_err(|e| assembly(&format!("cannot create {}", target.display()), e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        let bytes = match &entry.content {
            FileContent::Buffer(bytes) => bytes.clone(),
            FileContent::Source(source) => std::fs::read(source)
                .map_err(|e| assembly(&format!("cannot read {}", source.display()), e))?,
        };
        zip.start_file(entry.normalized_path(), options)
            .map_err(|e| assembly(&format!("cannot add {}", entry.path), e))?;
        zip.write_all(&bytes)
            .map_err(|e| assembly(&format!("cannot write {}", entry.path), e))?;
    }

    zip.finish().map_err(|e| assembly("cannot finish archive", e))?;
    Ok(())
}

#[async_trait]
impl ArchiveWriter for ZipArchiveWriter {
    async fn write(&self, entries: &[FileEntry], target: &Path) -> Result<()> {
        match tokio::fs::remove_file(target).await {
            Ok(()) => info!(path = %target.display(), "Replaced existing package"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                error!(error = ?e, path = %target.display(), "Failed to remove existing package");
                return Err(PackageError::Io(e));
            }
        }

        let count = entries.len();
        let owned = entries.to_vec();
        let target_buf: PathBuf = target.to_path_buf();
        tokio::task::spawn_blocking(move || write_zip(&owned, &target_buf))
            .await
            .map_err(|e| PackageError::Assembly(format!("archive task failed: {e}")))?
            .map_err(|e| {
                error!(error = %e, path = %target.display(), "Failed to write package");
                e
            })?;
        info!(path = %target.display(), entries = count, "Wrote package");
        Ok(())
    }
}
