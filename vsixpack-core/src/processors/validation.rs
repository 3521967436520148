use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::error;

use super::lock;
use crate::contract::{Asset, FileEntry, ManifestFragment, Processor};
use crate::error::{PackageError, Result};

#[derive(Default)]
struct SeenPaths {
    by_lowercase: HashMap<String, Vec<String>>,
    duplicates: BTreeSet<String>,
}

/// Rejects archive paths that differ only in case.
#[derive(Default)]
pub struct ValidationProcessor {
    seen: Mutex<SeenPaths>,
}

impl ValidationProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Processor for ValidationProcessor {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn on_file(&self, file: FileEntry) -> Result<FileEntry> {
        let lower = file.path.to_lowercase();
        let mut seen = lock(&self.seen);
        let paths = seen.by_lowercase.entry(lower.clone()).or_default();
        paths.push(file.path.clone());
        if paths.len() > 1 {
            seen.duplicates.insert(lower);
        }
        Ok(file)
    }

    async fn on_end(&self) -> Result<()> {
        let seen = lock(&self.seen);
        if seen.duplicates.is_empty() {
            return Ok(());
        }

        let mut lines = vec![
            "The following files have the same case insensitive path, which isn't supported by the VSIX format:"
                .to_string(),
        ];
        for lower in &seen.duplicates {
            let mut paths = seen.by_lowercase.get(lower).cloned().unwrap_or_default();
            paths.sort();
            lines.extend(paths.into_iter().map(|p| format!("  - {p}")));
        }
        error!(collisions = seen.duplicates.len(), "Case-insensitive path collisions");
        Err(PackageError::processor(lines.join("\n")))
    }

    fn assets(&self) -> Vec<Asset> {
        Vec::new()
    }

    fn manifest(&self) -> ManifestFragment {
        ManifestFragment::new()
    }
}
