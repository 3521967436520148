use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use super::lock;
use crate::contract::{Asset, FileEntry, ManifestFragment, Processor, ARCHIVE_ROOT};
use crate::error::{PackageError, Result};
use crate::manifest::Manifest;

const ICON_ASSET: &str = "Microsoft.VisualStudio.Services.Icons.Default";

/// Locates the declared icon among the packaged files.
pub struct IconProcessor {
    icon: Option<String>,
    found: Mutex<bool>,
}

impl IconProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        IconProcessor {
            icon: manifest
                .icon
                .as_deref()
                .map(|icon| format!("{ARCHIVE_ROOT}/{}", icon.trim_start_matches("./"))),
            found: Mutex::new(false),
        }
    }
}

#[async_trait]
impl Processor for IconProcessor {
    fn name(&self) -> &'static str {
        "icon"
    }

    async fn on_file(&self, file: FileEntry) -> Result<FileEntry> {
        if self.icon.as_deref() == Some(file.normalized_path().as_str()) {
            *lock(&self.found) = true;
        }
        Ok(file)
    }

    async fn on_end(&self) -> Result<()> {
        match &self.icon {
            Some(icon) if !*lock(&self.found) => {
                error!(icon = %icon, "Declared icon is not part of the package");
                Err(PackageError::processor(format!(
                    "The specified icon '{icon}' wasn't found in the extension."
                )))
            }
            _ => Ok(()),
        }
    }

    fn assets(&self) -> Vec<Asset> {
        match &self.icon {
            Some(icon) if *lock(&self.found) => vec![Asset {
                asset_type: ICON_ASSET.to_string(),
                path: icon.clone(),
            }],
            _ => Vec::new(),
        }
    }

    fn manifest(&self) -> ManifestFragment {
        let mut fragment = ManifestFragment::new();
        let icon = match &self.icon {
            Some(icon) if *lock(&self.found) => Value::String(icon.clone()),
            _ => Value::Null,
        };
        fragment.insert("icon".into(), icon);
        fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(icon: Option<&str>) -> Manifest {
        Manifest {
            icon: icon.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn records_declared_icon() {
        let p = IconProcessor::new(&manifest(Some("./media/icon.png")));
        p.on_file(FileEntry::from_bytes("extension/media/icon.png", vec![0u8])).await.unwrap();
        p.on_end().await.unwrap();
        assert_eq!(p.manifest()["icon"], "extension/media/icon.png");
        assert_eq!(p.assets()[0].asset_type, ICON_ASSET);
    }

    #[tokio::test]
    async fn missing_icon_fails_at_end() {
        let p = IconProcessor::new(&manifest(Some("media/icon.png")));
        p.on_file(FileEntry::from_bytes("extension/media/other.png", vec![0u8])).await.unwrap();
        let err = p.on_end().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "The specified icon 'extension/media/icon.png' wasn't found in the extension."
        );
    }

    #[tokio::test]
    async fn no_declared_icon_is_fine() {
        let p = IconProcessor::new(&manifest(None));
        p.on_end().await.unwrap();
        assert_eq!(p.manifest()["icon"], Value::Null);
    }
}
