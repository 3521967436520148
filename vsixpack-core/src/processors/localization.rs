use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::lock;
use crate::contract::{Asset, FileEntry, ManifestFragment, Processor, ARCHIVE_ROOT};
use crate::error::Result;
use crate::manifest::Manifest;

const TRANSLATION_ASSET_PREFIX: &str = "Microsoft.VisualStudio.Code.Translation.";
const CORE_TRANSLATION_ID: &str = "vscode";

/// Emits a translation asset for each language pack file found.
pub struct LocalizationProcessor {
    /// Archive path -> upper-cased language id.
    translations: BTreeMap<String, String>,
    assets: Mutex<Vec<Asset>>,
}

impl LocalizationProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        // Last reference per language wins.
        let mut by_language = BTreeMap::new();
        for loc in manifest.localizations() {
            for translation in &loc.translations {
                if translation.id != CORE_TRANSLATION_ID || translation.path.is_empty() {
                    continue;
                }
                let path = translation
                    .path
                    .trim_start_matches("./")
                    .trim_start_matches(".\\")
                    .replace('\\', "/");
                by_language.insert(loc.language_id.to_uppercase(), format!("{ARCHIVE_ROOT}/{path}"));
            }
        }
        LocalizationProcessor {
            translations: by_language.into_iter().map(|(lang, path)| (path, lang)).collect(),
            assets: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Processor for LocalizationProcessor {
    fn name(&self) -> &'static str {
        "localization"
    }

    async fn on_file(&self, file: FileEntry) -> Result<FileEntry> {
        let path = file.normalized_path();
        if let Some(language) = self.translations.get(&path) {
            lock(&self.assets).push(Asset {
                asset_type: format!("{TRANSLATION_ASSET_PREFIX}{language}"),
                path,
            });
        }
        Ok(file)
    }

    fn assets(&self) -> Vec<Asset> {
        lock(&self.assets).clone()
    }

    fn manifest(&self) -> ManifestFragment {
        ManifestFragment::new()
    }
}
