use std::path::Path;
use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::lock;
use crate::contract::{Asset, FileEntry, ManifestFragment, Processor, ARCHIVE_ROOT};
use crate::error::Result;
use crate::manifest::Manifest;

const LICENSE_ASSET: &str = "Microsoft.VisualStudio.Services.Content.License";

static DEFAULT_LICENSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^extension/license(\.(md|txt))?$").expect("valid regex"));
static SEE_LICENSE_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SEE LICENSE IN (.+)$").expect("valid regex"));

enum LicenseMatch {
    Default,
    Exact(String),
}

impl LicenseMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            LicenseMatch::Default => DEFAULT_LICENSE.is_match(path),
            LicenseMatch::Exact(expected) => path == expected,
        }
    }
}

/// Records the first license file seen, giving it a `.txt` extension when it has none.
pub struct LicenseProcessor {
    matcher: LicenseMatch,
    found: Mutex<Option<String>>,
}

impl LicenseProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        let matcher = manifest
            .license
            .as_ref()
            .and_then(|license| license.name())
            .and_then(|license| SEE_LICENSE_IN.captures(license))
            .map(|caps| {
                let file = caps[1].trim_start_matches("./");
                LicenseMatch::Exact(format!("{ARCHIVE_ROOT}/{file}"))
            })
            .unwrap_or(LicenseMatch::Default);
        LicenseProcessor {
            matcher,
            found: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Processor for LicenseProcessor {
    fn name(&self) -> &'static str {
        "license"
    }

    async fn on_file(&self, mut file: FileEntry) -> Result<FileEntry> {
        let mut found = lock(&self.found);
        if found.is_some() {
            return Ok(file);
        }
        let mut path = file.normalized_path();
        if !self.matcher.matches(&path) {
            return Ok(file);
        }
        if Path::new(&path).extension().is_none() {
            file.path.push_str(".txt");
            path.push_str(".txt");
        }
        debug!(path = %path, "Found license file");
        *found = Some(path);
        Ok(file)
    }

    fn assets(&self) -> Vec<Asset> {
        lock(&self.found)
            .iter()
            .map(|path| Asset {
                asset_type: LICENSE_ASSET.to_string(),
                path: path.clone(),
            })
            .collect()
    }

    fn manifest(&self) -> ManifestFragment {
        let mut fragment = ManifestFragment::new();
        let license = lock(&self.found).clone().map_or(Value::Null, Value::String);
        fragment.insert("license".into(), license);
        fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(license: Option<&str>) -> Manifest {
        serde_json::from_value(json!({ "license": license })).unwrap()
    }

    #[tokio::test]
    async fn default_license_gets_txt_extension() {
        let p = LicenseProcessor::new(&manifest(None));
        let out = p.on_file(FileEntry::from_bytes("extension/LICENSE", "MIT")).await.unwrap();
        assert_eq!(out.path, "extension/LICENSE.txt");
        assert_eq!(p.manifest()["license"], "extension/LICENSE.txt");
        assert_eq!(p.assets()[0].asset_type, LICENSE_ASSET);

        let second = p.on_file(FileEntry::from_bytes("extension/license.md", "")).await.unwrap();
        assert_eq!(second.path, "extension/license.md");
        assert_eq!(p.assets().len(), 1);
    }

    #[tokio::test]
    async fn see_license_in_selects_named_file() {
        let p = LicenseProcessor::new(&manifest(Some("SEE LICENSE IN EULA.md")));
        let skipped = p.on_file(FileEntry::from_bytes("extension/LICENSE", "")).await.unwrap();
        assert_eq!(skipped.path, "extension/LICENSE");
        p.on_file(FileEntry::from_bytes("extension/EULA.md", "")).await.unwrap();
        assert_eq!(p.manifest()["license"], "extension/EULA.md");
    }

    #[test]
    fn no_license_contributes_null() {
        let p = LicenseProcessor::new(&manifest(Some("MIT")));
        assert_eq!(p.manifest()["license"], Value::Null);
        assert!(p.assets().is_empty());
    }

    #[tokio::test]
    async fn legacy_license_object_is_understood() {
        let m: Manifest = serde_json::from_value(json!({
            "license": { "type": "SEE LICENSE IN EULA.txt", "url": "https://example.com/eula" }
        }))
        .unwrap();
        let p = LicenseProcessor::new(&m);
        p.on_file(FileEntry::from_bytes("extension/EULA.txt", "")).await.unwrap();
        assert_eq!(p.manifest()["license"], "extension/EULA.txt");

        let m: Manifest = serde_json::from_value(json!({ "license": { "type": "MIT" } })).unwrap();
        assert_eq!(m.license.as_ref().and_then(|l| l.name()), Some("MIT"));
    }
}
