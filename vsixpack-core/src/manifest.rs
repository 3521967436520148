//! Project manifest (`package.json`) model and loader.
//!
//! The loader reads the manifest, validates it, and substitutes `%key%`
//! placeholders with values from `package.nls.json` when that file exists.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{PackageError, Result};
use crate::validation::validate_manifest;

pub const MANIFEST_FILE: &str = "package.json";
pub const NLS_FILE: &str = "package.nls.json";

static REPOSITORY_SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/]+/[^/]+$").expect("valid regex"));
static NLS_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%([\w.]+)%$").expect("valid regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub publisher: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub engines: BTreeMap<String, String>,
    pub repository: Option<UrlField>,
    pub bugs: Option<UrlField>,
    pub homepage: Option<String>,
    pub icon: Option<String>,
    pub license: Option<LicenseField>,
    #[serde(default)]
    pub preview: bool,
    pub qna: Option<Qna>,
    pub gallery_banner: Option<GalleryBanner>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    pub markdown: Option<String>,
    pub extension_kind: Option<ExtensionKind>,
    #[serde(default)]
    pub extension_dependencies: Vec<String>,
    #[serde(default)]
    pub extension_pack: Vec<String>,
    #[serde(default)]
    pub activation_events: Vec<String>,
    pub contributes: Option<Contributes>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

/// A field given either as a bare URL string or as `{ "url": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlField {
    Url(String),
    Object { url: Option<String> },
}

/// `license` as an SPDX string or the legacy `{ "type": ..., "url": ... }` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LicenseField {
    Name(String),
    Object {
        #[serde(rename = "type")]
        kind: Option<String>,
    },
}

impl LicenseField {
    pub fn name(&self) -> Option<&str> {
        match self {
            LicenseField::Name(name) => Some(name.as_str()),
            LicenseField::Object { kind } => kind.as_deref(),
        }
    }
}

impl UrlField {
    pub fn url(&self) -> Option<&str> {
        match self {
            UrlField::Url(url) => Some(url.as_str()),
            UrlField::Object { url } => url.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Qna {
    Enabled(bool),
    Link(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GalleryBanner {
    pub color: Option<String>,
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub url: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionKind {
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributes {
    #[serde(default)]
    pub localizations: Vec<Localization>,
    #[serde(default)]
    pub languages: Vec<LanguageContribution>,
    #[serde(default)]
    pub grammars: Vec<Grammar>,
    /// Every other contribution point, by name.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Contributes {
    /// True when the named contribution point is a non-empty list.
    pub fn has(&self, kind: &str) -> bool {
        matches!(self.other.get(kind), Some(Value::Array(items)) if !items.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Localization {
    pub language_id: String,
    pub language_name: Option<String>,
    pub localized_language_name: Option<String>,
    #[serde(default)]
    pub translations: Vec<Translation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Translation {
    pub id: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageContribution {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Grammar {
    pub language: Option<String>,
}

impl Manifest {
    /// Repository URL, expanding the `owner/repo` shorthand to GitHub.
    pub fn repository_url(&self) -> Option<String> {
        let url = self.repository.as_ref()?.url()?.trim();
        if url.is_empty() {
            return None;
        }
        if REPOSITORY_SHORTHAND.is_match(url) {
            return Some(format!("https://github.com/{url}.git"));
        }
        Some(url.to_string())
    }

    pub fn bugs_url(&self) -> Option<String> {
        self.bugs.as_ref().and_then(|b| b.url()).map(str::to_string)
    }

    pub fn localizations(&self) -> &[Localization] {
        self.contributes
            .as_ref()
            .map(|c| c.localizations.as_slice())
            .unwrap_or_default()
    }
}

pub fn is_github_repository(url: &str) -> bool {
    url.starts_with("https://github.com/") || url.starts_with("git@github.com:")
}

/// Reads, validates and (when `nls` is set) localizes the manifest in `cwd`.
pub async fn read_manifest(cwd: &Path, nls: bool) -> Result<Manifest> {
    let manifest_path = cwd.join(MANIFEST_FILE);
    info!(path = %manifest_path.display(), "Reading extension manifest");

    let raw = tokio::fs::read_to_string(&manifest_path).await.map_err(|e| {
        error!(error = ?e, path = %manifest_path.display(), "Failed to read manifest");
        PackageError::manifest(format!(
            "Extension manifest not found: {}",
            manifest_path.display()
        ))
    })?;

    let mut value: Value = serde_json::from_str(&raw).map_err(|e| {
        error!(error = ?e, "Manifest is not valid JSON");
        PackageError::manifest(
            "Error parsing 'package.json' manifest file: not a valid JSON file.",
        )
    })?;

    let manifest = validate_manifest(parse_manifest(value.clone())?)?;
    if !nls {
        return Ok(manifest);
    }

    let translations = read_translations(&cwd.join(NLS_FILE)).await?;
    if translations.is_empty() {
        return Ok(manifest);
    }
    debug!(count = translations.len(), "Applying manifest translations");
    patch_nls(&mut value, &translations);
    parse_manifest(value)
}

fn parse_manifest(value: Value) -> Result<Manifest> {
    serde_json::from_value(value).map_err(|e| {
        error!(error = ?e, "Manifest has an unexpected shape");
        PackageError::manifest(format!("Invalid 'package.json' manifest: {e}"))
    })
}

async fn read_translations(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            error!(error = ?e, path = %path.display(), "Failed to read manifest translations");
            return Err(PackageError::Io(e));
        }
    };
    serde_json::from_str(&raw).map_err(|_| {
        PackageError::manifest(format!(
            "Error parsing JSON manifest translations file: {}",
            path.display()
        ))
    })
}

/// Replaces every string of the exact form `%key%` with its translation.
pub fn patch_nls(value: &mut Value, translations: &BTreeMap<String, String>) {
    match value {
        Value::String(s) => {
            let translated = NLS_PLACEHOLDER
                .captures(s)
                .and_then(|caps| translations.get(&caps[1]))
                .filter(|t| !t.is_empty());
            if let Some(t) = translated {
                *s = t.clone();
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| patch_nls(item, translations)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| patch_nls(item, translations)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repository_shorthand_expands_to_github() {
        let manifest: Manifest =
            serde_json::from_value(json!({ "repository": "acme/widgets" })).unwrap();
        assert_eq!(
            manifest.repository_url().as_deref(),
            Some("https://github.com/acme/widgets.git")
        );
    }

    #[test]
    fn repository_object_form_is_read() {
        let manifest: Manifest = serde_json::from_value(
            json!({ "repository": { "type": "git", "url": "https://gitlab.com/a/b" } }),
        )
        .unwrap();
        assert_eq!(manifest.repository_url().as_deref(), Some("https://gitlab.com/a/b"));
    }

    #[test]
    fn nls_placeholders_are_patched_recursively() {
        let mut value = json!({
            "displayName": "%ext.name%",
            "contributes": { "commands": [{ "title": "%cmd.title%" }] },
            "description": "literal %ext.name% text",
            "publisher": "%missing%"
        });
        let translations = BTreeMap::from([
            ("ext.name".to_string(), "Widgets".to_string()),
            ("cmd.title".to_string(), "Run".to_string()),
        ]);
        patch_nls(&mut value, &translations);
        assert_eq!(value["displayName"], "Widgets");
        assert_eq!(value["contributes"]["commands"][0]["title"], "Run");
        assert_eq!(value["description"], "literal %ext.name% text");
        assert_eq!(value["publisher"], "%missing%");
    }

    #[test]
    fn contribution_points_are_detected_when_non_empty() {
        let contributes: Contributes =
            serde_json::from_value(json!({ "themes": [{}], "snippets": [] })).unwrap();
        assert!(contributes.has("themes"));
        assert!(!contributes.has("snippets"));
        assert!(!contributes.has("keybindings"));
    }
}
