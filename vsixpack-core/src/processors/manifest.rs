//! Core descriptor fields, plus end-of-run manifest sanity checks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::contract::{Asset, ManifestFragment, Processor, Prompt};
use crate::error::{PackageError, Result};
use crate::manifest::{is_github_repository, ExtensionKind, Manifest, Qna};

const RESERVED_PUBLISHER: &str = "vscode-samples";

pub struct ManifestProcessor {
    fragment: ManifestFragment,
    legacy_extension_kind: bool,
    publisher: String,
    has_repository: bool,
    prompt: Arc<dyn Prompt>,
}

fn unique_join(items: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .filter(|i| seen.insert(i.as_str()))
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

impl ManifestProcessor {
    pub fn new(manifest: &Manifest, prompt: Arc<dyn Prompt>) -> Self {
        let mut flags = vec!["Public"];
        if manifest.preview {
            flags.push("Preview");
        }

        let repository = manifest.repository_url();
        let (enable_qna, customer_qna) = match &manifest.qna {
            Some(Qna::Link(link)) if link == "marketplace" => (Some(true), None),
            Some(Qna::Link(link)) => (None, Some(link.clone())),
            Some(Qna::Enabled(false)) => (Some(false), None),
            _ => (None, None),
        };

        let localized_languages = manifest
            .localizations()
            .iter()
            .map(|loc| {
                loc.localized_language_name
                    .clone()
                    .or_else(|| loc.language_name.clone())
                    .unwrap_or_else(|| loc.language_id.clone())
            })
            .collect::<Vec<_>>()
            .join(",");

        let mut links = json!({
            "repository": repository,
            "bugs": manifest.bugs_url(),
            "homepage": manifest.homepage,
        });
        if repository.as_deref().is_some_and(is_github_repository) {
            links["github"] = json!(repository);
        }

        let value = json!({
            "id": manifest.name,
            "displayName": manifest.display_name.clone().unwrap_or_else(|| manifest.name.clone()),
            "version": manifest.version,
            "publisher": manifest.publisher,
            "engine": manifest.engines.get("vscode"),
            "description": manifest.description.clone().unwrap_or_default(),
            "categories": manifest.categories.join(","),
            "flags": flags.join(" "),
            "tags": "",
            "links": links,
            "galleryBanner": manifest.gallery_banner.clone().unwrap_or_default(),
            "badges": manifest.badges,
            "githubMarkdown": manifest.markdown.as_deref() != Some("standard"),
            "enableMarketplaceQnA": enable_qna,
            "customerQnALink": customer_qna,
            "extensionDependencies": unique_join(&manifest.extension_dependencies),
            "extensionPack": unique_join(&manifest.extension_pack),
            "localizedLanguages": localized_languages,
        });
        let fragment = match value {
            Value::Object(map) => map,
            _ => ManifestFragment::new(),
        };

        ManifestProcessor {
            fragment,
            legacy_extension_kind: matches!(manifest.extension_kind, Some(ExtensionKind::Single(_))),
            publisher: manifest.publisher.clone(),
            has_repository: repository.is_some(),
            prompt,
        }
    }
}

#[async_trait]
impl Processor for ManifestProcessor {
    fn name(&self) -> &'static str {
        "manifest"
    }

    async fn on_end(&self) -> Result<()> {
        if self.legacy_extension_kind {
            warn!("The 'extensionKind' property should be of type 'string[]'. Learn more at: https://aka.ms/vscode/api/incorrect-execution-location");
        }

        if self.publisher == RESERVED_PUBLISHER {
            return Err(PackageError::processor(format!(
                "It's not allowed to use the '{RESERVED_PUBLISHER}' publisher. Learn more at: https://code.visualstudio.com/api/working-with-extensions/publishing-extension."
            )));
        }

        if !self.has_repository {
            warn!("A 'repository' field is missing from the 'package.json' manifest file.");
            let prompt = Arc::clone(&self.prompt);
            let proceed = tokio::task::spawn_blocking(move || prompt.confirm("Do you want to continue?"))
                .await
                .map_err(|e| PackageError::processor(format!("confirmation prompt failed: {e}")))??;
            if !proceed {
                return Err(PackageError::processor("Aborted"));
            }
        }
        Ok(())
    }

    fn assets(&self) -> Vec<Asset> {
        Vec::new()
    }

    fn manifest(&self) -> ManifestFragment {
        self.fragment.clone()
    }
}
