//! Marketplace tag derivation.

use std::collections::HashSet;
use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::lock;
use crate::contract::{Asset, ManifestFragment, Processor};
use crate::error::Result;
use crate::manifest::{Manifest, Translation};

/// Description keyword -> tags it implies.
const KEYWORDS: &[(&str, &[&str])] = &[
    ("git", &["git"]),
    ("npm", &["node"]),
    ("spell", &["markdown"]),
    ("bootstrap", &["bootstrap"]),
    ("lint", &["linters"]),
    ("linting", &["linters"]),
    ("react", &["javascript"]),
    ("js", &["javascript"]),
    ("node", &["javascript", "node"]),
    ("c++", &["c++"]),
    ("Cplusplus", &["c++"]),
    ("xml", &["xml"]),
    ("angular", &["javascript"]),
    ("jquery", &["javascript"]),
    ("php", &["php"]),
    ("python", &["python"]),
    ("latex", &["latex"]),
    ("ruby", &["ruby"]),
    ("java", &["java"]),
    ("erlang", &["erlang"]),
    ("sql", &["sql"]),
    ("nodejs", &["node"]),
    ("c#", &["c#"]),
    ("css", &["css"]),
    ("javascript", &["javascript"]),
    ("ftp", &["ftp"]),
    ("haskell", &["haskell"]),
    ("unity", &["unity"]),
    ("terminal", &["terminal"]),
    ("powershell", &["powershell"]),
    ("laravel", &["laravel"]),
    ("meteor", &["meteor"]),
    ("emmet", &["emmet"]),
    ("eslint", &["linters"]),
    ("tfs", &["tfs"]),
    ("rust", &["rust"]),
];

static KEYWORD_PATTERNS: LazyLock<Vec<(Regex, &'static [&'static str])>> = LazyLock::new(|| {
    KEYWORDS
        .iter()
        .map(|(keyword, tags)| {
            let pattern = format!(r"(?i)\b(?:{})(?:\W|$)", regex::escape(keyword));
            (Regex::new(&pattern).expect("valid keyword regex"), *tags)
        })
        .collect()
});

static ON_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^onLanguage:(.*)$").expect("valid regex"));
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W").expect("valid regex"));

/// Contribution point -> tags it implies when non-empty.
const CONTRIBUTION_TAGS: &[(&str, &[&str])] = &[
    ("themes", &["theme", "color-theme"]),
    ("iconThemes", &["theme", "icon-theme"]),
    ("snippets", &["snippet"]),
    ("keybindings", &["keybindings"]),
    ("debuggers", &["debuggers"]),
    ("jsonValidation", &["json"]),
];

pub struct TagsProcessor {
    manifest: Manifest,
    tags: Mutex<String>,
}

impl TagsProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        TagsProcessor {
            manifest: manifest.clone(),
            tags: Mutex::new(String::new()),
        }
    }
}

fn extension_tags(extensions: &[String]) -> impl Iterator<Item = String> + '_ {
    extensions
        .iter()
        .map(|ext| NON_WORD.replace_all(ext, "").into_owned())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!("__ext_{ext}"))
}

fn language_pack_tags<'a>(
    translations: &'a [Translation],
    language_id: &'a str,
) -> impl Iterator<Item = String> + 'a {
    translations
        .iter()
        .flat_map(move |t| [format!("__lp_{}", t.id), format!("__lp-{language_id}_{}", t.id)])
}

/// Every tag the manifest implies, in derivation order, with duplicates.
pub fn derive_tags(manifest: &Manifest) -> Vec<String> {
    let mut tags: Vec<String> = manifest.keywords.clone();

    if let Some(contributes) = &manifest.contributes {
        for (kind, implied) in CONTRIBUTION_TAGS {
            if contributes.has(kind) {
                tags.extend(implied.iter().map(|t| t.to_string()));
            }
        }
        for loc in &contributes.localizations {
            tags.push(format!("lp-{}", loc.language_id));
            tags.extend(language_pack_tags(&loc.translations, &loc.language_id));
        }
        for language in &contributes.languages {
            tags.push(language.id.clone());
            tags.extend(language.aliases.iter().cloned());
            tags.extend(extension_tags(&language.extensions));
        }
    }

    tags.extend(
        manifest
            .activation_events
            .iter()
            .filter_map(|event| ON_LANGUAGE.captures(event))
            .map(|caps| caps[1].to_string()),
    );

    if let Some(contributes) = &manifest.contributes {
        tags.extend(contributes.grammars.iter().filter_map(|g| g.language.clone()));
    }

    let description = manifest.description.as_deref().unwrap_or_default();
    for (pattern, implied) in KEYWORD_PATTERNS.iter() {
        if pattern.is_match(description) {
            tags.extend(implied.iter().map(|t| t.to_string()));
        }
    }
    tags
}

#[async_trait]
impl Processor for TagsProcessor {
    fn name(&self) -> &'static str {
        "tags"
    }

    async fn on_end(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let tags: Vec<String> = derive_tags(&self.manifest)
            .into_iter()
            .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
            .collect();
        debug!(count = tags.len(), "Derived marketplace tags");
        *lock(&self.tags) = tags.join(",");
        Ok(())
    }

    fn assets(&self) -> Vec<Asset> {
        Vec::new()
    }

    fn manifest(&self) -> ManifestFragment {
        let mut fragment = ManifestFragment::new();
        fragment.insert("tags".into(), Value::String(lock(&self.tags).clone()));
        fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn tags_for(value: Value) -> String {
        let manifest: Manifest = serde_json::from_value(value).unwrap();
        let processor = TagsProcessor::new(&manifest);
        processor.on_end().await.unwrap();
        processor.manifest()["tags"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn keywords_and_contributions() {
        let tags = tags_for(json!({
            "keywords": ["alpha", "theme", ""],
            "contributes": {
                "themes": [{ "label": "Dark" }],
                "snippets": [],
                "languages": [{ "id": "foo", "aliases": ["Foo"], "extensions": [".foo", ".f-o"] }],
                "grammars": [{ "language": "foo" }]
            },
            "activationEvents": ["onLanguage:bar", "onCommand:x"]
        }))
        .await;
        assert_eq!(tags, "alpha,theme,color-theme,foo,Foo,__ext_foo,__ext_fo,bar");
    }

    #[tokio::test]
    async fn language_pack_tags_are_derived() {
        let tags = tags_for(json!({
            "contributes": {
                "localizations": [{
                    "languageId": "de",
                    "translations": [{ "id": "vscode", "path": "./de.json" }]
                }]
            }
        }))
        .await;
        assert_eq!(tags, "lp-de,__lp_vscode,__lp-de_vscode");
    }

    #[tokio::test]
    async fn description_keywords_respect_word_boundaries() {
        let tags = tags_for(json!({ "description": "A Node helper for C++ and JavaScript, not nodes" })).await;
        assert_eq!(tags, "javascript,node,c++");

        let none = tags_for(json!({ "description": "Gitter rustic" })).await;
        assert_eq!(none, "");
    }
}
