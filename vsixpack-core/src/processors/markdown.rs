//! README / CHANGELOG processing: link rewriting and embedded-image checks.

use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use tracing::{debug, error};
use url::Url;

use super::lock;
use crate::config::PackageOptions;
use crate::contract::{Asset, FileEntry, ManifestFragment, Processor};
use crate::error::{PackageError, Result};
use crate::manifest::{is_github_repository, Manifest};
use crate::render::inspect_markdown;
use crate::validation::is_host_trusted;

const DETAILS_ASSET: &str = "Microsoft.VisualStudio.Services.Content.Details";
const CHANGELOG_ASSET: &str = "Microsoft.VisualStudio.Services.Content.Changelog";
const BOILERPLATE: &str = "This is the README for your extension ";

static README_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^extension/readme\.md$").expect("valid regex"));
static CHANGELOG_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^extension/changelog\.md$").expect("valid regex"));
static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[([^\]\[]*|!\[[^\]\[]*\]\([^\)]+\))\]\(([^\)]+)\)").expect("valid regex")
});
static HTML_IMG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img.+?src=["']([/.\w\s-]+)['"].*?>"#).expect("valid regex")
});
static ISSUE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\s)([\w-]+/[\w-]+)?#(\d+)\b").expect("valid regex")
});
static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+://").expect("valid regex"));
static GITHUB_REPOSITORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com/([^/]+)/([^/]+)(/|$)").expect("valid regex"));

/// Base URLs inferred from a GitHub repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessedUrls {
    pub content: String,
    pub images: String,
    pub repository: String,
}

pub fn guess_base_urls(repository: Option<&str>) -> Option<GuessedUrls> {
    let caps = GITHUB_REPOSITORY.captures(repository?)?;
    let account = &caps[1];
    let name = caps[2].strip_suffix(".git").unwrap_or(&caps[2]);
    Some(GuessedUrls {
        content: format!("https://github.com/{account}/{name}/blob/master"),
        images: format!("https://github.com/{account}/{name}/raw/master"),
        repository: format!("https://github.com/{account}/{name}"),
    })
}

/// Joins a relative link onto a base URL with exactly one separating slash.
pub fn join_url(base: &str, link: &str) -> String {
    let link = link.trim_start_matches("./").trim_start_matches('/');
    format!("{}/{}", base.trim_end_matches('/'), link)
}

fn is_relative(link: &str) -> bool {
    !ABSOLUTE_URL.is_match(link) && !link.starts_with('#')
}

pub struct MarkdownProcessor {
    name: &'static str,
    display_name: &'static str,
    path_pattern: &'static LazyLock<Regex>,
    asset_type: &'static str,
    base_content_url: Option<String>,
    base_images_url: Option<String>,
    repository_url: Option<String>,
    is_github: bool,
    assets: Mutex<Vec<Asset>>,
}

impl MarkdownProcessor {
    pub fn readme(manifest: &Manifest, options: &PackageOptions) -> Self {
        Self::new(manifest, options, "readme", "README.md", &README_PATH, DETAILS_ASSET)
    }

    pub fn changelog(manifest: &Manifest, options: &PackageOptions) -> Self {
        Self::new(
            manifest,
            options,
            "changelog",
            "CHANGELOG.md",
            &CHANGELOG_PATH,
            CHANGELOG_ASSET,
        )
    }

    fn new(
        manifest: &Manifest,
        options: &PackageOptions,
        name: &'static str,
        display_name: &'static str,
        path_pattern: &'static LazyLock<Regex>,
        asset_type: &'static str,
    ) -> Self {
        let guess = guess_base_urls(manifest.repository_url().as_deref());
        let base_content_url = options
            .base_content_url
            .clone()
            .or_else(|| guess.as_ref().map(|g| g.content.clone()));
        let base_images_url = options
            .base_images_url
            .clone()
            .or_else(|| options.base_content_url.clone())
            .or_else(|| guess.as_ref().map(|g| g.images.clone()));
        let repository_url = guess.map(|g| g.repository);
        let is_github = repository_url.as_deref().is_some_and(is_github_repository);

        MarkdownProcessor {
            name,
            display_name,
            path_pattern,
            asset_type,
            base_content_url,
            base_images_url,
            repository_url,
            is_github,
            assets: Mutex::new(Vec::new()),
        }
    }

    fn broken_link(&self, kind: &str, link: &str) -> PackageError {
        error!(file = self.display_name, link, "Relative link cannot be resolved");
        PackageError::processor(format!(
            "Couldn't detect the repository where this extension is published. The {kind} '{link}' will be broken in {}. Please provide the repository URL in package.json or use the --base-content-url and --base-images-url options.",
            self.display_name
        ))
    }

    /// Rewrites relative `[title](link)` and `![alt](src)` targets, recursing
    /// into titles that themselves hold an image.
    fn rewrite_markdown_links(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in MARKDOWN_LINK.captures_iter(text) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&text[last..whole.start]);
            out.push_str(&self.rewrite_link(&caps)?);
            last = whole.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn rewrite_link(&self, caps: &Captures<'_>) -> Result<String> {
        let bang = &caps[1];
        let is_image = !bang.is_empty();
        let link = &caps[3];
        let relative = is_relative(link);

        if self.base_content_url.is_none() && self.base_images_url.is_none() && relative {
            return Err(self.broken_link(if is_image { "image" } else { "link" }, link));
        }

        let title = self.rewrite_markdown_links(&caps[2])?;
        let prefix = if is_image {
            self.base_images_url.as_deref()
        } else {
            self.base_content_url.as_deref()
        };
        match prefix {
            Some(prefix) if relative => Ok(format!("{bang}[{title}]({})", join_url(prefix, link))),
            _ => Ok(format!("{bang}[{title}]({link})")),
        }
    }

    fn rewrite_html_images(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in HTML_IMG.captures_iter(text) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&text[last..whole.start]);
            let tag = &caps[0];
            let link = &caps[1];
            let relative = is_relative(link);
            match self.base_images_url.as_deref() {
                None if relative => {
                    error!(file = self.display_name, link, "Relative image cannot be resolved");
                    return Err(PackageError::processor(format!(
                        "Couldn't detect the repository where this extension is published. The image will be broken in {}. Please provide the repository URL in package.json or use the --base-content-url and --base-images-url options.",
                        self.display_name
                    )));
                }
                Some(prefix) if relative => {
                    out.push_str(&tag.replacen(link, &join_url(prefix, link), 1));
                }
                _ => out.push_str(tag),
            }
            last = whole.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn rewrite_issue_refs(&self, text: &str) -> String {
        let Some(repository) = self.repository_url.as_deref().filter(|_| self.is_github) else {
            return text.to_string();
        };
        ISSUE_REF
            .replace_all(text, |caps: &Captures<'_>| {
                let lead = &caps[1];
                let number = &caps[3];
                match caps.get(2).and_then(|m| m.as_str().split_once('/')) {
                    Some((owner, repo)) => format!(
                        "{lead}[{owner}/{repo}#{number}](https://github.com/{owner}/{repo}/issues/{number})"
                    ),
                    None => format!("{lead}[#{number}]({repository}/issues/{number})"),
                }
            })
            .into_owned()
    }

    fn check_images(&self, text: &str) -> Result<()> {
        let rendered = inspect_markdown(text);
        for raw in &rendered.image_sources {
            let src = percent_decode_str(raw).decode_utf8_lossy().into_owned();
            let parsed = Url::parse(&src).ok();
            let scheme = parsed.as_ref().map(|u| u.scheme().to_ascii_lowercase());

            if let Some(url) = parsed.as_ref().filter(|_| scheme.as_deref() == Some("data")) {
                let path = url.path().to_ascii_lowercase();
                if path.starts_with("image/") && path.contains("/svg") {
                    return Err(PackageError::processor(format!(
                        "SVG data URLs are not allowed in {}: {src}",
                        self.display_name
                    )));
                }
            }

            let url = match parsed {
                Some(url) if scheme.as_deref() == Some("https") => url,
                _ => {
                    return Err(PackageError::processor(format!(
                        "Images in {} must come from an HTTPS source: {src}",
                        self.display_name
                    )))
                }
            };

            let is_svg = url.path().to_ascii_lowercase().ends_with(".svg");
            if is_svg && !is_host_trusted(url.host_str().unwrap_or_default()) {
                return Err(PackageError::processor(format!(
                    "SVGs are restricted in {}; please use other file image formats, such as PNG: {src}",
                    self.display_name
                )));
            }
        }

        if rendered.has_svg {
            return Err(PackageError::processor(format!(
                "SVG tags are not allowed in {}.",
                self.display_name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for MarkdownProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn on_file(&self, file: FileEntry) -> Result<FileEntry> {
        let path = file.normalized_path();
        if !self.path_pattern.is_match(&path) {
            return Ok(file);
        }
        debug!(path = %path, asset_type = self.asset_type, "Processing markdown document");
        lock(&self.assets).push(Asset {
            asset_type: self.asset_type.to_string(),
            path,
        });

        let contents = file.read_text().await?;
        if contents.contains(BOILERPLATE) {
            return Err(PackageError::processor(
                "Make sure to edit the README.md file before you package or publish your extension.",
            ));
        }

        let contents = self.rewrite_markdown_links(&contents)?;
        let contents = self.rewrite_html_images(&contents)?;
        let contents = self.rewrite_issue_refs(&contents);
        self.check_images(&contents)?;

        Ok(FileEntry::from_bytes(file.path, contents.into_bytes()))
    }

    fn assets(&self) -> Vec<Asset> {
        lock(&self.assets).clone()
    }

    fn manifest(&self) -> ManifestFragment {
        ManifestFragment::new()
    }
}
