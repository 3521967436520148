//! # assemble: manifest descriptor and content-type rendering
//!
//! Merges every processor's fragment (declared order, later wins) with the
//! flattened asset list, renders `extension.vsixmanifest` and
//! `[Content_Types].xml`, and prepends both to the processed files.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::contract::{Asset, FileEntry, ManifestFragment, Processor};
use crate::error::{PackageError, Result};
use crate::manifest::{Badge, GalleryBanner};

pub const VSIX_MANIFEST_PATH: &str = "extension.vsixmanifest";
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

const DEFAULT_CONTENT_TYPES: &[(&str, &str)] =
    &[(".json", "application/json"), (".vsixmanifest", "text/xml")];

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Links {
    pub repository: Option<String>,
    pub bugs: Option<String>,
    pub homepage: Option<String>,
    pub github: Option<String>,
}

/// Everything the manifest template needs, merged from all processors.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VsixDescriptor {
    pub id: String,
    pub display_name: String,
    pub version: String,
    pub publisher: String,
    pub engine: Option<String>,
    pub description: String,
    pub categories: String,
    pub flags: String,
    pub tags: String,
    pub links: Links,
    pub gallery_banner: GalleryBanner,
    pub badges: Vec<Badge>,
    pub github_markdown: bool,
    pub enable_marketplace_qn_a: Option<bool>,
    #[serde(rename = "customerQnALink")]
    pub customer_qn_a_link: Option<String>,
    pub extension_dependencies: String,
    pub extension_pack: String,
    pub localized_languages: String,
    pub license: Option<String>,
    pub icon: Option<String>,
    #[serde(skip)]
    pub assets: Vec<Asset>,
}

/// Merges fragments in order (later keys overwrite earlier ones).
pub fn merge_fragments(fragments: impl IntoIterator<Item = ManifestFragment>) -> ManifestFragment {
    let mut merged = ManifestFragment::new();
    for fragment in fragments {
        merged.extend(fragment);
    }
    merged
}

pub fn merge_descriptor(processors: &[Box<dyn Processor>]) -> Result<VsixDescriptor> {
    let merged = merge_fragments(processors.iter().map(|p| p.manifest()));
    let mut descriptor: VsixDescriptor = serde_json::from_value(Value::Object(merged))
        .map_err(|e| {
            error!(error = ?e, "Merged manifest fragments have an unexpected shape");
            PackageError::Assembly(format!("invalid manifest descriptor: {e}"))
        })?;
    descriptor.assets = processors.iter().flat_map(|p| p.assets()).collect();
    Ok(descriptor)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn property(xml: &mut String, id: &str, value: &str) {
    xml.push_str(&format!(
        "\t\t\t<Property Id=\"{id}\" Value=\"{}\" />\n",
        escape(value)
    ));
}

pub fn render_vsix_manifest(d: &VsixDescriptor) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<PackageManifest Version=\"2.0.0\" xmlns=\"http://schemas.microsoft.com/developer/vsx-schema/2011\" xmlns:d=\"http://schemas.microsoft.com/developer/vsx-schema-design/2011\">\n");
    xml.push_str("\t<Metadata>\n");
    xml.push_str(&format!(
        "\t\t<Identity Language=\"en-US\" Id=\"{}\" Version=\"{}\" Publisher=\"{}\" />\n",
        escape(&d.id),
        escape(&d.version),
        escape(&d.publisher)
    ));
    xml.push_str(&format!("\t\t<DisplayName>{}</DisplayName>\n", escape(&d.display_name)));
    xml.push_str(&format!(
        "\t\t<Description xml:space=\"preserve\">{}</Description>\n",
        escape(&d.description)
    ));
    xml.push_str(&format!("\t\t<Tags>{}</Tags>\n", escape(&d.tags)));
    xml.push_str(&format!("\t\t<Categories>{}</Categories>\n", escape(&d.categories)));
    xml.push_str(&format!("\t\t<GalleryFlags>{}</GalleryFlags>\n", escape(&d.flags)));

    if !d.badges.is_empty() {
        xml.push_str("\t\t<Badges>\n");
        for badge in &d.badges {
            xml.push_str(&format!(
                "\t\t\t<Badge Link=\"{}\" ImgUri=\"{}\" Description=\"{}\" />\n",
                escape(&badge.href),
                escape(&badge.url),
                escape(&badge.description)
            ));
        }
        xml.push_str("\t\t</Badges>\n");
    }

    xml.push_str("\t\t<Properties>\n");
    property(&mut xml, "Microsoft.VisualStudio.Code.Engine", d.engine.as_deref().unwrap_or_default());
    property(&mut xml, "Microsoft.VisualStudio.Code.ExtensionDependencies", &d.extension_dependencies);
    property(&mut xml, "Microsoft.VisualStudio.Code.ExtensionPack", &d.extension_pack);
    property(&mut xml, "Microsoft.VisualStudio.Code.LocalizedLanguages", &d.localized_languages);
    if let Some(repository) = &d.links.repository {
        property(&mut xml, "Microsoft.VisualStudio.Services.Links.Source", repository);
        property(&mut xml, "Microsoft.VisualStudio.Services.Links.Getstarted", repository);
        match &d.links.github {
            Some(github) => property(&mut xml, "Microsoft.VisualStudio.Services.Links.GitHub", github),
            None => property(&mut xml, "Microsoft.VisualStudio.Services.Links.Repository", repository),
        }
    }
    if let Some(bugs) = &d.links.bugs {
        property(&mut xml, "Microsoft.VisualStudio.Services.Links.Support", bugs);
    }
    if let Some(homepage) = &d.links.homepage {
        property(&mut xml, "Microsoft.VisualStudio.Services.Links.Learn", homepage);
    }
    if let Some(color) = &d.gallery_banner.color {
        property(&mut xml, "Microsoft.VisualStudio.Services.Branding.Color", color);
    }
    if let Some(theme) = &d.gallery_banner.theme {
        property(&mut xml, "Microsoft.VisualStudio.Services.Branding.Theme", theme);
    }
    property(
        &mut xml,
        "Microsoft.VisualStudio.Services.GitHubFlavoredMarkdown",
        if d.github_markdown { "true" } else { "false" },
    );
    if let Some(enabled) = d.enable_marketplace_qn_a {
        property(
            &mut xml,
            "Microsoft.VisualStudio.Services.EnableMarketplaceQnA",
            if enabled { "true" } else { "false" },
        );
    }
    if let Some(link) = &d.customer_qn_a_link {
        property(&mut xml, "Microsoft.VisualStudio.Services.CustomerQnALink", link);
    }
    xml.push_str("\t\t</Properties>\n");

    if let Some(license) = &d.license {
        xml.push_str(&format!("\t\t<License>{}</License>\n", escape(license)));
    }
    if let Some(icon) = &d.icon {
        xml.push_str(&format!("\t\t<Icon>{}</Icon>\n", escape(icon)));
    }
    xml.push_str("\t</Metadata>\n");
    xml.push_str("\t<Installation>\n\t\t<InstallationTarget Id=\"Microsoft.VisualStudio.Code\"/>\n\t</Installation>\n");
    xml.push_str("\t<Dependencies/>\n");
    xml.push_str("\t<Assets>\n");
    xml.push_str("\t\t<Asset Type=\"Microsoft.VisualStudio.Code.Manifest\" Path=\"extension/package.json\" Addressable=\"true\" />\n");
    for asset in &d.assets {
        xml.push_str(&format!(
            "\t\t<Asset Type=\"{}\" Path=\"{}\" Addressable=\"true\" />\n",
            escape(&asset.asset_type),
            escape(&asset.path)
        ));
    }
    xml.push_str("\t</Assets>\n");
    xml.push_str("</PackageManifest>\n");
    xml
}

/// Extension (lower-cased, with dot) -> MIME type for every file, plus the fixed defaults.
pub fn content_types(files: &[FileEntry]) -> BTreeMap<String, String> {
    let mut types: BTreeMap<String, String> = files
        .iter()
        .filter_map(|f| {
            let path = f.normalized_path();
            let ext = Path::new(&path).extension()?.to_str()?.to_lowercase();
            let mime = mime_guess::from_ext(&ext).first_or_octet_stream();
            Some((format!(".{ext}"), mime.essence_str().to_string()))
        })
        .collect();
    for (ext, mime) in DEFAULT_CONTENT_TYPES {
        types.insert(ext.to_string(), mime.to_string());
    }
    types
}

pub fn render_content_types(files: &[FileEntry]) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">");
    for (ext, mime) in content_types(files) {
        xml.push_str(&format!(
            "<Default Extension=\"{}\" ContentType=\"{}\"/>",
            escape(&ext),
            escape(&mime)
        ));
    }
    xml.push_str("</Types>\n");
    xml
}

/// Produces the final archive entry list: manifest, content types, then `files` in order.
pub fn assemble(processors: &[Box<dyn Processor>], files: Vec<FileEntry>) -> Result<Vec<FileEntry>> {
    let descriptor = merge_descriptor(processors)?;
    debug!(assets = descriptor.assets.len(), id = %descriptor.id, "Rendering package descriptors");

    let mut entries = Vec::with_capacity(files.len() + 2);
    entries.push(FileEntry::from_bytes(
        VSIX_MANIFEST_PATH,
        render_vsix_manifest(&descriptor).into_bytes(),
    ));
    entries.push(FileEntry::from_bytes(
        CONTENT_TYPES_PATH,
        render_content_types(&files).into_bytes(),
    ));
    entries.extend(files);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockProcessor;
    use serde_json::json;

    fn fragment(value: Value) -> ManifestFragment {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    fn processor(name: &'static str, manifest: Value, assets: Vec<Asset>) -> Box<dyn Processor> {
        let mut p = MockProcessor::new();
        p.expect_name().return_const(name);
        let manifest = fragment(manifest);
        p.expect_manifest().returning(move || manifest.clone());
        p.expect_assets().returning(move || assets.clone());
        Box::new(p)
    }

    #[test]
    fn later_fragments_win() {
        let merged = merge_fragments(vec![
            fragment(json!({ "a": 1, "b": 1 })),
            fragment(json!({ "b": 2 })),
        ]);
        assert_eq!(Value::Object(merged), json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn content_types_merge_defaults() {
        let files = vec![
            FileEntry::from_bytes("extension/a.JS", ""),
            FileEntry::from_bytes("extension/b.png", ""),
            FileEntry::from_bytes("extension/package.json", ""),
            FileEntry::from_bytes("extension/LICENSE", ""),
        ];
        let types = content_types(&files);
        assert_eq!(types.get(".png").map(String::as_str), Some("image/png"));
        assert_eq!(types.get(".json").map(String::as_str), Some("application/json"));
        assert_eq!(types.get(".vsixmanifest").map(String::as_str), Some("text/xml"));
        assert!(types.contains_key(".js"));
        assert_eq!(types.len(), 4);
    }

    #[test]
    fn assembles_descriptors_first() {
        let processors = vec![
            processor(
                "manifest",
                json!({
                    "id": "widgets", "displayName": "Widgets & Co", "version": "1.0.0",
                    "publisher": "acme", "engine": "^1.40.0", "tags": "",
                    "links": { "repository": "https://github.com/acme/widgets.git",
                               "github": "https://github.com/acme/widgets.git" },
                    "githubMarkdown": true
                }),
                Vec::new(),
            ),
            processor("tags", json!({ "tags": "alpha,beta" }), Vec::new()),
            processor(
                "icon",
                json!({ "icon": "extension/icon.png" }),
                vec![Asset {
                    asset_type: "Microsoft.VisualStudio.Services.Icons.Default".into(),
                    path: "extension/icon.png".into(),
                }],
            ),
        ];
        let files = vec![FileEntry::from_bytes("extension/icon.png", vec![1u8])];
        let entries = assemble(&processors, files).unwrap();

        assert_eq!(entries[0].path, VSIX_MANIFEST_PATH);
        assert_eq!(entries[1].path, CONTENT_TYPES_PATH);
        assert_eq!(entries[2].path, "extension/icon.png");

        let crate::contract::FileContent::Buffer(bytes) = &entries[0].content else {
            panic!("rendered manifest should be in memory");
        };
        let xml = String::from_utf8(bytes.clone()).unwrap();
        assert!(xml.contains("<DisplayName>Widgets &amp; Co</DisplayName>"));
        assert!(xml.contains("<Tags>alpha,beta</Tags>"));
        assert!(xml.contains("<Icon>extension/icon.png</Icon>"));
        assert!(xml.contains("Microsoft.VisualStudio.Services.Links.GitHub"));
        assert!(xml.contains(
            "<Asset Type=\"Microsoft.VisualStudio.Services.Icons.Default\" Path=\"extension/icon.png\" Addressable=\"true\" />"
        ));
        assert!(!xml.contains("<License>"));
    }

    fn unescape(s: &str) -> String {
        s.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    fn element(xml: &str, tag: &str) -> String {
        let pattern = regex::Regex::new(&format!(r"(?s)<{tag}[^>]*>(.*?)</{tag}>")).unwrap();
        unescape(&pattern.captures(xml).unwrap()[1])
    }

    #[test]
    fn rendered_fields_read_back_unchanged() {
        let descriptor = VsixDescriptor {
            id: "widgets".into(),
            version: "2.0.0-beta.1".into(),
            publisher: "acme".into(),
            display_name: "Widgets <\"Pro\"> & 'Co'".into(),
            description: "Line one & two\n  <b>indented</b>".into(),
            tags: "alpha,beta & gamma,__web_extension".into(),
            engine: Some("^1.40.0".into()),
            extension_pack: "acme.one,acme.two".into(),
            links: Links {
                repository: Some("https://github.com/acme/widgets?a=1&b=2".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let xml = render_vsix_manifest(&descriptor);

        let identity = regex::Regex::new(r#"<Identity Language="en-US" Id="([^"]*)" Version="([^"]*)" Publisher="([^"]*)" />"#)
            .unwrap()
            .captures(&xml)
            .unwrap();
        assert_eq!(unescape(&identity[1]), descriptor.id);
        assert_eq!(unescape(&identity[2]), descriptor.version);
        assert_eq!(unescape(&identity[3]), descriptor.publisher);
        assert_eq!(element(&xml, "DisplayName"), descriptor.display_name);
        assert_eq!(element(&xml, "Description"), descriptor.description);
        assert_eq!(element(&xml, "Tags"), descriptor.tags);

        let properties: BTreeMap<String, String> = regex::Regex::new(r#"<Property Id="([^"]*)" Value="([^"]*)" />"#)
            .unwrap()
            .captures_iter(&xml)
            .map(|c| (c[1].to_string(), unescape(&c[2])))
            .collect();
        assert_eq!(properties["Microsoft.VisualStudio.Code.Engine"], "^1.40.0");
        assert_eq!(properties["Microsoft.VisualStudio.Code.ExtensionPack"], "acme.one,acme.two");
        assert_eq!(properties["Microsoft.VisualStudio.Code.ExtensionDependencies"], "");
        assert_eq!(
            properties["Microsoft.VisualStudio.Services.Links.Source"],
            "https://github.com/acme/widgets?a=1&b=2"
        );
        assert_eq!(properties["Microsoft.VisualStudio.Services.GitHubFlavoredMarkdown"], "false");
    }
}
