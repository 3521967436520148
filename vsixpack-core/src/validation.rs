//! Manifest validation rules applied before any packaging work starts.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use crate::error::{PackageError, Result};
use crate::manifest::Manifest;

const PUBLISHING_DOCS: &str =
    "https://code.visualstudio.com/api/working-with-extensions/publishing-extension#publishing-extensions";

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9][a-z0-9\-]*$").expect("valid regex"));
static ENGINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*$|^(\^|>=)?((\d+)|x)\.((\d+)|x)\.((\d+)|x)(-.*)?$").expect("valid regex")
});

/// Hosts allowed to serve SVG images in READMEs and badges.
pub const TRUSTED_SVG_SOURCES: &[&str] = &[
    "api.bintray.com",
    "api.travis-ci.com",
    "api.travis-ci.org",
    "app.fossa.io",
    "badge.buildkite.com",
    "badge.fury.io",
    "badge.waffle.io",
    "badgen.net",
    "badges.frapsoft.com",
    "badges.gitter.im",
    "badges.greenkeeper.io",
    "cdn.travis-ci.com",
    "cdn.travis-ci.org",
    "ci.appveyor.com",
    "circleci.com",
    "cla.opensource.microsoft.com",
    "codacy.com",
    "codeclimate.com",
    "codecov.io",
    "coveralls.io",
    "david-dm.org",
    "deepscan.io",
    "dev.azure.com",
    "docs.rs",
    "flat.badgen.net",
    "gemnasium.com",
    "githost.io",
    "gitlab.com",
    "godoc.org",
    "goreportcard.com",
    "img.shields.io",
    "isitmaintained.com",
    "marketplace.visualstudio.com",
    "nodesecurity.io",
    "opencollective.com",
    "snyk.io",
    "travis-ci.com",
    "travis-ci.org",
    "visualstudio.com",
    "vsmarketplacebadge.apphb.com",
    "www.bithound.io",
    "www.versioneye.com",
];

pub fn is_host_trusted(host: &str) -> bool {
    let host = host.to_lowercase();
    TRUSTED_SVG_SOURCES.contains(&host.as_str())
}

pub fn validate_publisher(publisher: &str) -> Result<()> {
    if publisher.is_empty() {
        return Err(PackageError::manifest(format!(
            "Missing publisher name. Learn more: {PUBLISHING_DOCS}"
        )));
    }
    if !NAME.is_match(publisher) {
        return Err(PackageError::manifest(format!(
            "Invalid publisher name '{publisher}'. Expected the identifier of a publisher, not its human-friendly name.  Learn more: {PUBLISHING_DOCS}"
        )));
    }
    Ok(())
}

pub fn validate_extension_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PackageError::manifest("Missing extension name"));
    }
    if !NAME.is_match(name) {
        return Err(PackageError::manifest(format!("Invalid extension name '{name}'")));
    }
    Ok(())
}

pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(PackageError::manifest("Missing extension version"));
    }
    semver::Version::parse(version)
        .map_err(|_| PackageError::manifest(format!("Invalid extension version '{version}'")))?;
    Ok(())
}

pub fn validate_engine_compatibility(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(PackageError::manifest("Missing vscode engine compatibility version"));
    }
    if !ENGINE.is_match(version) {
        return Err(PackageError::manifest(format!(
            "Invalid vscode engine compatibility version '{version}'"
        )));
    }
    Ok(())
}

/// `@types/vscode` must not be newer than the declared engine.
pub fn validate_vscode_types_compatibility(engine_version: &str, types_version: &str) -> Result<()> {
    if engine_version == "*" {
        return Ok(());
    }
    if types_version.is_empty() {
        return Err(PackageError::manifest("Missing @types/vscode version"));
    }

    let engine = plain_version(engine_version, Some(0))
        .ok_or_else(|| PackageError::manifest("Failed to parse semver of engines.vscode"))?;
    let types = plain_version(types_version, None)
        .ok_or_else(|| PackageError::manifest("Failed to parse semver of @types/vscode"))?;

    // Each component is compared on its own; a wildcard in @types/vscode never exceeds.
    let newer = types
        .iter()
        .zip(engine.iter())
        .any(|(t, e)| matches!((t, e), (Some(t), Some(e)) if t > e));
    if newer {
        return Err(PackageError::manifest(format!(
            "@types/vscode {types_version} greater than engines.vscode {engine_version}. Consider upgrade engines.vscode or use an older @types/vscode version"
        )));
    }
    Ok(())
}

/// Strips range operators and pre-release tags. Wildcard components become
/// `wildcard`; missing ones are absent.
fn plain_version(range: &str, wildcard: Option<u64>) -> Option<[Option<u64>; 3]> {
    let trimmed = range.trim().trim_start_matches(['^', '~', '>', '<', '=', 'v']);
    let core = trimmed.split(['-', '+', ' ']).next()?;
    let mut components = [None; 3];
    for (slot, part) in components.iter_mut().zip(core.split('.')) {
        *slot = match part {
            "x" | "X" | "*" => wildcard,
            other => Some(other.parse::<u64>().ok()?),
        };
    }
    Some(components)
}

pub fn validate_manifest(manifest: Manifest) -> Result<Manifest> {
    validate_publisher(&manifest.publisher)?;
    validate_extension_name(&manifest.name)?;

    if manifest.version.is_empty() {
        return Err(PackageError::manifest("Manifest missing field: version"));
    }
    validate_version(&manifest.version)?;

    if manifest.engines.is_empty() {
        return Err(PackageError::manifest("Manifest missing field: engines"));
    }
    let engine = manifest
        .engines
        .get("vscode")
        .ok_or_else(|| PackageError::manifest("Manifest missing field: engines.vscode"))?;
    validate_engine_compatibility(engine)?;

    if let Some(types) = manifest.dev_dependencies.get("@types/vscode") {
        validate_vscode_types_compatibility(engine, types)?;
    }

    if let Some(icon) = &manifest.icon {
        if icon.to_lowercase().ends_with(".svg") {
            return Err(PackageError::manifest(format!("SVGs can't be used as icons: {icon}")));
        }
    }

    for badge in &manifest.badges {
        let decoded = percent_decode_str(&badge.url).decode_utf8_lossy();
        let parsed = Url::parse(&decoded).ok();
        let is_https = parsed.as_ref().is_some_and(|u| u.scheme() == "https");
        if !is_https {
            return Err(PackageError::manifest(format!(
                "Badge URLs must come from an HTTPS source: {}",
                badge.url
            )));
        }
        if let Some(url) = parsed {
            let host = url.host_str().unwrap_or_default();
            if url.path().to_lowercase().ends_with(".svg") && !is_host_trusted(host) {
                return Err(PackageError::manifest(format!(
                    "Badge SVGs are restricted. Please use other file image formats, such as PNG: {}",
                    badge.url
                )));
            }
        }
    }

    if manifest.dependencies.contains_key("vscode") {
        return Err(PackageError::manifest(
            "You should not depend on 'vscode' in your 'dependencies'. Did you mean to add it to 'devDependencies'?",
        ));
    }

    Ok(manifest)
}
