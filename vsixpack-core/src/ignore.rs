//! # ignore: gitignore-like inclusion predicate over project-relative paths
//!
//! Rules come from four layers, in order: a fixed baseline, the project's
//! ignore file, a synthesized `<rule>/**` sibling for every rule whose last
//! segment has no wildcard (so directory names cover their subtree), and a
//! final forced `!package.json`.
//!
//! A path is included when no exclude rule matches it, or when at least one
//! negation (`!`) rule matches it. Matching is shell-glob with dotfiles
//! matched by wildcards.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::contract::CandidateFile;
use crate::error::{PackageError, Result};

pub const DEFAULT_IGNORE_FILE: &str = ".vscodeignore";

/// Excluded from every package regardless of the project's ignore file.
pub const DEFAULT_IGNORE: &[&str] = &[
    ".vscodeignore",
    "package-lock.json",
    "yarn.lock",
    ".editorconfig",
    ".npmrc",
    ".yarnrc",
    ".gitattributes",
    "*.todo",
    "tslint.yaml",
    ".eslintrc*",
    ".babelrc*",
    ".prettierrc",
    "ISSUE_TEMPLATE.md",
    "CONTRIBUTING.md",
    "PULL_REQUEST_TEMPLATE.md",
    "CODE_OF_CONDUCT.md",
    ".github",
    ".travis.yml",
    "appveyor.yml",
    "**/.git/**",
    "**/*.vsix",
    "**/.DS_Store",
    "**/*.vsixmanifest",
    "**/.vscode-test/**",
];

const FORCED_INCLUDE: &str = "!package.json";

static WILDCARD_LAST_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|/)[^/]*\*[^/]*$").expect("valid regex"));
static NEGATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*!").expect("valid regex"));

#[derive(Debug)]
pub struct IgnoreRules {
    exclude: GlobSet,
    negate: GlobSet,
    exclude_count: usize,
    negate_count: usize,
}

/// Splits ignore-file text into rules, dropping blanks and `#` comments.
pub fn parse_ignore_file(raw: &str) -> Vec<String> {
    raw.split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Appends a recursive sibling for every rule whose last segment has no wildcard.
pub fn expand_directory_rules(rules: &[String]) -> Vec<String> {
    let expanded = rules
        .iter()
        .filter(|rule| !WILDCARD_LAST_SEGMENT.is_match(rule))
        .map(|rule| {
            if rule.ends_with('/') {
                format!("{rule}**")
            } else {
                format!("{rule}/**")
            }
        });
    rules.iter().cloned().chain(expanded).collect()
}

/// Malformed patterns match nothing: they are reported and left out.
fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
        {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(error = %e, pattern = %pattern, "Skipping invalid ignore pattern"),
        }
    }
    builder
        .build()
        .map_err(|e| PackageError::Filter(format!("failed to compile ignore rules: {e}")))
}

impl IgnoreRules {
    /// Compiles the baseline plus `project_rules` (already parsed, not yet expanded).
    pub fn compile(project_rules: &[String]) -> Result<Self> {
        let rules: Vec<String> = DEFAULT_IGNORE
            .iter()
            .map(|r| r.to_string())
            .chain(expand_directory_rules(project_rules))
            .chain(std::iter::once(FORCED_INCLUDE.to_string()))
            .collect();

        let (negate, exclude): (Vec<String>, Vec<String>) =
            rules.into_iter().partition(|rule| NEGATION.is_match(rule));
        let negate: Vec<String> = negate
            .iter()
            .map(|rule| rule.trim_start().trim_start_matches('!').to_string())
            .collect();

        debug!(exclude = ?exclude, negate = ?negate, "Compiled ignore rules");
        Ok(IgnoreRules {
            exclude: build_set(&exclude)?,
            negate: build_set(&negate)?,
            exclude_count: exclude.len(),
            negate_count: negate.len(),
        })
    }

    /// Loads the project's ignore file. An explicitly requested file must
    /// exist; the default `.vscodeignore` may be absent.
    pub async fn load(cwd: &Path, ignore_file: Option<&Path>) -> Result<Self> {
        let path = ignore_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.join(DEFAULT_IGNORE_FILE));

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound && ignore_file.is_none() => {
                debug!(path = %path.display(), "No ignore file; using baseline rules only");
                String::new()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(path = %path.display(), "Requested ignore file does not exist");
                return Err(PackageError::Filter(format!(
                    "ignore file not found: {}",
                    path.display()
                )));
            }
            Err(e) => {
                error!(error = ?e, path = %path.display(), "Failed to read ignore file");
                return Err(PackageError::Io(e));
            }
        };

        let rules = Self::compile(&parse_ignore_file(&raw))?;
        info!(
            path = %path.display(),
            exclude = rules.exclude_count,
            negate = rules.negate_count,
            "Loaded ignore rules"
        );
        Ok(rules)
    }

    /// `relative` is the project-relative path, without the archive root.
    pub fn is_included(&self, relative: &str) -> bool {
        !self.exclude.is_match(relative) || self.negate.is_match(relative)
    }

    pub fn filter(&self, files: Vec<CandidateFile>) -> Vec<CandidateFile> {
        let before = files.len();
        let kept: Vec<CandidateFile> = files
            .into_iter()
            .filter(|f| self.is_included(&f.relative_path))
            .collect();
        info!(before, after = kept.len(), "Applied ignore rules");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(lines: &[&str]) -> IgnoreRules {
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        IgnoreRules::compile(&lines).unwrap()
    }

    #[test]
    fn parse_drops_comments_and_blanks() {
        let parsed = parse_ignore_file("# comment\n\nout\r\n  src/**/*.ts  \n#another");
        assert_eq!(parsed, vec!["out", "src/**/*.ts"]);
    }

    #[test]
    fn directory_rules_get_recursive_siblings() {
        let expanded = expand_directory_rules(&[
            "out".to_string(),
            "dist/".to_string(),
            "**/*.map".to_string(),
            "src/*".to_string(),
        ]);
        assert_eq!(
            expanded,
            vec!["out", "dist/", "**/*.map", "src/*", "out/**", "dist/**"]
        );
    }

    #[test]
    fn bare_directory_name_excludes_itself_and_subtree() {
        let r = rules(&["out"]);
        assert!(!r.is_included("out"));
        assert!(!r.is_included("out/foo.js"));
        assert!(!r.is_included("out/nested/deep.js"));
        assert!(r.is_included("outside.js"));
    }

    #[test]
    fn negation_reincludes_excluded_paths() {
        let r = rules(&["**/*.md", "!README.md"]);
        assert!(!r.is_included("docs/guide.md"));
        assert!(r.is_included("README.md"));
    }

    #[test]
    fn negation_without_exclusion_is_a_no_op() {
        let r = rules(&["!lib/keep.js"]);
        assert!(r.is_included("lib/keep.js"));
        assert!(r.is_included("lib/other.js"));
    }

    #[test]
    fn baseline_rules_apply_and_wildcards_match_dotfiles() {
        let r = rules(&[]);
        assert!(!r.is_included(".vscodeignore"));
        assert!(!r.is_included("node_modules/x/.git/HEAD"));
        assert!(!r.is_included("old/build.vsix"));
        assert!(!r.is_included(".eslintrc.json"));
        assert!(!r.is_included(".github"));
        assert!(r.is_included("extension.js"));

        let r = rules(&["*"]);
        assert!(!r.is_included(".env"));
    }

    #[test]
    fn package_json_is_always_included() {
        let r = rules(&["*.json"]);
        assert!(r.is_included("package.json"));
        assert!(!r.is_included("tsconfig.json"));
    }

    #[test]
    fn star_does_not_cross_directories() {
        let r = rules(&["src/*.ts"]);
        assert!(!r.is_included("src/a.ts"));
        assert!(r.is_included("src/nested/a.ts"));
    }

    #[test]
    fn malformed_pattern_is_skipped() {
        let r = rules(&["src/[abc", "*.log"]);
        assert!(r.is_included("src/[abc"));
        assert!(r.is_included("src/a.js"));
        assert!(!r.is_included("debug.log"));
    }

    #[tokio::test]
    async fn missing_default_ignore_file_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let r = IgnoreRules::load(dir.path(), None).await.unwrap();
        assert!(r.is_included("extension.js"));
    }

    #[tokio::test]
    async fn missing_explicit_ignore_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("custom.ignore");
        let err = IgnoreRules::load(dir.path(), Some(&explicit)).await.unwrap_err();
        assert!(matches!(err, PackageError::Filter(_)));
    }

    #[tokio::test]
    async fn project_ignore_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".vscodeignore"), "src\n# c\n").unwrap();
        let r = IgnoreRules::load(dir.path(), None).await.unwrap();
        assert!(!r.is_included("src/extension.ts"));
        assert!(r.is_included("out/extension.js"));
    }
}
