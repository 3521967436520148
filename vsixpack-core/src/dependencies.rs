//! # dependencies: production dependency resolution
//!
//! Produces the list of directories (the project plus its installed
//! production dependencies) whose files are candidates for packaging.
//!
//! Two package managers are supported, each with its own listing format:
//!
//! - npm: `npm list --production --parseable` prints one absolute install
//!   path per line; npm has already pruned dev dependencies.
//! - yarn: `yarn list --prod --json` prints one JSON tree of every installed
//!   package. Without entry points, nodes whose label carries a `^`/`~`
//!   range are pruned; with entry points, only packages reachable from them
//!   are kept.
//!
//! The tree is held in an arena ([`DependencyTree`]) and walked iteratively,
//! so deep or diamond-shaped graphs neither overflow the stack nor produce
//! duplicates.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::contract::{CommandRunner, ResolvedRoot};
use crate::error::{PackageError, Result};

const NESTED_MODULES: &str = "node_modules";

static RANGED_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[\^~]").expect("valid regex"));
static TREE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\{"type":"tree".*$"#).expect("valid regex"));
static NAME_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(@?[^@]+)@.*$").expect("valid regex"));
static BROKEN_NPM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^3\.7\.[0123]$").expect("valid regex"));

/// Which listing format produced the installed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
}

impl PackageManager {
    pub fn from_use_yarn(use_yarn: bool) -> Self {
        if use_yarn {
            PackageManager::Yarn
        } else {
            PackageManager::Npm
        }
    }
}

/// One installed package in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub name: String,
    pub path: PathBuf,
    /// Arena indices of the children.
    pub children: Vec<usize>,
}

/// Arena of installed packages as reported by `yarn list`.
#[derive(Debug, Default)]
pub struct DependencyTree {
    nodes: Vec<DependencyNode>,
    roots: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct YarnReport {
    #[serde(rename = "type")]
    kind: String,
    data: YarnReportData,
}

#[derive(Debug, Deserialize)]
struct YarnReportData {
    trees: Vec<YarnTreeNode>,
}

#[derive(Debug, Deserialize)]
pub struct YarnTreeNode {
    pub name: String,
    #[serde(default)]
    pub children: Vec<YarnTreeNode>,
}

/// Extracts the bare package name from a `name@range` label.
pub fn parse_package_name(label: &str) -> String {
    if let Some(at) = label.rfind('@').filter(|&i| i > 0) {
        let (name, range) = (&label[..at], &label[at + 1..]);
        if semver::VersionReq::parse(range).is_ok() {
            return name.to_string();
        }
    }
    match NAME_FALLBACK.captures(label) {
        Some(caps) => caps[1].to_string(),
        None => label.to_string(),
    }
}

impl DependencyTree {
    /// Converts raw yarn trees into the arena. With `prune`, nodes labelled
    /// with a `^`/`~` range are dropped together with their subtrees.
    pub fn from_yarn_trees(prefix: &Path, trees: &[YarnTreeNode], prune: bool) -> Self {
        let mut tree = DependencyTree::default();
        // (raw node, install prefix, parent index)
        let mut stack: Vec<(&YarnTreeNode, PathBuf, Option<usize>)> = trees
            .iter()
            .rev()
            .map(|node| (node, prefix.to_path_buf(), None))
            .collect();

        while let Some((raw, parent_prefix, parent)) = stack.pop() {
            if prune && RANGED_LABEL.is_match(&raw.name) {
                debug!(label = %raw.name, "Pruning non-production dependency");
                continue;
            }
            let name = parse_package_name(&raw.name);
            let path = parent_prefix.join(&name);
            let index = tree.nodes.len();
            tree.nodes.push(DependencyNode {
                name,
                path: path.clone(),
                children: Vec::new(),
            });
            match parent {
                Some(p) => tree.nodes[p].children.push(index),
                None => tree.roots.push(index),
            }
            let nested = path.join(NESTED_MODULES);
            for child in raw.children.iter().rev() {
                stack.push((child, nested.clone(), Some(index)));
            }
        }
        tree
    }

    pub fn node(&self, index: usize) -> &DependencyNode {
        &self.nodes[index]
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Top-level packages reachable from `entry_points`, in first-visit order.
    pub fn select_reachable(&self, entry_points: &[String]) -> Result<Vec<usize>> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for &root in &self.roots {
            let name = self.nodes[root].name.as_str();
            if index.insert(name, root).is_some() {
                error!(dependency = name, "Dependency listed more than once");
                return Err(PackageError::Resolution(format!(
                    "Dependency seen more than once: {name}"
                )));
            }
        }

        let find = |name: &str| {
            index.get(name).copied().ok_or_else(|| {
                PackageError::Resolution(format!("Could not find dependency: {name}"))
            })
        };

        let mut reached = Vec::new();
        let mut visited = HashSet::new();
        for entry in entry_points {
            let mut stack = vec![find(entry)?];
            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    continue;
                }
                reached.push(current);
                for &child in self.nodes[current].children.iter().rev() {
                    stack.push(find(&self.nodes[child].name)?);
                }
            }
        }
        Ok(reached)
    }

    /// Install paths of `selected` and all their descendants, pre-order.
    pub fn flatten(&self, selected: &[usize]) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut stack: Vec<usize> = selected.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            paths.push(node.path.clone());
            stack.extend(node.children.iter().rev().copied());
        }
        paths
    }
}

/// Resolves the project and its production dependencies into [`ResolvedRoot`]s.
///
/// `entry_points` only affect yarn mode; npm's flat listing is used as-is.
pub async fn resolve_dependencies(
    runner: &dyn CommandRunner,
    cwd: &Path,
    manager: PackageManager,
    entry_points: Option<&[String]>,
) -> Result<Vec<ResolvedRoot>> {
    info!(cwd = %cwd.display(), ?manager, "Resolving production dependencies");
    let dirs = match manager {
        PackageManager::Npm => npm_dependencies(runner, cwd).await?,
        PackageManager::Yarn => yarn_dependencies(runner, cwd, entry_points).await?,
    };

    let mut seen = HashSet::new();
    let roots: Vec<ResolvedRoot> = std::iter::once(cwd.to_path_buf())
        .chain(dirs)
        .filter(|dir| seen.insert(dir.clone()))
        .map(|path| ResolvedRoot {
            prefix: relative_path(cwd, &path),
            path,
        })
        .collect();

    info!(count = roots.len(), "Resolved package roots");
    Ok(roots)
}

async fn npm_dependencies(runner: &dyn CommandRunner, cwd: &Path) -> Result<Vec<PathBuf>> {
    let version = runner
        .run(cwd, "npm", vec!["-v".into()])
        .await
        .map_err(|e| PackageError::Resolution(e.to_string()))?;
    let version = version.stdout.trim();
    if BROKEN_NPM.is_match(version) {
        return Err(PackageError::Resolution(format!(
            "npm@{version} doesn't work with vsixpack. Please update npm: npm install -g npm"
        )));
    }

    let args = ["list", "--production", "--parseable", "--depth=99999", "--loglevel=error"];
    let listing = runner
        .run(cwd, "npm", args.iter().map(|a| a.to_string()).collect())
        .await
        .map_err(|e| PackageError::Resolution(e.to_string()))?;

    Ok(listing
        .stdout
        .split(['\r', '\n'])
        .map(Path::new)
        .filter(|p| p.is_absolute())
        .map(Path::to_path_buf)
        .collect())
}

async fn yarn_dependencies(
    runner: &dyn CommandRunner,
    cwd: &Path,
    entry_points: Option<&[String]>,
) -> Result<Vec<PathBuf>> {
    if !cwd.join("yarn.lock").exists() {
        debug!(cwd = %cwd.display(), "No yarn.lock; packaging without dependencies");
        return Ok(Vec::new());
    }

    let args = ["list", "--prod", "--json"];
    let listing = runner
        .run(cwd, "yarn", args.iter().map(|a| a.to_string()).collect())
        .await
        .map_err(|e| PackageError::Resolution(e.to_string()))?;

    let trees = parse_yarn_listing(&listing.stdout)?;
    let tree = DependencyTree::from_yarn_trees(&cwd.join(NESTED_MODULES), &trees, entry_points.is_none());
    let selected = match entry_points {
        Some(entries) => tree.select_reachable(entries)?,
        None => tree.roots().to_vec(),
    };
    Ok(tree.flatten(&selected))
}

/// Finds the single `{"type":"tree",...}` line in yarn's JSON-lines output.
pub fn parse_yarn_listing(raw: &str) -> Result<Vec<YarnTreeNode>> {
    let unparsable = || PackageError::Resolution("Could not parse result of `yarn list --json`".into());
    let line = TREE_LINE.find(raw).ok_or_else(unparsable)?;
    let report: YarnReport = serde_json::from_str(line.as_str()).map_err(|e| {
        error!(error = ?e, "Malformed yarn tree report");
        unparsable()
    })?;
    if report.kind != "tree" {
        return Err(unparsable());
    }
    Ok(report.data.trees)
}

/// Forward-slash path of `path` relative to `base`, with `..` where needed.
pub fn relative_path(base: &Path, path: &Path) -> String {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = path.components().collect();
    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(base.len() - common)
        .collect();
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CommandOutput, MockCommandRunner};

    fn node(name: &str, children: Vec<YarnTreeNode>) -> YarnTreeNode {
        YarnTreeNode {
            name: name.to_string(),
            children,
        }
    }

    fn names(tree: &DependencyTree, indices: &[usize]) -> Vec<String> {
        indices.iter().map(|&i| tree.node(i).name.clone()).collect()
    }

    #[test]
    fn parses_plain_and_scoped_labels() {
        assert_eq!(parse_package_name("left-pad@1.3.0"), "left-pad");
        assert_eq!(parse_package_name("@types/node@^12.0.0"), "@types/node");
        assert_eq!(parse_package_name("lodash"), "lodash");
        assert_eq!(parse_package_name("weird@not a range!"), "weird");
    }

    #[test]
    fn pruning_drops_ranged_labels_and_their_subtrees() {
        let trees = vec![
            node("a@1.0.0", vec![node("b@^2.0.0", vec![node("c@1.0.0", vec![])])]),
            node("d@~1.0.0", vec![]),
        ];
        let tree = DependencyTree::from_yarn_trees(Path::new("/p/node_modules"), &trees, true);
        assert_eq!(names(&tree, tree.roots()), vec!["a"]);
        assert!(tree.node(tree.roots()[0]).children.is_empty());
    }

    #[test]
    fn nested_children_install_under_parent_node_modules() {
        let trees = vec![node("a@1.0.0", vec![node("b@2.0.0", vec![])])];
        let tree = DependencyTree::from_yarn_trees(Path::new("/p/node_modules"), &trees, false);
        let paths = tree.flatten(tree.roots());
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/p/node_modules/a"),
                PathBuf::from("/p/node_modules/a/node_modules/b"),
            ]
        );
    }

    #[test]
    fn reachability_terminates_on_cycles_and_visits_once() {
        let trees = vec![
            node("a@1.0.0", vec![node("b@1.0.0", vec![])]),
            node("b@1.0.0", vec![node("a@1.0.0", vec![])]),
            node("unused@1.0.0", vec![]),
        ];
        let tree = DependencyTree::from_yarn_trees(Path::new("/p/node_modules"), &trees, false);
        let reached = tree.select_reachable(&["a".to_string()]).unwrap();
        assert_eq!(names(&tree, &reached), vec!["a", "b"]);
    }

    #[test]
    fn reachability_handles_diamonds_in_first_visit_order() {
        let trees = vec![
            node("app@1.0.0", vec![node("x@1.0.0", vec![]), node("y@1.0.0", vec![])]),
            node("x@1.0.0", vec![node("shared@1.0.0", vec![])]),
            node("y@1.0.0", vec![node("shared@1.0.0", vec![])]),
            node("shared@1.0.0", vec![]),
        ];
        let tree = DependencyTree::from_yarn_trees(Path::new("/p/node_modules"), &trees, false);
        let reached = tree
            .select_reachable(&["app".to_string(), "shared".to_string()])
            .unwrap();
        assert_eq!(names(&tree, &reached), vec!["app", "x", "shared", "y"]);
    }

    #[test]
    fn duplicate_top_level_names_are_fatal() {
        let trees = vec![node("a@1.0.0", vec![]), node("a@2.0.0", vec![])];
        let tree = DependencyTree::from_yarn_trees(Path::new("/p/node_modules"), &trees, false);
        let err = tree.select_reachable(&["a".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Dependency seen more than once: a"));
    }

    #[test]
    fn unknown_entry_point_is_fatal() {
        let tree = DependencyTree::from_yarn_trees(Path::new("/p/node_modules"), &[], false);
        let err = tree.select_reachable(&["ghost".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Could not find dependency: ghost"));
    }

    #[test]
    fn yarn_listing_requires_a_tree_line() {
        assert!(parse_yarn_listing("{\"type\":\"info\",\"data\":\"x\"}").is_err());
        let raw = "{\"type\":\"info\",\"data\":\"x\"}\n{\"type\":\"tree\",\"data\":{\"type\":\"list\",\"trees\":[{\"name\":\"a@1.0.0\",\"children\":[]}]}}\n";
        let trees = parse_yarn_listing(raw).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].name, "a@1.0.0");
    }

    #[test]
    fn relative_paths_use_forward_slashes_and_parent_segments() {
        assert_eq!(relative_path(Path::new("/p"), Path::new("/p")), "");
        assert_eq!(relative_path(Path::new("/p"), Path::new("/p/node_modules/a")), "node_modules/a");
        assert_eq!(relative_path(Path::new("/p/q"), Path::new("/p/r")), "../r");
    }

    #[tokio::test]
    async fn npm_mode_dedupes_and_keeps_project_first() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, program, args| program == "npm" && args == &vec!["-v".to_string()])
            .returning(|_, _, _| {
                Ok(CommandOutput {
                    stdout: "10.2.0\n".into(),
                    stderr: String::new(),
                })
            });
        runner
            .expect_run()
            .withf(|_, program, args| program == "npm" && args.first().map(String::as_str) == Some("list"))
            .returning(|_, _, _| {
                Ok(CommandOutput {
                    stdout: "/p\n/p/node_modules/a\nnot-absolute\n/p/node_modules/a\r\n".into(),
                    stderr: String::new(),
                })
            });

        let roots = resolve_dependencies(&runner, Path::new("/p"), PackageManager::Npm, None)
            .await
            .unwrap();
        let prefixes: Vec<&str> = roots.iter().map(|r| r.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["", "node_modules/a"]);
    }

    #[tokio::test]
    async fn npm_3_7_is_rejected() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(CommandOutput {
                stdout: "3.7.2".into(),
                stderr: String::new(),
            })
        });
        let err = resolve_dependencies(&runner, Path::new("/p"), PackageManager::Npm, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::Resolution(_)));
    }

    #[tokio::test]
    async fn lister_failure_propagates_as_resolution_error() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| Err(PackageError::Command("npm not found".into())));
        let err = resolve_dependencies(&runner, Path::new("/p"), PackageManager::Npm, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::Resolution(msg) if msg.contains("npm not found")));
    }

    #[tokio::test]
    async fn yarn_without_lockfile_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::new();
        let roots = resolve_dependencies(&runner, dir.path(), PackageManager::Yarn, None)
            .await
            .unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].path, dir.path());
    }

    #[tokio::test]
    async fn yarn_entry_points_select_reachable_packages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, program, args| program == "yarn" && args.contains(&"--prod".to_string()))
            .returning(|_, _, _| {
                Ok(CommandOutput {
                    stdout: r#"{"type":"tree","data":{"trees":[{"name":"a@1.0.0","children":[{"name":"b@^1.0.0"}]},{"name":"b@1.0.0"},{"name":"dev@1.0.0"}]}}"#.into(),
                    stderr: String::new(),
                })
            });

        let entries = vec!["a".to_string()];
        let roots = resolve_dependencies(&runner, dir.path(), PackageManager::Yarn, Some(&entries))
            .await
            .unwrap();
        let prefixes: Vec<&str> = roots.iter().map(|r| r.prefix.as_str()).collect();
        assert_eq!(
            prefixes,
            vec!["", "node_modules/a", "node_modules/a/node_modules/b", "node_modules/b"]
        );
    }
}
