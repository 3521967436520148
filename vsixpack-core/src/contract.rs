//! # contract: data types and collaborator traits shared by every pipeline stage
//!
//! This module holds the plain data flowing through the packaging run
//! ([`ResolvedRoot`], [`CandidateFile`], [`FileEntry`], [`Asset`]) and the
//! trait seams behind which the external world sits:
//!
//! - [`CommandRunner`]: invocation of package-manager processes
//! - [`Processor`]: one stateful content-processing stage
//! - [`ArchiveWriter`]: serialization of the final entry list
//! - [`Prompt`]: yes/no confirmation from the user
//!
//! Every trait is annotated for `mockall` so tests can script collaborators
//! deterministically.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;

use crate::error::{PackageError, Result};

/// Fixed namespace segment every packaged file lives under.
pub const ARCHIVE_ROOT: &str = "extension";

/// Key/value contribution of one processor to the manifest descriptor.
pub type ManifestFragment = serde_json::Map<String, serde_json::Value>;

/// A directory whose files are candidates for inclusion: the project itself
/// or one installed production dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    pub path: PathBuf,
    /// Forward-slash path of `path` relative to the project root; empty for the project.
    pub prefix: String,
}

/// A file found by the collector, before ignore filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Forward-slash path relative to the project root.
    pub relative_path: String,
    pub source: PathBuf,
}

impl CandidateFile {
    pub fn archive_path(&self) -> String {
        format!("{ARCHIVE_ROOT}/{}", self.relative_path)
    }
}

/// Content of a packaged file: either already materialized, or read from
/// disk when it is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Buffer(Vec<u8>),
    Source(PathBuf),
}

/// One entry of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub content: FileContent,
}

impl FileEntry {
    pub fn from_candidate(candidate: CandidateFile) -> Self {
        FileEntry {
            path: candidate.archive_path(),
            content: FileContent::Source(candidate.source),
        }
    }

    pub fn from_bytes(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        FileEntry {
            path: path.into(),
            content: FileContent::Buffer(bytes.into()),
        }
    }

    /// Archive path with backslashes normalized to forward slashes.
    pub fn normalized_path(&self) -> String {
        self.path.replace('\\', "/")
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        match &self.content {
            FileContent::Buffer(bytes) => Ok(bytes.clone()),
            FileContent::Source(source) => tokio::fs::read(source).await.map_err(|e| {
                tracing::error!(error = ?e, path = %source.display(), "Failed to read file content");
                PackageError::Io(e)
            }),
        }
    }

    pub async fn read_text(&self) -> Result<String> {
        let bytes = self.read_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// A typed pointer from the manifest descriptor into the archive.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Asset {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub path: String,
}

/// Captured output of a finished external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs package-manager commands. A non-zero exit status is reported as an error.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cwd: &Path, program: &str, args: Vec<String>) -> Result<CommandOutput>;
}

/// A stateful stage of the content pipeline.
///
/// `on_file` may be called concurrently for different files; implementations
/// guard their own accumulation state. `on_end` is called once, after every
/// file has passed through every processor.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_file(&self, file: FileEntry) -> Result<FileEntry> {
        Ok(file)
    }

    async fn on_end(&self) -> Result<()> {
        Ok(())
    }

    fn assets(&self) -> Vec<Asset>;

    fn manifest(&self) -> ManifestFragment;
}

/// Produces the binary archive at `target`, replacing any existing file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArchiveWriter: Send + Sync {
    async fn write(&self, entries: &[FileEntry], target: &Path) -> Result<()>;
}

/// Asks the user a yes/no question.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &str) -> Result<bool>;
}
