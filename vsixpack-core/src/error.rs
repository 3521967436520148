//! Error taxonomy for the packaging pipeline.
//!
//! Every stage maps its failures onto one [`PackageError`] variant so the
//! caller receives a single rejected operation with a readable message.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackageError>;

#[derive(Debug, Error)]
pub enum PackageError {
    /// External dependency listing failed, or its output could not be interpreted.
    #[error("dependency resolution failed: {0}")]
    Resolution(String),

    /// An external command could not be launched or exited unsuccessfully.
    #[error("command failed: {0}")]
    Command(String),

    /// Ignore rules could not be loaded or compiled.
    #[error("ignore rules: {0}")]
    Filter(String),

    /// A content processor rejected a file or the accumulated state.
    #[error("{0}")]
    Processor(String),

    /// Manifest rendering or archive writing failed.
    #[error("assembly failed: {0}")]
    Assembly(String),

    /// The project manifest is missing, malformed or invalid.
    #[error("{0}")]
    Manifest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PackageError {
    pub fn processor(msg: impl Into<String>) -> Self {
        PackageError::Processor(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        PackageError::Manifest(msg.into())
    }
}
