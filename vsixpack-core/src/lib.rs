#![doc = "vsixpack-core: the packaging pipeline behind the vsixpack CLI."]

//! Turns an extension project directory into a `.vsix` archive.
//!
//! The pipeline runs in this order:
//! [`dependencies`] (which installed packages ship) → [`collect`] (every
//! file under those roots) → [`ignore`] (`.vscodeignore` filtering) →
//! [`pipeline`] with the [`processors`] chain → [`assemble`] (descriptor
//! rendering) → [`archive`] (zip output). [`package`] wires them together.

pub mod archive;
pub mod assemble;
pub mod collect;
pub mod command;
pub mod config;
pub mod contract;
pub mod dependencies;
pub mod error;
pub mod ignore;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod processors;
pub mod prompt;
pub mod render;
pub mod validation;

pub use config::PackageOptions;
pub use error::{PackageError, Result};
pub use package::{list_files, ls, pack, Collaborators, PackageResult};
