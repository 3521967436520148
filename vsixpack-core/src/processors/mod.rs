//! # processors: the fixed chain of content processors
//!
//! Each processor sees every included file (through [`Processor::on_file`])
//! and is finalized once after all files are done (through
//! [`Processor::on_end`]). They run in the order returned by
//! [`create_default_processors`]; manifest fragments merge in that order
//! with later processors winning on key collisions.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::PackageOptions;
use crate::contract::{Processor, Prompt};
use crate::manifest::Manifest;

pub mod icon;
pub mod license;
pub mod localization;
pub mod manifest;
pub mod markdown;
pub mod tags;
pub mod validation;

pub use icon::IconProcessor;
pub use license::LicenseProcessor;
pub use localization::LocalizationProcessor;
pub use manifest::ManifestProcessor;
pub use markdown::MarkdownProcessor;
pub use tags::TagsProcessor;
pub use validation::ValidationProcessor;

/// Locks processor state; a poisoned lock still holds usable accumulation data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn create_default_processors(
    manifest: &Manifest,
    options: &PackageOptions,
    prompt: Arc<dyn Prompt>,
) -> Vec<Box<dyn Processor>> {
    vec![
        Box::new(ManifestProcessor::new(manifest, prompt)),
        Box::new(TagsProcessor::new(manifest)),
        Box::new(MarkdownProcessor::readme(manifest, options)),
        Box::new(MarkdownProcessor::changelog(manifest, options)),
        Box::new(LicenseProcessor::new(manifest)),
        Box::new(IconProcessor::new(manifest)),
        Box::new(LocalizationProcessor::new(manifest)),
        Box::new(ValidationProcessor::new()),
    ]
}
