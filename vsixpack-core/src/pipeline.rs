//! # pipeline: scatter-gather execution of the processor chain
//!
//! Every file is threaded through every processor's `on_file` in declared
//! order. Files are processed concurrently; results are gathered in input
//! order. Only when all files are done does each processor's `on_end` run,
//! one after another in declared order. The first failure aborts the run.

use futures::future::try_join_all;
use tracing::{debug, error, info};

use crate::contract::{FileEntry, Processor};
use crate::error::Result;

async fn process_file(processors: &[Box<dyn Processor>], mut file: FileEntry) -> Result<FileEntry> {
    for processor in processors {
        let path = file.path.clone();
        file = processor.on_file(file).await.map_err(|e| {
            error!(processor = processor.name(), path = %path, error = %e, "Processor rejected file");
            e
        })?;
    }
    Ok(file)
}

/// Runs `files` through `processors`, returning the processed entries in input order.
pub async fn run_processors(
    processors: &[Box<dyn Processor>],
    files: Vec<FileEntry>,
) -> Result<Vec<FileEntry>> {
    info!(files = files.len(), processors = processors.len(), "Processing files");

    let processed = try_join_all(files.into_iter().map(|file| process_file(processors, file))).await?;

    for processor in processors {
        debug!(processor = processor.name(), "Finalizing processor");
        processor.on_end().await.map_err(|e| {
            error!(processor = processor.name(), error = %e, "Processor failed to finalize");
            e
        })?;
    }

    info!(files = processed.len(), "Processing complete");
    Ok(processed)
}
