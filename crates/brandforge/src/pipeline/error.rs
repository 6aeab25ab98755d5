use std::path::PathBuf;

use thiserror::Error;

use crate::image_service::ImageServiceError;

/// Failures that abort a pipeline phase.
///
/// Planning-phase errors abort the whole job; render-phase errors are caught
/// at the variation boundary by the orchestrator and never escape the batch.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Image service call failed: {0}")]
    Service(#[from] ImageServiceError),

    #[error("Could not read reference image '{path}': {source}")]
    ReferenceImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Describe result carried no structured description")]
    MissingDescription,

    #[error("Malformed structured description: {0}")]
    MalformedDescription(String),

    #[error("Render result carried no image URL (status '{status}')")]
    MissingImageUrl { status: String },
}

/// Renders an error and its source chain, one cause per line. Stored in the
/// job's `trace` field on failure.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
