use std::time::Duration;

use thiserror::Error;

/// Failure modes of the image engine client.
///
/// `Connection` is kept distinct from `Service` so callers can tell a
/// network-level failure (refused, DNS, reset) from an explicit non-success
/// response and decide whether a retry makes sense.
#[derive(Debug, Error)]
pub enum ImageServiceError {
    #[error("Image service connection failed: {source}")]
    Connection {
        #[source]
        source: reqwest::Error,
    },

    #[error("Image service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Timed out after {}s waiting for image service status", timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("Failed to parse image service response: {0}")]
    Parse(String),

    #[error("Failed to construct HTTP client: {0}")]
    ClientBuild(String),
}
