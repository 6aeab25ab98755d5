//! Client for the asynchronous image engine (describe + render + status).
//!
//! The engine works submit-then-poll: a submission returns either a direct
//! result or a `status_url` to poll until a terminal state. The trait hides
//! which of the two happened behind plain JSON values; the response schema
//! belongs to an external, evolving API and is kept as a dynamic tree.

pub mod client;
pub mod error;

use async_trait::async_trait;
use serde_json::Value;

pub use client::ImageServiceClient;
pub use error::ImageServiceError;

/// Statuses that end a poll loop.
pub const TERMINAL_STATUSES: &[&str] = &["COMPLETED", "ERROR", "FAILED", "UNKNOWN"];

/// True when `status` (case-insensitive) ends a poll loop.
pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(status))
}

/// Extracts the poll URL from a submission response, if the engine chose the
/// asynchronous path.
pub fn status_url(response: &Value) -> Option<&str> {
    response.get("status_url").and_then(Value::as_str)
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Submits a prompt (and optional base64 reference image) for structured
    /// description.
    async fn describe(
        &self,
        prompt: &str,
        image_b64: Option<&str>,
    ) -> Result<Value, ImageServiceError>;

    /// Submits a structured description for rendering.
    async fn render(
        &self,
        structured_description: &Value,
        seed: Option<i64>,
        aspect_ratio: &str,
    ) -> Result<Value, ImageServiceError>;

    /// Polls `status_url` until a terminal status or the configured timeout.
    async fn poll_until_terminal(&self, status_url: &str) -> Result<Value, ImageServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_statuses() {
        assert!(is_terminal_status("COMPLETED"));
        assert!(is_terminal_status("completed"));
        assert!(is_terminal_status("Error"));
        assert!(is_terminal_status("FAILED"));
        assert!(is_terminal_status("UNKNOWN"));
        assert!(!is_terminal_status("PENDING"));
        assert!(!is_terminal_status("IN_PROGRESS"));
        assert!(!is_terminal_status(""));
    }

    #[test]
    fn test_status_url_extraction() {
        let with = json!({"status_url": "https://engine.example/status/1"});
        assert_eq!(status_url(&with), Some("https://engine.example/status/1"));

        let without = json!({"result": {"seed": 7}});
        assert_eq!(status_url(&without), None);

        let non_string = json!({"status_url": 42});
        assert_eq!(status_url(&non_string), None);
    }
}
