use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::{is_terminal_status, ImageService, ImageServiceError};

/// Connect timeout for every request to the engine.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeout. Submissions are quick (`sync: false`); the long wait
/// happens in the poll loop, which carries its own deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reqwest-backed client for the image engine.
///
/// One instance holds one connection pool and is safe to share across jobs;
/// `reqwest::Client` is internally reference-counted and designed for
/// concurrent use.
pub struct ImageServiceClient {
    http: Client,
    base_url: String,
    api_token: SecretString,
    timeout: Duration,
    poll_interval: Duration,
}

impl ImageServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: SecretString,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ImageServiceError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ImageServiceError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_token,
            timeout,
            poll_interval,
        })
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, ImageServiceError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .header("api_token", self.api_token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| ImageServiceError::Connection { source: e })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            error!("Image service error ({}): {}", status, body);
            return Err(ImageServiceError::Service {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ImageServiceError::Parse(e.to_string()))
    }

    async fn get_json(&self, url: &str) -> Result<Value, ImageServiceError> {
        let response = self
            .http
            .get(url)
            .header("api_token", self.api_token.expose_secret())
            .send()
            .await
            .map_err(|e| ImageServiceError::Connection { source: e })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Image service status error ({}): {}", status, body);
            return Err(ImageServiceError::Service {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ImageServiceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ImageService for ImageServiceClient {
    async fn describe(
        &self,
        prompt: &str,
        image_b64: Option<&str>,
    ) -> Result<Value, ImageServiceError> {
        let mut payload = json!({
            "prompt": prompt,
            "sync": false,
        });
        if let Some(image) = image_b64 {
            payload["images"] = json!([image]);
        }
        self.post_json("structured_prompt/generate", &payload).await
    }

    async fn render(
        &self,
        structured_description: &Value,
        seed: Option<i64>,
        aspect_ratio: &str,
    ) -> Result<Value, ImageServiceError> {
        // The engine takes the description string-encoded.
        let description = serde_json::to_string(structured_description)
            .map_err(|e| ImageServiceError::Parse(e.to_string()))?;

        let mut payload = json!({
            "structured_description": description,
            "aspect_ratio": aspect_ratio,
            "sync": false,
            "num_results": 1,
        });
        if let Some(seed) = seed {
            payload["seed"] = json!(seed);
        }
        self.post_json("image/generate", &payload).await
    }

    async fn poll_until_terminal(&self, status_url: &str) -> Result<Value, ImageServiceError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if Instant::now() > deadline {
                return Err(ImageServiceError::Timeout {
                    timeout: self.timeout,
                });
            }

            let data = self.get_json(status_url).await?;
            let status = data
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_ascii_uppercase();

            if is_terminal_status(&status) {
                return Ok(data);
            }

            debug!("Status '{}' at {}, polling again", status, status_url);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_client(base_url: &str, timeout_ms: u64, poll_ms: u64) -> ImageServiceClient {
        ImageServiceClient::new(
            base_url,
            SecretString::from("test-token".to_string()),
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_ms),
        )
        .expect("client builds")
    }

    /// Spawns a one-response-per-connection HTTP fixture returning `body`
    /// with the given status line.
    async fn spawn_fixture(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_poll_times_out_on_endless_pending() {
        let base = spawn_fixture("200 OK", r#"{"status":"PENDING"}"#).await;
        let client = test_client(&base, 300, 50);

        let started = Instant::now();
        let err = client
            .poll_until_terminal(&format!("{}/status/abc", base))
            .await
            .unwrap_err();

        assert!(matches!(err, ImageServiceError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_poll_returns_terminal_payload() {
        let base = spawn_fixture(
            "200 OK",
            r#"{"status":"COMPLETED","result":{"image_url":"https://cdn.example/img.png"}}"#,
        )
        .await;
        let client = test_client(&base, 1000, 50);

        let data = client
            .poll_until_terminal(&format!("{}/status/abc", base))
            .await
            .unwrap();
        assert_eq!(data["status"], "COMPLETED");
        assert_eq!(data["result"]["image_url"], "https://cdn.example/img.png");
    }

    #[tokio::test]
    async fn test_submit_non_success_is_a_service_error() {
        let base = spawn_fixture("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let client = test_client(&base, 1000, 50);

        let err = client.describe("a red sneaker", None).await.unwrap_err();
        match err {
            ImageServiceError::Service { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("expected Service error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_accepted_is_success() {
        let base = spawn_fixture("202 Accepted", r#"{"status_url":"https://e/status/1"}"#).await;
        let client = test_client(&base, 1000, 50);

        let data = client.describe("a red sneaker", Some("aGVsbG8=")).await.unwrap();
        assert_eq!(data["status_url"], "https://e/status/1");
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_connection_error() {
        // Bind then drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = test_client(&format!("http://{}", addr), 500, 50);
        let err = client.describe("a red sneaker", None).await.unwrap_err();
        assert!(matches!(err, ImageServiceError::Connection { .. }));
    }
}
