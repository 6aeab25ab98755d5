//! Minimal client for an OpenAI-compatible chat completion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat service connection failed: {source}")]
    Connection {
        #[source]
        source: reqwest::Error,
    },

    #[error("Chat service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Chat response carried no content")]
    MissingContent,

    #[error("Failed to parse chat response: {0}")]
    Parse(String),

    #[error("Failed to construct HTTP client: {0}")]
    ClientBuild(String),
}

/// One chat turn: system framing plus a user message, sampled content back.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, ChatError>;

    fn model_name(&self) -> &str;
}

pub struct ChatClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChatError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": temperature,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChatError::Connection { source: e })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Chat service error ({}): {}", status, body);
            return Err(ChatError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ChatError::Parse(e.to_string()))?;

        data.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ChatError::MissingContent)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
