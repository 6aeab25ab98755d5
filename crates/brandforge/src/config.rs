//! Environment-resolved configuration for the generation pipeline.
//!
//! Every knob has a deployable default; only the image-engine credential is
//! truly required, and its absence is surfaced as a [`ConfigError`] when a
//! job starts rather than at load time, so status polling keeps working
//! against a misconfigured process.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Default base URL of the image engine (describe + render + status).
pub const DEFAULT_IMAGE_SERVICE_URL: &str = "https://engine.prod.bria-api.com/v2";

/// Default base URL of the OpenAI-compatible chat endpoint used by the planner.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model name.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default per-call timeout covering submission and the whole poll loop.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default character budget for the assembled brand context.
pub const DEFAULT_CONTEXT_BUDGET: usize = 4000;

/// Default number of render calls in flight per job.
pub const DEFAULT_RENDER_CONCURRENCY: usize = 2;

#[derive(Debug)]
pub struct Config {
    /// Base URL of the image engine.
    pub image_service_url: String,
    /// API token for the image engine. Required to run a pipeline.
    pub image_api_token: Option<SecretString>,
    /// Base URL of the chat endpoint used for variation planning.
    pub llm_base_url: String,
    /// API key for the chat endpoint. Absence routes the planner to its
    /// deterministic fallback instead of failing jobs.
    pub llm_api_key: Option<SecretString>,
    /// Chat model name.
    pub llm_model: String,
    /// Timeout applied to each external call, including poll loops.
    pub request_timeout: Duration,
    /// Sleep between status polls.
    pub poll_interval: Duration,
    /// Static brand knowledge file. Absence is tolerated.
    pub knowledge_path: PathBuf,
    /// Directory for best-effort plan snapshots. `None` disables snapshots.
    pub data_dir: Option<PathBuf>,
    /// Bound on concurrent render calls within one job.
    pub render_concurrency: usize,
    /// Character budget for the assembled brand context.
    pub context_budget: usize,
}

impl Config {
    /// Builds a configuration from `BRANDFORGE_*` environment variables,
    /// falling back to the documented defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            image_service_url: env_string("BRANDFORGE_IMAGE_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_IMAGE_SERVICE_URL.to_string()),
            image_api_token: env_secret("BRANDFORGE_IMAGE_API_TOKEN"),
            llm_base_url: env_string("BRANDFORGE_LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_api_key: env_secret("BRANDFORGE_LLM_API_KEY"),
            llm_model: env_string("BRANDFORGE_LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            request_timeout: Duration::from_secs(env_parsed(
                "BRANDFORGE_REQUEST_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            poll_interval: Duration::from_secs(env_parsed(
                "BRANDFORGE_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            knowledge_path: env_string("BRANDFORGE_KNOWLEDGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/knowledge.txt")),
            data_dir: Some(
                env_string("BRANDFORGE_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("data/plans")),
            ),
            render_concurrency: env_parsed(
                "BRANDFORGE_RENDER_CONCURRENCY",
                DEFAULT_RENDER_CONCURRENCY,
            )?,
            context_budget: DEFAULT_CONTEXT_BUDGET,
        })
    }

    /// Returns the image-engine token or the error that aborts a job start.
    pub fn require_image_token(&self) -> Result<SecretString, ConfigError> {
        self.image_api_token
            .as_ref()
            .map(|token| SecretString::from(token.expose_secret().to_string()))
            .ok_or(ConfigError::MissingCredential("BRANDFORGE_IMAGE_API_TOKEN"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_service_url: DEFAULT_IMAGE_SERVICE_URL.to_string(),
            image_api_token: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_api_key: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            knowledge_path: PathBuf::from("data/knowledge.txt"),
            data_dir: Some(PathBuf::from("data/plans")),
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
            context_budget: DEFAULT_CONTEXT_BUDGET,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secret(name: &str) -> Option<SecretString> {
    env_string(name).map(SecretString::from)
}

fn env_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            name,
            reason: format!("{}", e),
        }),
        None => Ok(default),
    }
}
