//! Job records for the generation pipeline.

pub mod store;

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::JobStore;

/// Upper bound on the per-job event log; oldest entries are dropped first.
pub const MAX_EVENTS: usize = 250;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Job '{0}' not found")]
    NotFound(String),
}

/// Position in the forward-only pipeline state machine.
///
/// The render triple repeats once per variation, so its three stages share
/// one rank: moving between them is a forward move. `Error` is reachable
/// from any non-terminal stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Queued,
    Started,
    DescribeRequest,
    DescribePoll,
    ContextLoad,
    PatchPropose,
    PlanSaved,
    RenderSubmit,
    RenderPoll,
    RenderDone,
    Done,
    Error,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStage::Queued => 0,
            JobStage::Started => 1,
            JobStage::DescribeRequest => 2,
            JobStage::DescribePoll => 3,
            JobStage::ContextLoad => 4,
            JobStage::PatchPropose => 5,
            JobStage::PlanSaved => 6,
            JobStage::RenderSubmit | JobStage::RenderPoll | JobStage::RenderDone => 7,
            JobStage::Done => 8,
            JobStage::Error => 9,
        }
    }

    /// True when moving from `self` to `next` follows the state machine.
    pub fn allows_transition_to(&self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStage::Error {
            return true;
        }
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Queued => write!(f, "Queued"),
            JobStage::Started => write!(f, "Started"),
            JobStage::DescribeRequest => write!(f, "Requesting description"),
            JobStage::DescribePoll => write!(f, "Waiting for description"),
            JobStage::ContextLoad => write!(f, "Loading context"),
            JobStage::PatchPropose => write!(f, "Proposing variations"),
            JobStage::PlanSaved => write!(f, "Plan saved"),
            JobStage::RenderSubmit => write!(f, "Submitting render"),
            JobStage::RenderPoll => write!(f, "Waiting for render"),
            JobStage::RenderDone => write!(f, "Render finished"),
            JobStage::Done => write!(f, "Done"),
            JobStage::Error => write!(f, "Error"),
        }
    }
}

/// One entry of the bounded audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A per-variation output surfaced before the whole batch finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    pub index: usize,
    pub image_url: String,
}

/// Inputs for a new generation job.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub prompt: String,
    pub brand_guidelines: String,
    pub variations: usize,
    pub aspect_ratio: String,
    pub image_path: Option<PathBuf>,
    pub owner_id: Option<String>,
}

/// One generation request tracked for the process lifetime.
///
/// Reads from the store hand out clones of this record, never references
/// into it; the input echo fields are immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub prompt: String,
    pub variations: usize,
    pub aspect_ratio: String,
    pub brand_guidelines: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub stage: JobStage,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub events: VecDeque<JobEvent>,
    pub results: Vec<String>,
    pub partial_results: Vec<PartialResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
}

impl Job {
    /// Creates a queued job from a request. The variation count is clamped
    /// to at least 1 and the aspect ratio defaults to "1:1".
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        let job_id = format!("job_{}", &uuid::Uuid::new_v4().simple().to_string()[..10]);
        let aspect_ratio = if request.aspect_ratio.trim().is_empty() {
            "1:1".to_string()
        } else {
            request.aspect_ratio
        };

        Self {
            job_id,
            prompt: request.prompt,
            variations: request.variations.max(1),
            aspect_ratio,
            brand_guidelines: request.brand_guidelines,
            image_path: request.image_path,
            owner_id: request.owner_id,
            stage: JobStage::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            events: VecDeque::new(),
            results: Vec::new(),
            partial_results: Vec::new(),
            error: None,
            trace: None,
            plan_id: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    pub(crate) fn push_event(&mut self, message: impl Into<String>) {
        self.events.push_back(JobEvent {
            timestamp: Utc::now(),
            message: message.into(),
        });
        while self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
    }
}
