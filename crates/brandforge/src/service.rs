//! Upward-facing facade for the request-handling layer.
//!
//! Three operations: create a job, kick off its pipeline fire-and-forget,
//! and poll a snapshot. Ownership checks on the echoed `owner_id` are the
//! caller's responsibility.

use std::sync::Arc;

use crate::config::Config;
use crate::error::ConfigError;
use crate::job::{Job, JobRequest, JobStore, JobStoreError};
use crate::pipeline::Orchestrator;

#[derive(Clone)]
pub struct GenerationService {
    store: Arc<JobStore>,
    orchestrator: Arc<Orchestrator>,
}

impl GenerationService {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            Arc::new(JobStore::new()),
            Arc::new(Orchestrator::from_config(config)?),
        ))
    }

    pub fn new(store: Arc<JobStore>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    pub fn store(&self) -> Arc<JobStore> {
        Arc::clone(&self.store)
    }

    /// Registers a new job and returns its id. The job stays `QUEUED` until
    /// `run_pipeline` is invoked for it.
    pub fn create_job(&self, request: JobRequest) -> String {
        self.store.create(request)
    }

    /// Starts the pipeline for `job_id` on a dedicated background task.
    /// The returned handle may be dropped; the job record carries the
    /// outcome either way.
    pub fn run_pipeline(&self, job_id: &str) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let store = Arc::clone(&self.store);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            orchestrator.run_pipeline(&job_id, &store).await;
        })
    }

    /// Snapshot of the job, or NotFound. Always well-formed: failures show
    /// up as `stage = ERROR` plus the `error` field, never as an Err here.
    pub fn get_status(&self, job_id: &str) -> Result<Job, JobStoreError> {
        self.store
            .get(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))
    }
}
