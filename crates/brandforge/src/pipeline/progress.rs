//! Progress hooks invoked synchronously by the orchestrator.
//!
//! The orchestrator itself knows nothing about jobs; it reports named events
//! and `JobProgress` translates them into store mutations, including the
//! progress band mapping (planning 0–40%, execution 40–100% linear in
//! completed variations).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::job::{JobStage, JobStore};

/// End of the planning band in the progress percentage.
const PLANNING_BAND: u8 = 40;

/// Events emitted by the pipeline while it runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    DescribeRequested,
    DescribePolling {
        status_url: String,
    },
    ContextLoading,
    PatchProposing {
        model: String,
    },
    PlanSaved {
        plan_id: String,
    },
    /// `position` is 1-based for human-readable messages; `index` is the
    /// stable variation index results are keyed by.
    RenderSubmitted {
        index: usize,
        position: usize,
        total: usize,
    },
    RenderPolling {
        index: usize,
    },
    RenderCompleted {
        index: usize,
        position: usize,
        total: usize,
        image_url: String,
    },
    RenderFailed {
        index: usize,
        position: usize,
        total: usize,
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events into the job store.
pub struct JobProgress {
    store: Arc<JobStore>,
    job_id: String,
    total: usize,
    completed: AtomicUsize,
}

impl JobProgress {
    pub fn new(store: Arc<JobStore>, job_id: impl Into<String>, total: usize) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            total: total.max(1),
            completed: AtomicUsize::new(0),
        }
    }

    /// Progress after `completed` variations reached a terminal state,
    /// mapped linearly across the execution band.
    fn execution_progress(&self, completed: usize) -> u8 {
        let band = (100 - PLANNING_BAND) as usize;
        PLANNING_BAND + (band * completed.min(self.total) / self.total) as u8
    }

    fn variation_done(&self) -> u8 {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.execution_progress(completed)
    }
}

impl ProgressReporter for JobProgress {
    fn report(&self, event: ProgressEvent) {
        let id = &self.job_id;
        match event {
            ProgressEvent::DescribeRequested => {
                self.store.update_stage(id, JobStage::DescribeRequest);
                self.store.set_progress(id, 10);
                self.store
                    .append_event(id, "Requesting image analysis from the generation engine...");
            }
            ProgressEvent::DescribePolling { .. } => {
                self.store.update_stage(id, JobStage::DescribePoll);
                self.store
                    .append_event(id, "Waiting for image analysis to finish...");
            }
            ProgressEvent::ContextLoading => {
                self.store.update_stage(id, JobStage::ContextLoad);
                self.store.set_progress(id, 20);
                self.store
                    .append_event(id, "Loading brand guidelines and context...");
            }
            ProgressEvent::PatchProposing { model } => {
                self.store.update_stage(id, JobStage::PatchPropose);
                self.store.set_progress(id, 30);
                self.store
                    .append_event(id, format!("Designing variations with {}...", model));
            }
            ProgressEvent::PlanSaved { plan_id } => {
                self.store.update_stage(id, JobStage::PlanSaved);
                self.store.set_progress(id, PLANNING_BAND);
                self.store.set_plan_id(id, &plan_id);
                self.store.append_event(id, "Generation plan created.");
            }
            ProgressEvent::RenderSubmitted {
                position, total, ..
            } => {
                self.store.update_stage(id, JobStage::RenderSubmit);
                self.store
                    .append_event(id, format!("Generating variation {}/{}...", position, total));
            }
            // No event here; polling would flood the log.
            ProgressEvent::RenderPolling { .. } => {
                self.store.update_stage(id, JobStage::RenderPoll);
            }
            ProgressEvent::RenderCompleted {
                index,
                position,
                image_url,
                ..
            } => {
                self.store.update_stage(id, JobStage::RenderDone);
                self.store.append_partial_result(id, index, image_url);
                let progress = self.variation_done();
                self.store.set_progress(id, progress);
                self.store
                    .append_event(id, format!("Variation {} ready", position));
            }
            ProgressEvent::RenderFailed {
                position, error, ..
            } => {
                let progress = self.variation_done();
                self.store.set_progress(id, progress);
                self.store
                    .append_event(id, format!("Variation {} failed: {}", position, error));
            }
        }
    }
}
