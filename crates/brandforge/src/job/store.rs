//! In-process job registry.
//!
//! The store is the only shared mutable state in the crate. One lock guards
//! the whole map; it is held for the duration of the in-memory mutation
//! only, never across an external call, so status polling stays cheap while
//! pipelines are blocked on the network. Reads hand out independent clones.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::{Job, JobRequest, JobStage, PartialResult};

pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Applies `mutate` to the job under the write lock and refreshes its
    /// `updated_at`. Unknown ids are ignored (the job may never have existed
    /// or the caller raced a restart).
    fn with_job<F: FnOnce(&mut Job)>(&self, job_id: &str, mutate: F) {
        let mut jobs = self.write_lock();
        let Some(job) = jobs.get_mut(job_id) else {
            log::warn!("Ignoring update for unknown job '{}'", job_id);
            return;
        };
        mutate(job);
        job.updated_at = Utc::now();
    }

    /// Registers a new queued job and returns its id.
    pub fn create(&self, request: JobRequest) -> String {
        let job = Job::new(request);
        let job_id = job.job_id.clone();
        self.write_lock().insert(job_id.clone(), job);
        job_id
    }

    /// Returns an independent snapshot of the job, or `None` if unknown.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.read_lock().get(job_id).cloned()
    }

    /// Advances the stage. Transitions the state machine forbids (backward
    /// moves, leaving a terminal stage) are dropped.
    pub fn update_stage(&self, job_id: &str, stage: JobStage) {
        self.with_job(job_id, |job| {
            if job.stage.allows_transition_to(stage) {
                job.stage = stage;
            } else if job.stage != stage {
                log::warn!(
                    "Dropping stage transition {} -> {} for job '{}'",
                    job.stage,
                    stage,
                    job_id
                );
            }
        });
    }

    /// Raises the progress percentage. Progress is monotonic within a job;
    /// a lower value than the current one is dropped.
    pub fn set_progress(&self, job_id: &str, progress: u8) {
        self.with_job(job_id, |job| {
            job.progress = job.progress.max(progress.min(100));
        });
    }

    pub fn set_plan_id(&self, job_id: &str, plan_id: &str) {
        self.with_job(job_id, |job| {
            job.plan_id = Some(plan_id.to_string());
        });
    }

    /// Appends to the bounded event log.
    pub fn append_event(&self, job_id: &str, message: impl Into<String>) {
        self.with_job(job_id, |job| job.push_event(message));
    }

    /// Records a per-variation result. Indices outside `0..variations` and
    /// duplicates are dropped, keeping the partial-result invariant intact
    /// regardless of caller behavior.
    pub fn append_partial_result(&self, job_id: &str, index: usize, image_url: impl Into<String>) {
        self.with_job(job_id, |job| {
            if index >= job.variations {
                log::warn!(
                    "Dropping partial result with out-of-range index {} for job '{}'",
                    index,
                    job_id
                );
                return;
            }
            if job.partial_results.iter().any(|p| p.index == index) {
                log::warn!(
                    "Dropping duplicate partial result for index {} of job '{}'",
                    index,
                    job_id
                );
                return;
            }
            job.partial_results.push(PartialResult {
                index,
                image_url: image_url.into(),
            });
        });
    }

    /// Success terminal transition: stage `DONE`, progress 100, final
    /// results. Ignored if the job already reached a terminal stage; the
    /// result list is never mutated again afterwards.
    pub fn complete(&self, job_id: &str, results: Vec<String>) {
        self.with_job(job_id, |job| {
            if job.stage.is_terminal() {
                log::warn!("Ignoring completion of already-terminal job '{}'", job_id);
                return;
            }
            job.stage = JobStage::Done;
            job.progress = 100;
            job.results = results;
            job.push_event("Job completed successfully");
        });
    }

    /// Failure terminal transition: stage `ERROR`, progress 100, error and
    /// optional trace. Ignored if the job already reached a terminal stage.
    pub fn fail(&self, job_id: &str, error: impl Into<String>, trace: Option<String>) {
        self.with_job(job_id, |job| {
            if job.stage.is_terminal() {
                log::warn!("Ignoring failure of already-terminal job '{}'", job_id);
                return;
            }
            let error = error.into();
            job.stage = JobStage::Error;
            job.progress = 100;
            job.push_event(format!("Job failed: {}", error));
            job.error = Some(error);
            job.trace = trace;
        });
    }

    /// Counts of (running, done, failed) jobs.
    pub fn counts(&self) -> (usize, usize, usize) {
        let jobs = self.read_lock();
        let mut running = 0;
        let mut done = 0;
        let mut failed = 0;
        for job in jobs.values() {
            match job.stage {
                JobStage::Done => done += 1,
                JobStage::Error => failed += 1,
                _ => running += 1,
            }
        }
        (running, done, failed)
    }

    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_lock().is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MAX_EVENTS;

    fn new_job(store: &JobStore, variations: usize) -> String {
        store.create(JobRequest {
            prompt: "red sneaker on white background".to_string(),
            variations,
            aspect_ratio: "1:1".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_create_and_get() {
        let store = JobStore::new();
        let id = new_job(&store, 3);

        let job = store.get(&id).unwrap();
        assert_eq!(job.job_id, id);
        assert_eq!(job.stage, JobStage::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.variations, 3);
    }

    #[test]
    fn test_unknown_job_is_none() {
        let store = JobStore::new();
        assert!(store.get("job_missing").is_none());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let store = JobStore::new();
        let id = new_job(&store, 1);

        let mut snapshot = store.get(&id).unwrap();
        snapshot.progress = 99;
        snapshot.results.push("https://cdn.example/rogue.png".to_string());

        let fresh = store.get(&id).unwrap();
        assert_eq!(fresh.progress, 0);
        assert!(fresh.results.is_empty());
    }

    #[test]
    fn test_forward_stage_transitions_apply() {
        let store = JobStore::new();
        let id = new_job(&store, 1);

        store.update_stage(&id, JobStage::Started);
        store.update_stage(&id, JobStage::DescribeRequest);
        store.update_stage(&id, JobStage::PlanSaved);
        assert_eq!(store.get(&id).unwrap().stage, JobStage::PlanSaved);
    }

    #[test]
    fn test_backward_stage_transition_is_dropped() {
        let store = JobStore::new();
        let id = new_job(&store, 1);

        store.update_stage(&id, JobStage::PlanSaved);
        store.update_stage(&id, JobStage::DescribeRequest);
        assert_eq!(store.get(&id).unwrap().stage, JobStage::PlanSaved);
    }

    #[test]
    fn test_render_band_cycles_are_allowed() {
        let store = JobStore::new();
        let id = new_job(&store, 2);

        store.update_stage(&id, JobStage::RenderSubmit);
        store.update_stage(&id, JobStage::RenderPoll);
        store.update_stage(&id, JobStage::RenderDone);
        store.update_stage(&id, JobStage::RenderSubmit);
        assert_eq!(store.get(&id).unwrap().stage, JobStage::RenderSubmit);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let store = JobStore::new();
        let id = new_job(&store, 1);

        store.set_progress(&id, 40);
        store.set_progress(&id, 20);
        assert_eq!(store.get(&id).unwrap().progress, 40);

        store.set_progress(&id, 70);
        assert_eq!(store.get(&id).unwrap().progress, 70);
    }

    #[test]
    fn test_progress_capped_at_100() {
        let store = JobStore::new();
        let id = new_job(&store, 1);
        store.set_progress(&id, 250);
        assert_eq!(store.get(&id).unwrap().progress, 100);
    }

    #[test]
    fn test_event_log_cap_after_300_appends() {
        let store = JobStore::new();
        let id = new_job(&store, 1);

        for i in 0..300 {
            store.append_event(&id, format!("event {}", i));
        }

        let job = store.get(&id).unwrap();
        assert_eq!(job.events.len(), MAX_EVENTS);
        // The newest 250 remain, in original relative order.
        assert_eq!(job.events.front().unwrap().message, "event 50");
        assert_eq!(job.events.back().unwrap().message, "event 299");
        let messages: Vec<_> = job.events.iter().map(|e| e.message.clone()).collect();
        for (offset, message) in messages.iter().enumerate() {
            assert_eq!(message, &format!("event {}", 50 + offset));
        }
    }

    #[test]
    fn test_partial_results_reject_duplicates_and_out_of_range() {
        let store = JobStore::new();
        let id = new_job(&store, 3);

        store.append_partial_result(&id, 0, "https://cdn.example/0.png");
        store.append_partial_result(&id, 0, "https://cdn.example/0-dup.png");
        store.append_partial_result(&id, 2, "https://cdn.example/2.png");
        store.append_partial_result(&id, 3, "https://cdn.example/3.png");

        let job = store.get(&id).unwrap();
        assert_eq!(job.partial_results.len(), 2);
        assert_eq!(job.partial_results[0].index, 0);
        assert_eq!(job.partial_results[0].image_url, "https://cdn.example/0.png");
        assert_eq!(job.partial_results[1].index, 2);
    }

    #[test]
    fn test_complete_sets_terminal_state() {
        let store = JobStore::new();
        let id = new_job(&store, 2);

        store.complete(&id, vec!["https://cdn.example/0.png".to_string()]);

        let job = store.get(&id).unwrap();
        assert_eq!(job.stage, JobStage::Done);
        assert_eq!(job.progress, 100);
        assert_eq!(job.results.len(), 1);
        assert!(job.is_finished());
        assert_eq!(job.events.back().unwrap().message, "Job completed successfully");
    }

    #[test]
    fn test_results_are_not_mutated_after_completion() {
        let store = JobStore::new();
        let id = new_job(&store, 2);

        store.complete(&id, vec!["https://cdn.example/0.png".to_string()]);
        store.complete(&id, vec!["https://cdn.example/other.png".to_string()]);
        store.fail(&id, "late failure", None);

        let job = store.get(&id).unwrap();
        assert_eq!(job.stage, JobStage::Done);
        assert_eq!(job.results, vec!["https://cdn.example/0.png".to_string()]);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_sets_error_and_trace() {
        let store = JobStore::new();
        let id = new_job(&store, 2);

        store.update_stage(&id, JobStage::DescribeRequest);
        store.fail(&id, "describe call failed", Some("caused by: timeout".to_string()));

        let job = store.get(&id).unwrap();
        assert_eq!(job.stage, JobStage::Error);
        assert_eq!(job.progress, 100);
        assert_eq!(job.error.as_deref(), Some("describe call failed"));
        assert_eq!(job.trace.as_deref(), Some("caused by: timeout"));
        assert!(job
            .events
            .back()
            .unwrap()
            .message
            .contains("describe call failed"));
    }

    #[test]
    fn test_updates_to_unknown_jobs_are_ignored() {
        let store = JobStore::new();
        store.update_stage("job_missing", JobStage::Started);
        store.append_event("job_missing", "hello");
        store.complete("job_missing", vec![]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_counts() {
        let store = JobStore::new();
        let running = new_job(&store, 1);
        let done = new_job(&store, 1);
        let failed = new_job(&store, 1);

        store.update_stage(&running, JobStage::RenderPoll);
        store.complete(&done, vec!["https://cdn.example/a.png".to_string()]);
        store.fail(&failed, "boom", None);

        assert_eq!(store.counts(), (1, 1, 1));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_concurrent_appends_respect_the_cap() {
        use std::sync::Arc;

        let store = Arc::new(JobStore::new());
        let id = new_job(&store, 1);

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.append_event(&id, format!("worker {} event {}", worker, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let job = store.get(&id).unwrap();
        assert_eq!(job.events.len(), MAX_EVENTS);
    }
}
