use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use futures_util::stream::{self, StreamExt};
use log::{error, warn};
use serde_json::Value;
use tracing::{info_span, Instrument};

use crate::config::Config;
use crate::context::ContextProvider;
use crate::error::ConfigError;
use crate::image_service::{status_url, ImageService, ImageServiceClient};
use crate::job::{JobStage, JobStore};
use crate::planner::{deep_merge, VariationPlanner};

use super::error::{error_chain, PipelineError};
use super::plan::{Plan, PlanItem};
use super::progress::{JobProgress, ProgressEvent, ProgressReporter};

/// Spread between neighboring variation seeds, for extra diversity when the
/// describe call returns a base seed.
const SEED_STRIDE: i64 = 123;

/// Drives the full pipeline for one job: plan (describe → context → patches)
/// then execute (N independent renders).
///
/// The orchestrator exclusively owns the `Plan` for the duration of a run and
/// only touches job state through progress events and the store's terminal
/// operations.
pub struct Orchestrator {
    image_service: Arc<dyn ImageService>,
    planner: VariationPlanner,
    context: ContextProvider,
    data_dir: Option<PathBuf>,
    render_concurrency: usize,
}

impl Orchestrator {
    /// Production constructor — builds all sub-components from config.
    /// Fails when the image-engine credential is missing.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let token = config.require_image_token()?;
        let client = ImageServiceClient::new(
            config.image_service_url.clone(),
            token,
            config.request_timeout,
            config.poll_interval,
        )
        .map_err(|e| ConfigError::InvalidValue {
            name: "image service client",
            reason: e.to_string(),
        })?;

        Ok(Self::new(
            Arc::new(client),
            VariationPlanner::from_config(config),
            ContextProvider::new(config.knowledge_path.clone(), config.context_budget),
            config.data_dir.clone(),
            config.render_concurrency,
        ))
    }

    /// Constructor with injected components, the seam used by tests and by
    /// embedders wiring their own service implementations.
    pub fn new(
        image_service: Arc<dyn ImageService>,
        planner: VariationPlanner,
        context: ContextProvider,
        data_dir: Option<PathBuf>,
        render_concurrency: usize,
    ) -> Self {
        Self {
            image_service,
            planner,
            context,
            data_dir,
            render_concurrency: render_concurrency.max(1),
        }
    }

    /// Phase 1: one describe call, one context load, one planner call, N
    /// patch merges. Any error here aborts the job; no partial plan is
    /// usable.
    pub async fn generate_plan(
        &self,
        prompt: &str,
        image_b64: Option<&str>,
        brand_guidelines: &str,
        variations: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<Plan, PipelineError> {
        progress.report(ProgressEvent::DescribeRequested);
        let submitted = self
            .image_service
            .describe(prompt, image_b64)
            .instrument(info_span!("describe_submit"))
            .await?;
        let terminal = match status_url(&submitted) {
            Some(url) => {
                let url = url.to_string();
                progress.report(ProgressEvent::DescribePolling {
                    status_url: url.clone(),
                });
                self.image_service
                    .poll_until_terminal(&url)
                    .instrument(info_span!("describe_poll"))
                    .await?
            }
            None => submitted,
        };
        let (base, base_seed) = decode_description(&terminal)?;

        progress.report(ProgressEvent::ContextLoading);
        let brand_context = self.context.load_context(brand_guidelines);

        progress.report(ProgressEvent::PatchProposing {
            model: self.planner.model_name().to_string(),
        });
        let patches = self
            .planner
            .propose_patches(prompt, &base, &brand_context, variations)
            .instrument(info_span!("propose_patches"))
            .await;

        let items = patches
            .iter()
            .enumerate()
            .map(|(index, patch)| {
                let mut description = base.clone();
                deep_merge(&mut description, patch);
                PlanItem {
                    index,
                    seed: base_seed.map(|s| s + index as i64 * SEED_STRIDE),
                    structured_description: description,
                }
            })
            .collect();

        let plan = Plan::new(prompt, base_seed, items);
        if let Some(dir) = &self.data_dir {
            if let Err(e) = plan.write_snapshot(dir) {
                warn!("Could not write snapshot for {}: {}", plan.plan_id, e);
            }
        }

        progress.report(ProgressEvent::PlanSaved {
            plan_id: plan.plan_id.clone(),
        });
        Ok(plan)
    }

    /// Phase 2: renders every plan item on a small bounded pool. A failed
    /// variation is reported and skipped; the batch keeps going. Returned
    /// pairs are sorted by the stable variation index, not completion order.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        aspect_ratio: &str,
        progress: &dyn ProgressReporter,
    ) -> Vec<(usize, String)> {
        let total = plan.items.len();

        let renders = plan.items.iter().enumerate().map(|(position, item)| {
            let position = position + 1;
            let render = async move {
                progress.report(ProgressEvent::RenderSubmitted {
                    index: item.index,
                    position,
                    total,
                });
                match self.render_one(item, aspect_ratio, progress).await {
                    Ok(image_url) => {
                        progress.report(ProgressEvent::RenderCompleted {
                            index: item.index,
                            position,
                            total,
                            image_url: image_url.clone(),
                        });
                        Some((item.index, image_url))
                    }
                    Err(e) => {
                        error!("Variation {} failed: {}", item.index, e);
                        progress.report(ProgressEvent::RenderFailed {
                            index: item.index,
                            position,
                            total,
                            error: e.to_string(),
                        });
                        None
                    }
                }
            };
            render.instrument(info_span!("render", index = item.index))
        });

        let mut rendered: Vec<(usize, String)> = stream::iter(renders)
            .buffer_unordered(self.render_concurrency)
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;
        rendered.sort_by_key(|(index, _)| *index);
        rendered
    }

    async fn render_one(
        &self,
        item: &PlanItem,
        aspect_ratio: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<String, PipelineError> {
        let submitted = self
            .image_service
            .render(&item.structured_description, item.seed, aspect_ratio)
            .await?;
        let terminal = match status_url(&submitted) {
            Some(url) => {
                let url = url.to_string();
                progress.report(ProgressEvent::RenderPolling { index: item.index });
                self.image_service.poll_until_terminal(&url).await?
            }
            None => submitted,
        };
        extract_image_url(&terminal)
    }

    /// Runs the whole pipeline for `job_id`, reporting into `store`. Safe to
    /// call fire-and-forget on a background task; every outcome, including a
    /// panic-free internal error, lands in the job record.
    pub async fn run_pipeline(&self, job_id: &str, store: &Arc<JobStore>) {
        let span = info_span!("pipeline", job_id = %job_id);
        self.run_pipeline_inner(job_id, store).instrument(span).await
    }

    async fn run_pipeline_inner(&self, job_id: &str, store: &Arc<JobStore>) {
        let Some(job) = store.get(job_id) else {
            warn!("run_pipeline called for unknown job '{}'", job_id);
            return;
        };

        store.update_stage(job_id, JobStage::Started);
        store.set_progress(job_id, 5);
        store.append_event(job_id, "Starting generation pipeline...");

        let image_b64 = match &job.image_path {
            Some(path) => match load_reference_image(path).await {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    error!("Job {} failed before describe: {}", job_id, e);
                    store.fail(job_id, e.to_string(), Some(error_chain(&e)));
                    return;
                }
            },
            None => None,
        };

        let progress = JobProgress::new(Arc::clone(store), job_id, job.variations);

        match self
            .generate_plan(
                &job.prompt,
                image_b64.as_deref(),
                &job.brand_guidelines,
                job.variations,
                &progress,
            )
            .await
        {
            Ok(plan) => {
                let total = plan.items.len();
                let rendered = self.execute_plan(&plan, &job.aspect_ratio, &progress).await;
                if rendered.is_empty() {
                    // A batch with zero images is not a usable result, even
                    // though every individual failure was contained.
                    store.fail(
                        job_id,
                        format!("all {} variations failed to render", total),
                        None,
                    );
                } else {
                    store.complete(job_id, rendered.into_iter().map(|(_, url)| url).collect());
                }
            }
            Err(e) => {
                error!("Pipeline for job {} aborted: {}", job_id, e);
                let trace = error_chain(&e);
                store.fail(job_id, e.to_string(), Some(trace));
            }
        }
    }
}

/// Decodes the describe result into (base description, optional seed).
/// The engine string-encodes the description; an inline object is accepted
/// too.
fn decode_description(response: &Value) -> Result<(Value, Option<i64>), PipelineError> {
    let result = response.get("result").unwrap_or(response);
    let raw = result
        .get("structured_description")
        .ok_or(PipelineError::MissingDescription)?;

    let description = match raw {
        Value::String(encoded) => serde_json::from_str(encoded)
            .map_err(|e| PipelineError::MalformedDescription(e.to_string()))?,
        other => other.clone(),
    };
    let seed = result.get("seed").and_then(Value::as_i64);
    Ok((description, seed))
}

/// Pulls the rendered image URL out of a terminal render payload. The engine
/// usually answers with an `image_urls` list; a scalar `image_url` is
/// accepted, and a URL wins over a non-COMPLETED status.
fn extract_image_url(response: &Value) -> Result<String, PipelineError> {
    let result = response.get("result").unwrap_or(response);
    let url = result
        .get("image_urls")
        .and_then(Value::as_array)
        .and_then(|urls| urls.first())
        .and_then(Value::as_str)
        .or_else(|| result.get("image_url").and_then(Value::as_str));

    match url {
        Some(url) => Ok(url.to_string()),
        None => {
            let status = response
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Err(PipelineError::MissingImageUrl { status })
        }
    }
}

async fn load_reference_image(path: &Path) -> Result<String, PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| PipelineError::ReferenceImage {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}
