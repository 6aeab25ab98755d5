pub mod config;
pub mod context;
pub mod error;
pub mod image_service;
pub mod job;
pub mod pipeline;
pub mod planner;
pub mod service;

pub use config::Config;
pub use context::ContextProvider;
pub use error::{BrandforgeError, ConfigError, Result};
pub use image_service::{ImageService, ImageServiceClient, ImageServiceError};
pub use job::{Job, JobRequest, JobStage, JobStore, JobStoreError, PartialResult};
pub use pipeline::{
    NoopProgress, Orchestrator, Plan, PlanItem, PipelineError, ProgressEvent, ProgressReporter,
};
pub use planner::{deep_merge, ChatClient, ChatError, ChatModel, VariationPlanner};
pub use service::GenerationService;
