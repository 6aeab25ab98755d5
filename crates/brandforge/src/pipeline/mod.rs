pub mod error;
pub mod plan;
pub mod progress;
pub mod runner;

pub use error::PipelineError;
pub use plan::{Plan, PlanItem};
pub use progress::{JobProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::Orchestrator;
