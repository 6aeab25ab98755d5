use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrandforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Image service error: {0}")]
    ImageService(#[from] crate::image_service::ImageServiceError),

    #[error("Job store error: {0}")]
    Job(#[from] crate::job::JobStoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required credential: set {0}")]
    MissingCredential(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, BrandforgeError>;
