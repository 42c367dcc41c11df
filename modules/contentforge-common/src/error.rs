use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The upstream collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    ArticleSearch,
    TextGeneration,
    ImageGeneration,
    RenderJob,
    Publish,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::ArticleSearch => "article search",
            Service::TextGeneration => "text generation",
            Service::ImageGeneration => "image generation",
            Service::RenderJob => "render job",
            Service::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable { service: Service, message: String },

    #[error("Malformed generation response: missing {field}")]
    MalformedGenerationResponse { field: String },

    #[error("Fact check below threshold: {confidence}% - {explanation}")]
    ThresholdNotMet { confidence: u8, explanation: String },

    #[error("Render job {job_id} timed out after {elapsed_secs}s")]
    JobTimedOut { job_id: String, elapsed_secs: u64 },

    #[error("Render job {job_id} failed")]
    JobFailed { job_id: String },

    #[error("Run cancelled by caller")]
    Cancelled,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Duplicate artifact filename: {0}")]
    DuplicateArtifact(String),
}

impl PipelineError {
    pub fn upstream(service: Service, err: impl fmt::Display) -> Self {
        PipelineError::UpstreamUnavailable {
            service,
            message: err.to_string(),
        }
    }

    /// Failures that only take down one branch or short-form unit.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamUnavailable { .. }
                | PipelineError::MalformedGenerationResponse { .. }
                | PipelineError::JobTimedOut { .. }
                | PipelineError::JobFailed { .. }
        )
    }
}
