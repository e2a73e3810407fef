//! Error taxonomy for the pipelines.
//!
//! Every variant is fatal: the caller reports it and the run fails.

use std::path::PathBuf;

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("registry authentication failed for {registry}: {message}")]
    Authentication { registry: String, message: String },

    #[error("tests failed: {0}")]
    TestFailure(String),

    #[error("image build failed: {0}")]
    BuildFailure(String),

    #[error("image push failed for {reference}: {message}")]
    PushFailure { reference: String, message: String },

    #[error("stage {stage} failed: {message}")]
    StageFailure { stage: String, message: String },

    #[error("coverage report not found at {}", .0.display())]
    ReportNotFound(PathBuf),

    #[error("malformed coverage report: {0}")]
    MalformedReport(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("GitHub rejected credentials (HTTP {status})")]
    GitHubUnauthorized { status: u16 },

    #[error("GitHub API error (HTTP {status}): {message}")]
    GitHubApi { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Http(err.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
