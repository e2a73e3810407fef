//! Validated pipeline inputs.
//!
//! Requests are built once from caller inputs and consumed by a single
//! pipeline run. Construction is the only place inputs are checked.

use crate::error::{PipelineError, Result};
use pipelines_ci::Secret;

/// Registry username and token.
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub token: Secret,
}

impl RegistryCredentials {
    /// Both halves must be non-blank.
    pub fn new(username: impl Into<String>, token: impl Into<Secret>) -> Result<Self> {
        let username = username.into().trim().to_string();
        let token = token.into();

        if username.is_empty() {
            return Err(PipelineError::InvalidInput(
                "registry username (DOCKERHUB_USERNAME) must not be empty".to_string(),
            ));
        }
        if token.is_blank() {
            return Err(PipelineError::InvalidInput(
                "registry token (DOCKERHUB_TOKEN) must not be empty".to_string(),
            ));
        }

        Ok(Self { username, token })
    }
}

/// Input of the build-and-push pipeline.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub image_name: String,
    pub credentials: RegistryCredentials,
}

impl BuildRequest {
    pub fn new(image_name: impl Into<String>, credentials: RegistryCredentials) -> Result<Self> {
        let image_name = image_name.into().trim().to_string();

        if image_name.is_empty() {
            return Err(PipelineError::InvalidInput(
                "image-name must not be empty".to_string(),
            ));
        }
        if image_name.chars().any(char::is_whitespace) {
            return Err(PipelineError::InvalidInput(format!(
                "image-name must not contain whitespace: {image_name:?}"
            )));
        }

        Ok(Self {
            image_name,
            credentials,
        })
    }

    /// Fully qualified reference the image is tagged and pushed as.
    pub fn reference(&self, registry: &str) -> String {
        qualify_image(registry, &self.image_name)
    }
}

/// Prefix `image_name` with `registry` unless it already carries it.
pub fn qualify_image(registry: &str, image_name: &str) -> String {
    let registry = registry.trim_end_matches('/');
    if registry.is_empty() || image_name.starts_with(&format!("{registry}/")) {
        image_name.to_string()
    } else {
        format!("{registry}/{image_name}")
    }
}

/// Input of the coverage pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageRequest {
    pub pull_request: u64,
}

impl CoverageRequest {
    pub fn new(pull_request: u64) -> Result<Self> {
        if pull_request == 0 {
            return Err(PipelineError::InvalidInput(
                "pull-request-number must be a positive integer".to_string(),
            ));
        }
        Ok(Self { pull_request })
    }

    /// Parse the workflow's string input.
    pub fn parse(raw: &str) -> Result<Self> {
        let number = raw.trim().trim_start_matches('#').parse::<u64>().map_err(|_| {
            PipelineError::InvalidInput(format!(
                "pull-request-number must be a positive integer, got {raw:?}"
            ))
        })?;
        Self::new(number)
    }
}
