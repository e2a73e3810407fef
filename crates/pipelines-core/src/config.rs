//! Pipeline configuration.
//!
//! Defaults live here as constants; the GitHub settings are read from the
//! environment the workflow runner provides.

use crate::error::{PipelineError, Result};
use pipelines_ci::{BuiltinStage, ContainerSpec, Secret, StageConfig};
use std::path::{Path, PathBuf};

/// Registry images are pushed to.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Target platform of the built image.
pub const DEFAULT_PLATFORM: &str = "linux/arm64";

/// Dockerfile, relative to the source tree.
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Where the JaCoCo Maven plugin writes its XML report.
pub const DEFAULT_REPORT_PATH: &str = "target/site/jacoco/jacoco.xml";

/// Public GitHub REST endpoint.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// An `owner/name` repository slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn parse(slug: &str) -> Result<Self> {
        let slug = slug.trim();
        match slug.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(PipelineError::InvalidInput(format!(
                "repository must look like owner/name, got {slug:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// GitHub API access for the comment upsert.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// REST base URL, without trailing slash.
    pub api_url: String,
    /// Repository the pull request belongs to.
    pub repository: Repository,
    /// Token with `pull-requests: write`.
    pub token: Secret,
}

impl GitHubConfig {
    pub fn new(api_url: &str, repository: Repository, token: Secret) -> Result<Self> {
        if token.is_blank() {
            return Err(PipelineError::InvalidInput(
                "GITHUB_TOKEN must not be empty".to_string(),
            ));
        }
        let api_url = api_url.trim().trim_end_matches('/');
        Ok(Self {
            api_url: if api_url.is_empty() {
                DEFAULT_GITHUB_API_URL.to_string()
            } else {
                api_url.to_string()
            },
            repository,
            token,
        })
    }

    /// Read `GITHUB_TOKEN`, `GITHUB_REPOSITORY` and `GITHUB_API_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`GitHubConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup("GITHUB_TOKEN").ok_or_else(|| {
            PipelineError::InvalidInput("GITHUB_TOKEN is not set".to_string())
        })?;
        let repository = lookup("GITHUB_REPOSITORY").ok_or_else(|| {
            PipelineError::InvalidInput("GITHUB_REPOSITORY is not set".to_string())
        })?;
        let api_url =
            lookup("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string());

        Self::new(&api_url, Repository::parse(&repository)?, Secret::new(token))
    }
}

/// How Maven stages are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MavenRuntime {
    /// Inside a throwaway build container.
    Container(ContainerSpec),
    /// With the `mvn` found on the runner's PATH.
    Local,
}

impl Default for MavenRuntime {
    fn default() -> Self {
        MavenRuntime::Container(ContainerSpec::default())
    }
}

impl MavenRuntime {
    /// Same runtime, starting containers with the `docker` executable.
    pub fn with_docker(&self, docker: &str) -> Self {
        match self {
            MavenRuntime::Container(container) => MavenRuntime::Container(ContainerSpec {
                docker: docker.to_string(),
                ..container.clone()
            }),
            MavenRuntime::Local => MavenRuntime::Local,
        }
    }

    /// Stage running `stage` against the source tree at `source_dir`.
    ///
    /// `source_dir` must be absolute when running in a container.
    pub fn stage(
        &self,
        stage: BuiltinStage,
        source_dir: &Path,
        timeout_secs: u64,
    ) -> StageConfig {
        let config = StageConfig::from_builtin(stage, timeout_secs);
        match self {
            MavenRuntime::Container(container) => config.in_container(container, source_dir),
            MavenRuntime::Local => config.in_dir(source_dir),
        }
    }
}

/// Settings of the build-and-push pipeline.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Caller's checked-out source tree (the build context).
    pub source_dir: PathBuf,
    /// Docker CLI executable.
    pub docker: String,
    pub registry: String,
    pub platform: String,
    /// Dockerfile path, relative to `source_dir`.
    pub dockerfile: PathBuf,
    /// Run `mvn test` before building.
    pub run_tests: bool,
    pub maven: MavenRuntime,
    /// Per-stage timeout in seconds (0 = none).
    pub stage_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            docker: "docker".to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
            dockerfile: PathBuf::from(DEFAULT_DOCKERFILE),
            run_tests: true,
            maven: MavenRuntime::default(),
            stage_timeout_secs: 0,
        }
    }
}

/// Settings of the coverage pipeline.
#[derive(Debug, Clone)]
pub struct CoverageConfig {
    /// Caller's checked-out source tree.
    pub source_dir: PathBuf,
    /// Report location; relative paths resolve against `source_dir`.
    pub report_path: PathBuf,
    /// Run `mvn verify -Pcoverage` before reading the report.
    pub build: bool,
    pub maven: MavenRuntime,
    /// Per-stage timeout in seconds (0 = none).
    pub stage_timeout_secs: u64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            build: false,
            maven: MavenRuntime::default(),
            stage_timeout_secs: 0,
        }
    }
}

impl CoverageConfig {
    /// Absolute-or-source-relative location of the report.
    pub fn resolved_report_path(&self) -> PathBuf {
        resolve_in(&self.source_dir, &self.report_path)
    }
}

/// Absolute path of an existing source tree.
pub fn canonical_source(dir: &Path) -> Result<PathBuf> {
    let canonical = std::fs::canonicalize(dir).map_err(|e| {
        PipelineError::InvalidInput(format!(
            "source directory {} is not accessible: {e}",
            dir.display()
        ))
    })?;
    if !canonical.is_dir() {
        return Err(PipelineError::InvalidInput(format!(
            "source path {} is not a directory",
            dir.display()
        )));
    }
    Ok(canonical)
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
