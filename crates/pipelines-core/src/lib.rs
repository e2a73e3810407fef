//! Pipelines Core Library
//!
//! The two reusable CI pipelines and the pieces they are built from:
//! - build-and-push: Maven tests, registry login, image build and push
//! - java-coverage: JaCoCo parsing, markdown rendering and the PR comment upsert

pub mod build_push;
pub mod config;
pub mod coverage;
pub mod error;
pub mod fakes;
pub mod git;
pub mod github;
pub mod request;
pub mod telemetry;

pub use build_push::{parse_push_digest, BuildAndPushPipeline, PublishedImage};

pub use config::{
    BuildConfig, CoverageConfig, GitHubConfig, MavenRuntime, Repository, DEFAULT_DOCKERFILE,
    DEFAULT_GITHUB_API_URL, DEFAULT_PLATFORM, DEFAULT_REGISTRY, DEFAULT_REPORT_PATH,
};

pub use coverage::{
    render_coverage_markdown, BaseComparison, ChangedFiles, ComparisonInput, CoverageOutcome,
    CoveragePipeline, CoverageReport, LineCounts, RenderedCoverage, COVERAGE_COMMENT_MARKER,
};

pub use error::{PipelineError, Result};

pub use git::{capture_head_sha, changed_files, is_git_repo};

pub use github::{upsert_comment, GitHubClient, IssueComment, IssueComments, UpsertOutcome};

pub use request::{qualify_image, BuildRequest, CoverageRequest, RegistryCredentials};

pub use telemetry::init_tracing;

pub use pipelines_ci::{ContainerSpec, PipelineResult, Secret};
