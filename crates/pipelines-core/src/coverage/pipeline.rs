//! Coverage pipeline: locate → parse → render → upsert.

use super::jacoco::{CoverageReport, LineCounts};
use super::markdown::{render_coverage_markdown, BaseComparison, COVERAGE_COMMENT_MARKER};
use crate::config::{canonical_source, resolve_in, CoverageConfig};
use crate::error::{PipelineError, Result};
use crate::git;
use crate::github::{upsert_comment, IssueComments, UpsertOutcome};
use crate::request::CoverageRequest;
use pipelines_ci::{BuiltinStage, CiPipeline};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

const ERROR_TAIL_LINES: usize = 40;

/// Source of the pull request's changed paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedFiles {
    /// Paths supplied by the caller.
    Listed(Vec<String>),
    /// `git diff --name-only <ref>...HEAD` in the source tree.
    SinceRef(String),
}

/// Inputs of the changed-files section.
#[derive(Debug, Clone)]
pub struct ComparisonInput {
    /// JaCoCo report of the base branch. A path that does not exist renders
    /// deltas as `n/a`.
    pub base_report: Option<PathBuf>,
    pub changed_files: ChangedFiles,
}

/// Parsed head report and its rendered comment.
#[derive(Debug, Clone)]
pub struct RenderedCoverage {
    pub report: CoverageReport,
    pub markdown: String,
}

/// Result of a coverage run against a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageOutcome {
    pub pull_request: u64,
    pub total: LineCounts,
    pub comment: UpsertOutcome,
    #[serde(skip)]
    pub markdown: String,
}

pub struct CoveragePipeline {
    config: CoverageConfig,
}

impl CoveragePipeline {
    pub fn new(config: CoverageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Produce (optionally) and parse the report, then render the comment.
    pub async fn prepare(&self, comparison: Option<&ComparisonInput>) -> Result<RenderedCoverage> {
        if self.config.build {
            self.build_report().await?;
        }

        let report_path = self.config.resolved_report_path();
        let report = CoverageReport::from_file(&report_path)?;
        info!(
            report = %report_path.display(),
            covered = report.lines.covered,
            total = report.lines.total(),
            packages = report.packages.len(),
            "Parsed coverage report"
        );

        let comparison = match comparison {
            Some(input) => Some(self.resolve_comparison(input)?),
            None => None,
        };
        let markdown = render_coverage_markdown(&report, comparison.as_ref());

        Ok(RenderedCoverage { report, markdown })
    }

    /// Render the comment and create or update it on the pull request.
    ///
    /// Nothing is posted unless the report was found and parsed.
    pub async fn run(
        &self,
        request: CoverageRequest,
        comparison: Option<&ComparisonInput>,
        comments: &dyn IssueComments,
    ) -> Result<CoverageOutcome> {
        let rendered = self.prepare(comparison).await?;
        let comment = upsert_comment(
            comments,
            request.pull_request,
            COVERAGE_COMMENT_MARKER,
            &rendered.markdown,
        )
        .await?;

        info!(
            pull_request = request.pull_request,
            comment_id = comment.id(),
            "Coverage comment published"
        );

        Ok(CoverageOutcome {
            pull_request: request.pull_request,
            total: rendered.report.lines,
            comment,
            markdown: rendered.markdown,
        })
    }

    async fn build_report(&self) -> Result<()> {
        let source = canonical_source(&self.config.source_dir)?;
        let stage = self.config.maven.stage(
            BuiltinStage::MavenVerify,
            &source,
            self.config.stage_timeout_secs,
        );

        let result = CiPipeline::run(vec![stage]).await;
        match result.first_failure() {
            Some(failed) => Err(PipelineError::TestFailure(
                failed.output_tail(ERROR_TAIL_LINES),
            )),
            None => Ok(()),
        }
    }

    fn resolve_comparison(&self, input: &ComparisonInput) -> Result<BaseComparison> {
        let base = match &input.base_report {
            Some(path) => {
                let path = resolve_in(&self.config.source_dir, path);
                match CoverageReport::from_file(&path) {
                    Ok(report) => Some(report),
                    Err(PipelineError::ReportNotFound(missing)) => {
                        warn!(path = %missing.display(), "Base coverage report not found");
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };

        let changed_files = match &input.changed_files {
            ChangedFiles::Listed(paths) => paths.clone(),
            ChangedFiles::SinceRef(base_ref) => {
                git::changed_files(&self.config.source_dir, base_ref)?
            }
        };

        Ok(BaseComparison {
            base,
            changed_files,
        })
    }
}
