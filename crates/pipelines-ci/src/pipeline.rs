//! Fail-fast CI pipeline orchestration.

use crate::runner::{CiRunner, StageResult};
use crate::stage::StageConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a complete CI pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Unique id of this run.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Whether all executed stages passed.
    pub success: bool,

    /// Results of executed stages, in order.
    pub stages: Vec<StageResult>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed()).count()
    }

    /// Number of stages that failed.
    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.passed()).count()
    }

    /// The stage that stopped the run, if any.
    pub fn first_failure(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| !s.passed())
    }

    /// Result of the stage named `name`, if it ran.
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage_name == name)
    }
}

/// CI pipeline orchestrator.
pub struct CiPipeline;

impl CiPipeline {
    /// Execute stages in order, stopping at the first failure.
    ///
    /// Disabled stages are skipped. A stage that cannot be executed at all
    /// (spawn error, timeout) is recorded with exit code -1 and its error
    /// message as stderr. Stages after a failure are not run.
    pub async fn run(stages: Vec<StageConfig>) -> PipelineResult {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        info!(run_id = %run_id, stages = stages.len(), "Starting CI pipeline");

        let mut stage_results = Vec::new();
        let mut all_passed = true;

        for config in stages {
            if !config.enabled {
                info!(stage = %config.name, "Skipping disabled stage");
                continue;
            }

            info!(stage = %config.name, "Executing stage");

            let stage_start = Instant::now();
            let result = match CiRunner::execute_stage(&config).await {
                Ok(r) => r,
                Err(e) => StageResult {
                    stage_name: config.name.clone(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("{e:#}"),
                    duration_ms: stage_start.elapsed().as_millis() as u64,
                    success: false,
                },
            };

            let passed = result.passed();
            if passed {
                info!(
                    stage = %result.stage_name,
                    duration_ms = result.duration_ms,
                    "Stage passed"
                );
            } else {
                warn!(
                    stage = %result.stage_name,
                    exit_code = result.exit_code,
                    "Stage failed"
                );
            }
            stage_results.push(result);

            if !passed {
                all_passed = false;
                break;
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        if all_passed {
            info!(run_id = %run_id, duration_ms, "CI pipeline completed successfully");
        } else {
            warn!(run_id = %run_id, duration_ms, "CI pipeline failed");
        }

        PipelineResult {
            run_id,
            started_at,
            success: all_passed,
            stages: stage_results,
            duration_ms,
        }
    }
}
