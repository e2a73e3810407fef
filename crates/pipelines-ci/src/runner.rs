//! CI stage execution.

use crate::stage::StageConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Result of a stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Exit code (0 = success, -1 = never ran to completion).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last `max_lines` non-empty lines of stderr, falling back to stdout.
    pub fn output_tail(&self, max_lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// CI stage runner.
pub struct CiRunner;

impl CiRunner {
    /// Execute a single stage and return the result.
    ///
    /// A non-zero exit is reported through [`StageResult`]; an `Err` means
    /// the command could not be run at all (empty command, spawn failure,
    /// stdin write failure, timeout).
    pub async fn execute_stage(config: &StageConfig) -> anyhow::Result<StageResult> {
        let start = Instant::now();

        // Validate command
        if config.command.is_empty() {
            anyhow::bail!("Stage {} has empty command", config.name);
        }

        let exe = &config.command[0];
        let args = &config.command[1..];

        let mut command = Command::new(exe);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if config.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        debug!(stage = %config.name, command = %config.display_command(), "Spawning stage");

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn stage {} ({})", config.name, exe))?;

        if let Some(secret) = &config.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(secret.expose().as_bytes())
                    .await
                    .with_context(|| format!("Failed to write stdin of stage {}", config.name))?;
                stdin.shutdown().await.ok();
            }
        }

        // Execute with timeout
        let output = if config.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Stage {} timed out after {} seconds",
                    config.name,
                    config.timeout_secs
                )
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let success = output.status.success();

        Ok(StageResult {
            stage_name: config.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success,
        })
    }
}
