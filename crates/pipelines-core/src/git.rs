//! Git queries against the caller's checkout.

use std::path::Path;
use std::process::Command;

use crate::error::{PipelineError, Result};

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory. Returns an error if the
/// directory is not inside a git repository or if git is not available.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let stdout = run_git(repo_dir, &["rev-parse", "HEAD"])?;
    let sha = stdout.trim().to_string();
    if sha.is_empty() {
        return Err(PipelineError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }

    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Files changed on HEAD since it diverged from `base_ref`.
///
/// Uses the three-dot form (`base...HEAD`) so commits that landed on the
/// base after the branch point are not reported.
pub fn changed_files(repo_dir: &Path, base_ref: &str) -> Result<Vec<String>> {
    let base_ref = base_ref.trim();
    if base_ref.is_empty() || base_ref.starts_with('-') {
        return Err(PipelineError::InvalidInput(format!(
            "invalid base ref: {base_ref:?}"
        )));
    }

    let range = format!("{base_ref}...HEAD");
    let stdout = run_git(repo_dir, &["diff", "--name-only", &range])?;

    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn run_git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| PipelineError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
