//! CI stage definitions and configuration.

use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default image for Maven stages.
pub const DEFAULT_MAVEN_IMAGE: &str = "maven:3.9.9-eclipse-temurin-21-jammy";

/// Default named volume holding the Maven repository between runs.
pub const DEFAULT_MAVEN_CACHE_VOLUME: &str = "maven-cache";

/// Builtin Maven stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// mvn --batch-mode test
    MavenTest,

    /// mvn --batch-mode verify -Pcoverage
    MavenVerify,
}

impl BuiltinStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::MavenTest => "maven_test",
            BuiltinStage::MavenVerify => "maven_verify",
        }
    }

    /// Get the stage's main command.
    pub fn command(&self) -> Vec<String> {
        match self {
            BuiltinStage::MavenTest => {
                vec!["mvn".to_string(), "--batch-mode".to_string(), "test".to_string()]
            }
            BuiltinStage::MavenVerify => vec![
                "mvn".to_string(),
                "--batch-mode".to_string(),
                "verify".to_string(),
                "-Pcoverage".to_string(),
            ],
        }
    }
}

/// Build container a stage command can be wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Docker CLI executable that starts the container.
    pub docker: String,

    /// Image to run the command in.
    pub image: String,

    /// Named volume mounted as the Maven local repository.
    pub cache_volume: String,

    /// Where the cache volume is mounted inside the container.
    pub cache_mount: String,

    /// Where the source tree is mounted and the command runs.
    pub workdir: String,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            image: DEFAULT_MAVEN_IMAGE.to_string(),
            cache_volume: DEFAULT_MAVEN_CACHE_VOLUME.to_string(),
            cache_mount: "/root/.m2".to_string(),
            workdir: "/app".to_string(),
        }
    }
}

impl ContainerSpec {
    /// Wrap `command` in a `docker run` that mounts `source_dir` at the workdir.
    pub fn wrap(&self, source_dir: &Path, command: &[String]) -> Vec<String> {
        let mut wrapped = vec![
            self.docker.clone(),
            "run".to_string(),
            "--rm".to_string(),
            "--volume".to_string(),
            format!("{}:{}", self.cache_volume, self.cache_mount),
            "--volume".to_string(),
            format!("{}:{}", source_dir.display(), self.workdir),
            "--workdir".to_string(),
            self.workdir.clone(),
            self.image.clone(),
        ];
        wrapped.extend(command.iter().cloned());
        wrapped
    }
}

/// Configuration for a CI stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Directory the command runs in (inherits the caller's when unset).
    pub working_dir: Option<PathBuf>,

    /// Secret written to the child's stdin, then stdin is closed.
    #[serde(skip)]
    pub stdin: Option<Secret>,

    /// Timeout in seconds (0 = no timeout).
    pub timeout_secs: u64,

    /// Whether this stage is enabled.
    pub enabled: bool,
}

impl StageConfig {
    /// Create a new stage configuration from a builtin stage.
    pub fn from_builtin(stage: BuiltinStage, timeout_secs: u64) -> Self {
        Self::custom(stage.name().to_string(), stage.command(), timeout_secs)
    }

    /// Create a custom stage configuration.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            working_dir: None,
            stdin: None,
            timeout_secs,
            enabled: true,
        }
    }

    /// Run in `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run inside `container` with `source_dir` mounted as the workdir.
    pub fn in_container(mut self, container: &ContainerSpec, source_dir: &Path) -> Self {
        self.command = container.wrap(source_dir, &self.command);
        self
    }

    /// Feed `secret` to the command's stdin.
    pub fn with_stdin(mut self, secret: Secret) -> Self {
        self.stdin = Some(secret);
        self
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Command line for logs.
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}
