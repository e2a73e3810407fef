//! Build-and-push pipeline.
//!
//! Runs the caller's test suite, logs in to the registry, builds the image
//! from the caller's source tree and pushes it. Stages run in order and the
//! first failure aborts the run, so bad credentials never reach the push.

use crate::config::{canonical_source, resolve_in, BuildConfig};
use crate::error::{PipelineError, Result};
use crate::git::{capture_head_sha, is_git_repo};
use crate::request::BuildRequest;
use pipelines_ci::{BuiltinStage, CiPipeline, PipelineResult, StageConfig, StageResult};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

pub const REGISTRY_LOGIN_STAGE: &str = "registry_login";
pub const DOCKER_BUILD_STAGE: &str = "docker_build";
pub const DOCKER_PUSH_STAGE: &str = "docker_push";

/// Lines of stage output carried into error messages.
const ERROR_TAIL_LINES: usize = 20;

/// A pushed image.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedImage {
    /// Tag reference the image was pushed as.
    pub reference: String,
    /// Manifest digest reported by the registry, when available.
    pub digest: Option<String>,
    pub run: PipelineResult,
}

impl PublishedImage {
    /// `reference@digest`, or the bare reference without a digest.
    pub fn pinned_reference(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.reference, digest),
            None => self.reference.clone(),
        }
    }
}

pub struct BuildAndPushPipeline {
    config: BuildConfig,
}

impl BuildAndPushPipeline {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run only the Maven test stage.
    pub async fn test(&self) -> Result<PipelineResult> {
        let source = canonical_source(&self.config.source_dir)?;
        let stage = self.maven_test_stage(&source);

        let result = CiPipeline::run(vec![stage]).await;
        match result.first_failure() {
            Some(failed) => Err(PipelineError::TestFailure(failed.output_tail(ERROR_TAIL_LINES))),
            None => Ok(result),
        }
    }

    /// Build and push the image named by `request`.
    pub async fn run(&self, request: BuildRequest) -> Result<PublishedImage> {
        let source = canonical_source(&self.config.source_dir)?;
        let reference = request.reference(&self.config.registry);
        let revision = source_revision(&source);

        // Keep the login out of the runner's shared docker config.
        let docker_config = tempfile::Builder::new()
            .prefix("ci-pipelines-docker-")
            .tempdir()?;

        info!(
            image = %reference,
            platform = %self.config.platform,
            source = %source.display(),
            "Starting build-and-push"
        );

        let stages = self.stages(
            &request,
            &source,
            docker_config.path(),
            revision.as_deref(),
        );
        let run = CiPipeline::run(stages).await;

        if let Some(failed) = run.first_failure() {
            return Err(self.stage_error(failed, &reference));
        }

        let digest = run
            .stage(DOCKER_PUSH_STAGE)
            .and_then(|push| parse_push_digest(&push.stdout));

        let published = PublishedImage {
            reference,
            digest,
            run,
        };
        info!(image = %published.pinned_reference(), "Image pushed");
        Ok(published)
    }

    /// Stages for `request`, in execution order.
    ///
    /// The registry token is only ever passed on the login stage's stdin.
    pub fn stages(
        &self,
        request: &BuildRequest,
        source: &Path,
        docker_config: &Path,
        revision: Option<&str>,
    ) -> Vec<StageConfig> {
        let timeout = self.config.stage_timeout_secs;
        let reference = request.reference(&self.config.registry);
        let docker = |args: Vec<String>| -> Vec<String> {
            let mut command = vec![
                self.config.docker.clone(),
                "--config".to_string(),
                docker_config.display().to_string(),
            ];
            command.extend(args);
            command
        };

        let mut stages = Vec::new();

        let test = self.maven_test_stage(source);
        stages.push(if self.config.run_tests {
            test
        } else {
            test.disabled()
        });

        stages.push(
            StageConfig::custom(
                REGISTRY_LOGIN_STAGE.to_string(),
                docker(vec![
                    "login".to_string(),
                    self.config.registry.clone(),
                    "--username".to_string(),
                    request.credentials.username.clone(),
                    "--password-stdin".to_string(),
                ]),
                timeout,
            )
            .with_stdin(request.credentials.token.clone()),
        );

        let mut build = vec![
            "build".to_string(),
            "--platform".to_string(),
            self.config.platform.clone(),
            "--file".to_string(),
            resolve_in(source, &self.config.dockerfile)
                .display()
                .to_string(),
            "--tag".to_string(),
            reference.clone(),
        ];
        if let Some(sha) = revision {
            build.push("--label".to_string());
            build.push(format!("org.opencontainers.image.revision={sha}"));
        }
        build.push(source.display().to_string());
        stages.push(
            StageConfig::custom(DOCKER_BUILD_STAGE.to_string(), docker(build), timeout)
                .in_dir(source),
        );

        stages.push(StageConfig::custom(
            DOCKER_PUSH_STAGE.to_string(),
            docker(vec!["push".to_string(), reference]),
            timeout,
        ));

        stages
    }

    fn maven_test_stage(&self, source: &Path) -> StageConfig {
        self.config.maven.with_docker(&self.config.docker).stage(
            BuiltinStage::MavenTest,
            source,
            self.config.stage_timeout_secs,
        )
    }

    fn stage_error(&self, failed: &StageResult, reference: &str) -> PipelineError {
        let message = failed.output_tail(ERROR_TAIL_LINES);
        match failed.stage_name.as_str() {
            name if name == BuiltinStage::MavenTest.name() => PipelineError::TestFailure(message),
            REGISTRY_LOGIN_STAGE => PipelineError::Authentication {
                registry: self.config.registry.clone(),
                message,
            },
            DOCKER_BUILD_STAGE => PipelineError::BuildFailure(message),
            DOCKER_PUSH_STAGE => PipelineError::PushFailure {
                reference: reference.to_string(),
                message,
            },
            other => PipelineError::StageFailure {
                stage: other.to_string(),
                message,
            },
        }
    }
}

/// HEAD commit of the source tree, if it is a git checkout.
fn source_revision(source: &Path) -> Option<String> {
    if !is_git_repo(source) {
        return None;
    }
    match capture_head_sha(source) {
        Ok(sha) => Some(sha),
        Err(e) => {
            warn!(error = %e, "Could not read source revision");
            None
        }
    }
}

/// Extract `sha256:…` from `docker push` output (`<tag>: digest: sha256:… size: N`).
pub fn parse_push_digest(stdout: &str) -> Option<String> {
    stdout.lines().rev().find_map(|line| {
        let (_, rest) = line.split_once("digest: ")?;
        let digest = rest.split_whitespace().next()?;
        digest.starts_with("sha256:").then(|| digest.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MavenRuntime;
    use crate::request::RegistryCredentials;
    use std::path::PathBuf;

    fn request() -> BuildRequest {
        let creds = RegistryCredentials::new("dariomr8", "dckr_pat_secret").unwrap();
        BuildRequest::new("dariomr8/app:latest", creds).unwrap()
    }

    fn pipeline(run_tests: bool) -> BuildAndPushPipeline {
        BuildAndPushPipeline::new(BuildConfig {
            run_tests,
            maven: MavenRuntime::Local,
            ..BuildConfig::default()
        })
    }

    fn stages(run_tests: bool, revision: Option<&str>) -> Vec<StageConfig> {
        pipeline(run_tests).stages(
            &request(),
            Path::new("/work/app"),
            Path::new("/tmp/docker-cfg"),
            revision,
        )
    }

    #[test]
    fn test_stage_order() {
        let names: Vec<String> = stages(true, None).into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["maven_test", "registry_login", "docker_build", "docker_push"]
        );
    }

    #[test]
    fn test_skipped_tests_stage_is_disabled() {
        let stages = stages(false, None);
        assert!(!stages[0].enabled);
        assert!(stages[1..].iter().all(|s| s.enabled));
    }

    #[test]
    fn test_login_uses_stdin_for_token() {
        let stages = stages(true, None);
        let login = &stages[1];
        assert_eq!(
            login.command,
            vec![
                "docker",
                "--config",
                "/tmp/docker-cfg",
                "login",
                "docker.io",
                "--username",
                "dariomr8",
                "--password-stdin"
            ]
        );
        assert_eq!(
            login.stdin.as_ref().map(|s| s.expose()),
            Some("dckr_pat_secret")
        );
        for stage in &stages {
            assert!(!stage.display_command().contains("dckr_pat_secret"));
        }
    }

    #[test]
    fn test_build_and_push_commands() {
        let stages = stages(true, Some("abc123"));
        let build = &stages[2];
        assert_eq!(
            build.command,
            vec![
                "docker",
                "--config",
                "/tmp/docker-cfg",
                "build",
                "--platform",
                "linux/arm64",
                "--file",
                "/work/app/Dockerfile",
                "--tag",
                "docker.io/dariomr8/app:latest",
                "--label",
                "org.opencontainers.image.revision=abc123",
                "/work/app"
            ]
        );
        assert_eq!(build.working_dir, Some(PathBuf::from("/work/app")));

        let push = &stages[3];
        assert_eq!(
            &push.command[3..],
            &["push", "docker.io/dariomr8/app:latest"]
        );
    }

    #[test]
    fn test_build_without_revision_has_no_label() {
        let stages = stages(true, None);
        assert!(!stages[2].command.contains(&"--label".to_string()));
    }

    #[test]
    fn test_maven_container_uses_configured_docker() {
        let pipeline = BuildAndPushPipeline::new(BuildConfig {
            docker: "/opt/docker/bin/docker".to_string(),
            ..BuildConfig::default()
        });
        let stages = pipeline.stages(
            &request(),
            Path::new("/work/app"),
            Path::new("/tmp/docker-cfg"),
            None,
        );

        assert_eq!(&stages[0].command[..2], &["/opt/docker/bin/docker", "run"]);
        assert!(stages[1..]
            .iter()
            .all(|s| s.command[0] == "/opt/docker/bin/docker"));
    }

    #[test]
    fn test_parse_push_digest() {
        let stdout = "The push refers to repository [docker.io/dariomr8/app]\n\
                      5f70bf18a086: Pushed\n\
                      latest: digest: sha256:0123abcd size: 1570\n";
        assert_eq!(parse_push_digest(stdout), Some("sha256:0123abcd".to_string()));
        assert_eq!(parse_push_digest("nothing here"), None);
        assert_eq!(parse_push_digest("digest: md5:zz size: 1"), None);
    }

    #[tokio::test]
    async fn test_pinned_reference() {
        let mut image = PublishedImage {
            reference: "docker.io/dariomr8/app:latest".to_string(),
            digest: Some("sha256:0123".to_string()),
            run: CiPipeline::run(vec![]).await,
        };
        assert_eq!(
            image.pinned_reference(),
            "docker.io/dariomr8/app:latest@sha256:0123"
        );

        image.digest = None;
        assert_eq!(image.pinned_reference(), "docker.io/dariomr8/app:latest");
    }

    #[test]
    fn test_stage_error_mapping() {
        let pipeline = pipeline(true);
        let failed = |name: &str| StageResult {
            stage_name: name.to_string(),
            exit_code: 1,
            stdout: String::new(),
            stderr: "boom".to_string(),
            duration_ms: 1,
            success: false,
        };
        let reference = "docker.io/dariomr8/app:latest";

        assert!(matches!(
            pipeline.stage_error(&failed("maven_test"), reference),
            PipelineError::TestFailure(m) if m == "boom"
        ));
        assert!(matches!(
            pipeline.stage_error(&failed(REGISTRY_LOGIN_STAGE), reference),
            PipelineError::Authentication { registry, .. } if registry == "docker.io"
        ));
        assert!(matches!(
            pipeline.stage_error(&failed(DOCKER_BUILD_STAGE), reference),
            PipelineError::BuildFailure(_)
        ));
        assert!(matches!(
            pipeline.stage_error(&failed(DOCKER_PUSH_STAGE), reference),
            PipelineError::PushFailure { reference: r, .. } if r == reference
        ));
    }
}
