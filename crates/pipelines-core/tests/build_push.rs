//! Build-and-push pipeline against a scripted docker CLI.
#![cfg(unix)]

use pipelines_core::{
    BuildAndPushPipeline, BuildConfig, BuildRequest, MavenRuntime, PipelineError,
    RegistryCredentials,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const VALID_TOKEN: &str = "dckr_pat_valid";

/// Records its arguments and mimics `docker login/build/push`.
const FAKE_DOCKER: &str = r##"#!/bin/sh
echo "$*" >> "$FAKE_DOCKER_LOG"
shift 2
case "$1" in
  login)
    read -r token
    if [ "$token" != "dckr_pat_valid" ]; then
      echo "Error response from daemon: unauthorized: incorrect username or password" >&2
      exit 1
    fi
    echo "Login Succeeded"
    ;;
  build)
    echo "#8 naming to docker.io/dariomr8/app:latest done"
    ;;
  push)
    echo "The push refers to repository [docker.io/dariomr8/app]"
    echo "5f70bf18a086: Pushed"
    echo "latest: digest: sha256:4f3c2b1a size: 1570"
    ;;
esac
"##;

struct Harness {
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("Dockerfile"), "FROM scratch\n").unwrap();

        let log = dir.path().join("docker.log");
        let script = dir.path().join("docker");
        std::fs::write(
            &script,
            FAKE_DOCKER.replace("$FAKE_DOCKER_LOG", &log.display().to_string()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir }
    }

    fn source(&self) -> PathBuf {
        self.dir.path().join("app")
    }

    fn config(&self) -> BuildConfig {
        BuildConfig {
            source_dir: self.source(),
            docker: self.dir.path().join("docker").display().to_string(),
            run_tests: false,
            maven: MavenRuntime::Local,
            stage_timeout_secs: 30,
            ..BuildConfig::default()
        }
    }

    fn docker_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("docker.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn request(token: &str) -> BuildRequest {
    let creds = RegistryCredentials::new("dariomr8", token).unwrap();
    BuildRequest::new("dariomr8/app:latest", creds).unwrap()
}

fn subcommand(call: &str) -> &str {
    call.split_whitespace().nth(2).unwrap_or_default()
}

/// Test: valid credentials push the image under docker.io/<name>
#[tokio::test]
async fn test_push_under_default_registry() {
    let harness = Harness::new();
    let pipeline = BuildAndPushPipeline::new(harness.config());

    let published = pipeline.run(request(VALID_TOKEN)).await.unwrap();

    assert_eq!(published.reference, "docker.io/dariomr8/app:latest");
    assert_eq!(published.digest.as_deref(), Some("sha256:4f3c2b1a"));
    assert_eq!(
        published.pinned_reference(),
        "docker.io/dariomr8/app:latest@sha256:4f3c2b1a"
    );
    assert!(published.run.success);

    let calls = harness.docker_calls();
    let order: Vec<&str> = calls.iter().map(|c| subcommand(c)).collect();
    assert_eq!(order, vec!["login", "build", "push"]);
    assert!(calls[1].contains("--platform linux/arm64"));
    assert!(calls[1].contains("--tag docker.io/dariomr8/app:latest"));
    assert!(calls[2].ends_with("push docker.io/dariomr8/app:latest"));
}

/// Test: rejected credentials fail before anything is built or pushed
#[tokio::test]
async fn test_invalid_credentials_fail_before_push() {
    let harness = Harness::new();
    let pipeline = BuildAndPushPipeline::new(harness.config());

    let err = pipeline.run(request("dckr_pat_revoked")).await.unwrap_err();

    match err {
        PipelineError::Authentication { registry, message } => {
            assert_eq!(registry, "docker.io");
            assert!(message.contains("unauthorized"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let calls = harness.docker_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(subcommand(&calls[0]), "login");
}

/// Test: the token is only ever passed on stdin
#[tokio::test]
async fn test_token_never_in_arguments() {
    let harness = Harness::new();
    let pipeline = BuildAndPushPipeline::new(harness.config());

    pipeline.run(request(VALID_TOKEN)).await.unwrap();

    let calls = harness.docker_calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|c| !c.contains(VALID_TOKEN)));
    assert!(calls[0].contains("--password-stdin"));
}

/// Test: the login goes to a throwaway docker config
#[tokio::test]
async fn test_login_uses_isolated_docker_config() {
    let harness = Harness::new();
    let pipeline = BuildAndPushPipeline::new(harness.config());

    pipeline.run(request(VALID_TOKEN)).await.unwrap();

    let calls = harness.docker_calls();
    let config_dir = calls[0].split_whitespace().nth(1).unwrap().to_string();
    assert!(calls
        .iter()
        .all(|c| c.split_whitespace().nth(1) == Some(config_dir.as_str())));
    assert!(!Path::new(&config_dir).exists(), "config dir removed after run");
}

/// Test: failing tests stop the pipeline before docker is invoked
#[tokio::test]
async fn test_failed_tests_block_build() {
    let harness = Harness::new();
    let pipeline = BuildAndPushPipeline::new(BuildConfig {
        run_tests: true,
        ..harness.config()
    });

    // No Maven project in the source tree, so `mvn test` cannot pass.
    let err = pipeline.run(request(VALID_TOKEN)).await.unwrap_err();

    assert!(matches!(err, PipelineError::TestFailure(_)));
    assert!(harness.docker_calls().is_empty());
}

/// Test: a missing source tree is rejected up front
#[tokio::test]
async fn test_missing_source_dir() {
    let harness = Harness::new();
    let pipeline = BuildAndPushPipeline::new(BuildConfig {
        source_dir: harness.dir.path().join("nope"),
        ..harness.config()
    });

    let err = pipeline.run(request(VALID_TOKEN)).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert!(harness.docker_calls().is_empty());
}
