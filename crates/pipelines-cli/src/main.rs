//! ci-pipelines - reusable CI pipelines for Java services
//!
//! ## Commands
//!
//! - `test`: Run the Maven test suite of a checkout
//! - `build-and-push`: Test, build and push a container image
//! - `coverage markdown`: Render the JaCoCo coverage comment
//! - `coverage comment`: Create or update the coverage comment on a pull request

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use pipelines_ci::PipelineResult;
use pipelines_core::{
    BuildAndPushPipeline, BuildConfig, BuildRequest, ChangedFiles, ComparisonInput,
    CoverageConfig, CoveragePipeline, CoverageRequest, GitHubClient, GitHubConfig, MavenRuntime,
    RegistryCredentials, Repository, Secret, UpsertOutcome, DEFAULT_DOCKERFILE,
    DEFAULT_GITHUB_API_URL, DEFAULT_PLATFORM, DEFAULT_REGISTRY, DEFAULT_REPORT_PATH,
};

#[derive(Parser)]
#[command(name = "ci-pipelines")]
#[command(author = "dariomr8")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reusable build-and-push and Java coverage pipelines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run `mvn test` against a checkout
    Test {
        /// Checked-out source tree
        #[arg(long, default_value = ".")]
        source: PathBuf,

        /// Use the runner's `mvn` instead of the Maven build container
        #[arg(long)]
        no_container: bool,

        /// Stage timeout in seconds (0 = none)
        #[arg(long, default_value = "0")]
        timeout: u64,
    },

    /// Test, build and push a container image
    BuildAndPush(BuildArgs),

    /// JaCoCo coverage summaries
    Coverage {
        #[command(subcommand)]
        action: CoverageAction,
    },
}

#[derive(Args)]
struct BuildArgs {
    /// Image name and tag, e.g. `dariomr8/app:latest`
    #[arg(long)]
    image_name: String,

    /// Registry username
    #[arg(long, env = "DOCKERHUB_USERNAME")]
    username: Option<String>,

    /// Registry access token
    #[arg(long, env = "DOCKERHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Checked-out source tree (the build context)
    #[arg(long, default_value = ".")]
    source: PathBuf,

    #[arg(long, default_value = DEFAULT_REGISTRY)]
    registry: String,

    #[arg(long, default_value = DEFAULT_PLATFORM)]
    platform: String,

    /// Dockerfile, relative to the source tree
    #[arg(long, default_value = DEFAULT_DOCKERFILE)]
    dockerfile: PathBuf,

    /// Skip the Maven test stage
    #[arg(long)]
    skip_tests: bool,

    /// Use the runner's `mvn` instead of the Maven build container
    #[arg(long)]
    no_container: bool,

    /// Docker CLI executable
    #[arg(long, default_value = "docker")]
    docker: String,

    /// Per-stage timeout in seconds (0 = none)
    #[arg(long, default_value = "0")]
    timeout: u64,
}

#[derive(Subcommand)]
enum CoverageAction {
    /// Print the coverage comment as markdown
    Markdown {
        #[command(flatten)]
        report: ReportArgs,

        /// Write the markdown to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create or update the coverage comment on a pull request
    Comment {
        /// Pull request to comment on (`42` or `#42`)
        #[arg(long)]
        pull_request_number: String,

        #[command(flatten)]
        report: ReportArgs,

        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// Repository as `owner/name`
        #[arg(long, env = "GITHUB_REPOSITORY")]
        github_repository: Option<String>,

        #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_GITHUB_API_URL)]
        github_api_url: String,
    },
}

#[derive(Args)]
struct ReportArgs {
    /// Checked-out source tree
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// JaCoCo XML report, relative to the source tree
    #[arg(long, default_value = DEFAULT_REPORT_PATH)]
    report: PathBuf,

    /// Run `mvn verify -Pcoverage` before reading the report
    #[arg(long)]
    build: bool,

    /// Use the runner's `mvn` instead of the Maven build container
    #[arg(long)]
    no_container: bool,

    /// JaCoCo XML report of the base branch
    #[arg(long)]
    base_report: Option<PathBuf>,

    /// File listing the pull request's changed paths, one per line
    #[arg(long, conflicts_with = "base_ref")]
    changed_files: Option<PathBuf>,

    /// Compute changed paths with `git diff <ref>...HEAD`
    #[arg(long)]
    base_ref: Option<String>,

    /// Per-stage timeout in seconds (0 = none)
    #[arg(long, default_value = "0")]
    timeout: u64,
}

impl ReportArgs {
    fn config(&self) -> CoverageConfig {
        CoverageConfig {
            source_dir: self.source.clone(),
            report_path: self.report.clone(),
            build: self.build,
            maven: maven_runtime(self.no_container),
            stage_timeout_secs: self.timeout,
        }
    }

    /// The changed-files section is only rendered when a change source is given.
    fn comparison(&self) -> Result<Option<ComparisonInput>> {
        let changed_files = match (&self.changed_files, &self.base_ref) {
            (Some(path), _) => {
                let listing = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read changed files from {:?}", path))?;
                ChangedFiles::Listed(listing.lines().map(str::to_string).collect())
            }
            (None, Some(base_ref)) => ChangedFiles::SinceRef(base_ref.clone()),
            (None, None) => return Ok(None),
        };

        Ok(Some(ComparisonInput {
            base_report: self.base_report.clone(),
            changed_files,
        }))
    }
}

fn maven_runtime(no_container: bool) -> MavenRuntime {
    if no_container {
        MavenRuntime::Local
    } else {
        MavenRuntime::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pipelines_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Test {
            source,
            no_container,
            timeout,
        } => cmd_test(&source, no_container, timeout).await,
        Commands::BuildAndPush(args) => cmd_build_and_push(args).await,
        Commands::Coverage { action } => match action {
            CoverageAction::Markdown { report, output } => {
                cmd_coverage_markdown(&report, output.as_deref()).await
            }
            CoverageAction::Comment {
                pull_request_number,
                report,
                github_token,
                github_repository,
                github_api_url,
            } => {
                let github = github_config(
                    &github_api_url,
                    github_repository.as_deref(),
                    github_token,
                )?;
                cmd_coverage_comment(&pull_request_number, &report, github).await
            }
        },
    }
}

async fn cmd_test(source: &Path, no_container: bool, timeout: u64) -> Result<()> {
    let pipeline = BuildAndPushPipeline::new(BuildConfig {
        source_dir: source.to_path_buf(),
        maven: maven_runtime(no_container),
        stage_timeout_secs: timeout,
        ..BuildConfig::default()
    });

    let result = pipeline.test().await.context("Maven tests failed")?;
    print_stages(&result);
    Ok(())
}

async fn cmd_build_and_push(args: BuildArgs) -> Result<()> {
    // Validate everything before any stage runs.
    let credentials = RegistryCredentials::new(
        args.username.unwrap_or_default(),
        Secret::new(args.token.unwrap_or_default()),
    )
    .context("Registry credentials are missing (set DOCKERHUB_USERNAME and DOCKERHUB_TOKEN)")?;
    let request = BuildRequest::new(args.image_name, credentials)?;

    let pipeline = BuildAndPushPipeline::new(BuildConfig {
        source_dir: args.source,
        docker: args.docker,
        registry: args.registry,
        platform: args.platform,
        dockerfile: args.dockerfile,
        run_tests: !args.skip_tests,
        maven: maven_runtime(args.no_container),
        stage_timeout_secs: args.timeout,
    });

    let published = pipeline
        .run(request)
        .await
        .context("Build-and-push pipeline failed")?;

    print_stages(&published.run);
    println!();
    println!("Pushed: {}", published.pinned_reference());
    Ok(())
}

async fn cmd_coverage_markdown(report: &ReportArgs, output: Option<&Path>) -> Result<()> {
    let pipeline = CoveragePipeline::new(report.config());
    let comparison = report.comparison()?;

    let rendered = pipeline
        .prepare(comparison.as_ref())
        .await
        .context("Failed to render coverage summary")?;

    match output {
        Some(path) => {
            std::fs::write(path, &rendered.markdown)
                .with_context(|| format!("Failed to write markdown to {:?}", path))?;
            info!(path = %path.display(), "Wrote coverage markdown");
        }
        None => print!("{}", rendered.markdown),
    }
    Ok(())
}

async fn cmd_coverage_comment(
    pull_request_number: &str,
    report: &ReportArgs,
    github: GitHubConfig,
) -> Result<()> {
    let request = CoverageRequest::parse(pull_request_number)?;
    let comparison = report.comparison()?;
    let client = GitHubClient::new(github).context("Failed to create GitHub client")?;
    let pipeline = CoveragePipeline::new(report.config());

    let outcome = pipeline
        .run(request, comparison.as_ref(), &client)
        .await
        .context("Coverage pipeline failed")?;

    let action = match outcome.comment {
        UpsertOutcome::Created { .. } => "created",
        UpsertOutcome::Updated { .. } => "updated",
        UpsertOutcome::Unchanged { .. } => "unchanged",
    };
    println!(
        "Coverage {:.2}% ({}/{} lines)",
        outcome.total.pct(),
        outcome.total.covered,
        outcome.total.total()
    );
    println!(
        "Comment {} on PR #{}: {}",
        outcome.comment.id(),
        outcome.pull_request,
        action
    );
    Ok(())
}

fn github_config(
    api_url: &str,
    repository: Option<&str>,
    token: Option<String>,
) -> Result<GitHubConfig> {
    let repository = repository.context("GITHUB_REPOSITORY is not set")?;
    let token = token.context("GITHUB_TOKEN is not set")?;
    Ok(GitHubConfig::new(
        api_url,
        Repository::parse(repository)?,
        Secret::new(token),
    )?)
}

fn print_stages(result: &PipelineResult) {
    println!("Run ID: {}", result.run_id);
    println!("Status: {}", if result.success { "✓ PASSED" } else { "✗ FAILED" });
    println!("Duration: {}ms", result.duration_ms);
    println!();

    for stage_result in &result.stages {
        let status = if stage_result.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, stage_result.stage_name, stage_result.duration_ms, stage_result.exit_code
        );
    }
    if let Ok(json) = serde_json::to_string(result) {
        tracing::debug!(result = %json, "Pipeline result");
    }
}
