//! Pipelines CI - sequential stage execution
//!
//! Provides the execution layer shared by the build-and-push and coverage
//! pipelines:
//! - Builtin Maven stages, optionally wrapped in a build container
//! - A subprocess runner with secret stdin and timeouts
//! - A fail-fast pipeline that stops at the first failing stage

pub mod pipeline;
pub mod runner;
pub mod secret;
pub mod stage;

// Re-export key types
pub use pipeline::{CiPipeline, PipelineResult};
pub use runner::{CiRunner, StageResult};
pub use secret::Secret;
pub use stage::{BuiltinStage, ContainerSpec, StageConfig};
