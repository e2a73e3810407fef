//! Java coverage: JaCoCo parsing, comment rendering and the coverage pipeline.

pub mod jacoco;
pub mod markdown;
pub mod pipeline;

pub use jacoco::{CoverageReport, LineCounts, PackageCoverage, PackageRow, SourceFileCoverage};
pub use markdown::{
    changed_path_to_jacoco_key, render_coverage_markdown, BaseComparison,
    COVERAGE_COMMENT_MARKER, MAX_CHANGED_FILES_ROWS,
};
pub use pipeline::{
    ChangedFiles, ComparisonInput, CoverageOutcome, CoveragePipeline, RenderedCoverage,
};
