//! Markdown rendering of the coverage comment.

use super::jacoco::{CoverageReport, LineCounts};

/// Hidden marker identifying the comment this pipeline owns.
pub const COVERAGE_COMMENT_MARKER: &str = "<!-- ci-pipelines:coverage-comment -->";

/// Maximum number of rows in the changed-files table.
pub const MAX_CHANGED_FILES_ROWS: usize = 50;

/// Source roots stripped from changed paths, in lookup order.
const SOURCE_ROOTS: [&str; 4] = [
    "src/main/java/",
    "src/main/kotlin/",
    "src/test/java/",
    "src/test/kotlin/",
];

/// Comparison of the head report against the pull request's base.
#[derive(Debug, Clone, Default)]
pub struct BaseComparison {
    /// Base branch report; `None` when it could not be produced.
    pub base: Option<CoverageReport>,
    /// Paths changed by the pull request, one per entry.
    pub changed_files: Vec<String>,
}

impl BaseComparison {
    /// Build from newline-separated changed paths.
    pub fn from_lines(base: Option<CoverageReport>, changed_files: &str) -> Self {
        Self {
            base,
            changed_files: changed_files.lines().map(str::to_string).collect(),
        }
    }

    fn changed_paths(&self) -> Vec<&str> {
        self.changed_files
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

/// Map a repository path to its JaCoCo `<package>/<file>` key.
///
/// Returns `None` for paths outside the Maven/Gradle source roots.
pub fn changed_path_to_jacoco_key(path: &str) -> Option<&str> {
    let normalized = path.trim().trim_start_matches(['.', '/']);
    if normalized.is_empty() {
        return None;
    }

    SOURCE_ROOTS.iter().find_map(|root| {
        normalized
            .find(root)
            .map(|idx| &normalized[idx + root.len()..])
    })
}

/// Render the full comment body.
///
/// The changed-files section appears only when a comparison is given and
/// it lists at least one non-blank path.
pub fn render_coverage_markdown(
    head: &CoverageReport,
    comparison: Option<&BaseComparison>,
) -> String {
    let mut lines: Vec<String> = vec![COVERAGE_COMMENT_MARKER.to_string()];

    if let Some(comparison) = comparison {
        if !comparison.changed_paths().is_empty() {
            lines.extend(render_changed_files_section(head, comparison));
        }
    }

    let total = head.lines;
    lines.extend([
        String::new(),
        "## ☂️ Coverage details".to_string(),
        String::new(),
        "<details>".to_string(),
        "<summary>Show details</summary>".to_string(),
        String::new(),
        format!(
            "**Total line coverage:** {:.2}% ({}/{} lines)",
            total.pct(),
            total.covered,
            total.total()
        ),
        String::new(),
    ]);
    lines.extend(render_package_table(head));
    lines.extend([String::new(), "</details>".to_string()]);

    let mut markdown = lines.join("\n");
    markdown.push('\n');
    markdown
}

fn render_package_table(report: &CoverageReport) -> Vec<String> {
    let mut lines = vec![
        "| Package | Line coverage |".to_string(),
        "| ------- | ------------- |".to_string(),
    ];
    for row in report.package_rows() {
        lines.push(format!(
            "| `{}` | {:.2}% ({}/{}) |",
            row.name,
            row.lines.pct(),
            row.lines.covered,
            row.lines.total()
        ));
    }
    lines
}

fn render_changed_files_section(head: &CoverageReport, comparison: &BaseComparison) -> Vec<String> {
    let head_files = head.file_counters();
    let base_files = comparison
        .base
        .as_ref()
        .map(CoverageReport::file_counters)
        .unwrap_or_default();

    let mut changed: Vec<(&str, &str)> = comparison
        .changed_paths()
        .into_iter()
        .filter_map(|path| changed_path_to_jacoco_key(path).map(|key| (path, key)))
        .collect();
    changed.sort_by(|a, b| a.0.cmp(b.0));

    let mut rows: Vec<String> = changed
        .into_iter()
        .filter_map(|(path, key)| {
            let head_counts = head_files.get(key)?;
            let label = match base_files.get(key) {
                Some(base_counts) => delta_label(head_counts, base_counts),
                None => format!("{:.2}% (n/a)", head_counts.pct()),
            };
            Some(format!("| `{path}` | {label} |"))
        })
        .collect();

    let omitted = rows.len().saturating_sub(MAX_CHANGED_FILES_ROWS);
    rows.truncate(MAX_CHANGED_FILES_ROWS);

    let total_pct = head.lines.pct();
    let total_label = match &comparison.base {
        Some(base) => {
            let delta = total_pct - base.lines.pct();
            format!("{} {:+.2}%", indicator(delta), delta)
        }
        None => "n/a".to_string(),
    };

    let mut lines = vec![
        String::new(),
        "## 🔍 Changed files coverage".to_string(),
        String::new(),
        format!("Total coverage: {total_pct:.2}% ({total_label})"),
        String::new(),
    ];

    if !rows.is_empty() {
        lines.push("| File | Line coverage |".to_string());
        lines.push("| ---- | ------------- |".to_string());
        lines.extend(rows);
    }

    if omitted > 0 {
        lines.push(String::new());
        lines.push(format!("_Table truncated: {omitted} more files omitted._"));
    }

    lines
}

fn delta_label(head: &LineCounts, base: &LineCounts) -> String {
    let delta = head.pct() - base.pct();
    format!("{:.2}% ({} {:+.2}%)", head.pct(), indicator(delta), delta)
}

fn indicator(delta: f64) -> &'static str {
    if delta >= 0.0 {
        "🟢"
    } else {
        "🔴"
    }
}
