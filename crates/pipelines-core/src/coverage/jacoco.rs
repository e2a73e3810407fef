//! JaCoCo XML report parsing.
//!
//! Only LINE counters are read. A counter belongs to the element it is a
//! direct child of; deeper counters (class, method) are ignored, and the
//! first LINE counter of an element wins.

use crate::error::{PipelineError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Missed/covered line counts of one report element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineCounts {
    pub missed: u64,
    pub covered: u64,
}

impl LineCounts {
    pub fn new(missed: u64, covered: u64) -> Self {
        Self { missed, covered }
    }

    pub fn total(&self) -> u64 {
        self.missed.saturating_add(self.covered)
    }

    /// Covered share in percent; 0.0 when there are no lines.
    pub fn pct(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.covered as f64 * 100.0 / total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceFileCoverage {
    pub name: String,
    pub lines: LineCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageCoverage {
    /// Slash-separated package name as JaCoCo writes it.
    pub name: String,
    pub lines: LineCounts,
    pub source_files: Vec<SourceFileCoverage>,
}

/// Row of the per-package table.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRow {
    /// Dotted package name.
    pub name: String,
    pub lines: LineCounts,
}

/// A parsed JaCoCo report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub name: String,
    pub lines: LineCounts,
    pub packages: Vec<PackageCoverage>,
}

impl CoverageReport {
    /// Read and parse the report at `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::ReportNotFound(path.to_path_buf()));
        }
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut builder = ReportBuilder::default();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => builder.open(&e)?,
                Ok(Event::Empty(e)) => {
                    builder.open(&e)?;
                    builder.close();
                }
                Ok(Event::End(_)) => builder.close(),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(malformed(format!(
                        "XML error near byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        builder.finish()
    }

    /// LINE counts per source file, keyed `<package>/<file>` (or just
    /// `<file>` in the unnamed package). Later duplicates win.
    pub fn file_counters(&self) -> HashMap<String, LineCounts> {
        let mut counters = HashMap::new();
        for package in &self.packages {
            for file in &package.source_files {
                if file.name.is_empty() {
                    continue;
                }
                let key = if package.name.is_empty() {
                    file.name.clone()
                } else {
                    format!("{}/{}", package.name, file.name)
                };
                counters.insert(key, file.lines);
            }
        }
        counters
    }

    /// Packages with at least one line, dotted names, sorted by name.
    pub fn package_rows(&self) -> Vec<PackageRow> {
        let mut rows: Vec<PackageRow> = self
            .packages
            .iter()
            .filter(|p| p.lines.total() > 0)
            .map(|p| PackageRow {
                name: p.name.replace('/', "."),
                lines: p.lines,
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}

fn malformed(message: impl Into<String>) -> PipelineError {
    PipelineError::MalformedReport(message.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Report,
    Package,
    SourceFile,
    Other,
}

#[derive(Debug)]
struct Frame {
    scope: Scope,
    line_seen: bool,
}

#[derive(Debug, Default)]
struct ReportBuilder {
    report: Option<CoverageReport>,
    stack: Vec<Frame>,
}

impl ReportBuilder {
    fn open(&mut self, element: &BytesStart<'_>) -> Result<()> {
        let qname = element.name();
        let name = qname.as_ref();
        let parent = self.stack.last().map(|f| f.scope);

        let scope = match (parent, name) {
            (None, b"report") if self.report.is_none() => {
                self.report = Some(CoverageReport {
                    name: attribute(element, "name")?.unwrap_or_default(),
                    ..CoverageReport::default()
                });
                Scope::Report
            }
            (None, _) if self.report.is_some() => {
                return Err(malformed("unexpected element after </report>"));
            }
            (None, other) => {
                return Err(malformed(format!(
                    "expected <report> root element, found <{}>",
                    String::from_utf8_lossy(other)
                )));
            }
            (Some(Scope::Report), b"package") => {
                let package = PackageCoverage {
                    name: attribute(element, "name")?.unwrap_or_default(),
                    ..PackageCoverage::default()
                };
                self.report_mut()?.packages.push(package);
                Scope::Package
            }
            (Some(Scope::Package), b"sourcefile") => {
                let file = SourceFileCoverage {
                    name: attribute(element, "name")?.unwrap_or_default(),
                    lines: LineCounts::default(),
                };
                self.current_package()?.source_files.push(file);
                Scope::SourceFile
            }
            (Some(_), b"counter") => {
                self.apply_counter(element)?;
                Scope::Other
            }
            _ => Scope::Other,
        };

        self.stack.push(Frame {
            scope,
            line_seen: false,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.stack.pop();
    }

    fn finish(self) -> Result<CoverageReport> {
        if !self.stack.is_empty() {
            return Err(malformed("report is truncated (unclosed elements)"));
        }
        self.report
            .ok_or_else(|| malformed("document has no <report> element"))
    }

    fn apply_counter(&mut self, counter: &BytesStart<'_>) -> Result<()> {
        if attribute(counter, "type")?.as_deref() != Some("LINE") {
            return Ok(());
        }

        // Counters of classes, methods and repeated LINE counters are never read.
        let Some(parent) = self.stack.last_mut() else {
            return Ok(());
        };
        if parent.line_seen || parent.scope == Scope::Other {
            return Ok(());
        }
        parent.line_seen = true;

        let lines = LineCounts {
            missed: count(counter, "missed")?,
            covered: count(counter, "covered")?,
        };
        if lines.missed.checked_add(lines.covered).is_none() {
            return Err(malformed(format!(
                "LINE counter overflows: missed={} covered={}",
                lines.missed, lines.covered
            )));
        }

        match parent.scope {
            Scope::Report => self.report_mut()?.lines = lines,
            Scope::Package => self.current_package()?.lines = lines,
            Scope::SourceFile => {
                let package = self.current_package()?;
                if let Some(file) = package.source_files.last_mut() {
                    file.lines = lines;
                }
            }
            Scope::Other => {}
        }
        Ok(())
    }

    fn report_mut(&mut self) -> Result<&mut CoverageReport> {
        self.report
            .as_mut()
            .ok_or_else(|| malformed("element outside <report>"))
    }

    fn current_package(&mut self) -> Result<&mut PackageCoverage> {
        self.report_mut()?
            .packages
            .last_mut()
            .ok_or_else(|| malformed("element outside <package>"))
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    let attr = element
        .try_get_attribute(name)
        .map_err(|e| malformed(format!("bad attribute {name}: {e}")))?;
    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|e| malformed(format!("bad attribute {name}: {e}")))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

/// Missing or empty counts are 0; anything else must be a non-negative integer.
fn count(counter: &BytesStart<'_>, name: &str) -> Result<u64> {
    match attribute(counter, name)? {
        None => Ok(0),
        Some(raw) if raw.trim().is_empty() => Ok(0),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            malformed(format!("counter attribute {name}={raw:?} is not an integer"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = include_str!("../../tests/fixtures/jacoco.xml");

    #[test]
    fn test_line_counts_pct() {
        assert_eq!(LineCounts::new(13, 87).pct(), 87.0);
        assert_eq!(LineCounts::new(13, 87).total(), 100);
        assert_eq!(LineCounts::default().pct(), 0.0);
        assert_eq!(LineCounts::new(5, 0).pct(), 0.0);
    }

    #[test]
    fn test_parse_report_totals() {
        let report = CoverageReport::parse(HEAD).unwrap();
        assert_eq!(report.name, "app");
        assert_eq!(report.lines, LineCounts::new(13, 87));
        assert_eq!(report.packages.len(), 3);
    }

    #[test]
    fn test_parse_ignores_class_and_method_counters() {
        let report = CoverageReport::parse(HEAD).unwrap();
        let service = &report.packages[0];
        assert_eq!(service.name, "com/example/service");
        assert_eq!(service.lines, LineCounts::new(2, 8));
        assert_eq!(service.source_files.len(), 1);
        assert_eq!(service.source_files[0].name, "OrderService.java");
        assert_eq!(service.source_files[0].lines, LineCounts::new(2, 8));
    }

    #[test]
    fn test_file_counters_keys() {
        let report = CoverageReport::parse(HEAD).unwrap();
        let counters = report.file_counters();
        assert_eq!(
            counters.get("com/example/service/OrderService.java"),
            Some(&LineCounts::new(2, 8))
        );
        assert_eq!(
            counters.get("com/example/api/OrderController.java"),
            Some(&LineCounts::new(11, 79))
        );
        assert_eq!(counters.len(), 2);
    }

    #[test]
    fn test_file_counters_unnamed_package_and_duplicates() {
        let xml = r#"<report name="r">
            <package name="">
              <sourcefile name="Main.java"><counter type="LINE" missed="1" covered="1"/></sourcefile>
              <sourcefile name=""><counter type="LINE" missed="9" covered="9"/></sourcefile>
              <sourcefile name="Main.java"><counter type="LINE" missed="0" covered="4"/></sourcefile>
            </package>
        </report>"#;
        let counters = CoverageReport::parse(xml).unwrap().file_counters();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters.get("Main.java"), Some(&LineCounts::new(0, 4)));
    }

    #[test]
    fn test_package_rows_sorted_dotted_and_skip_empty() {
        let report = CoverageReport::parse(HEAD).unwrap();
        let rows = report.package_rows();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["com.example.api", "com.example.service"]);
    }

    #[test]
    fn test_first_line_counter_wins_and_missing_attributes_are_zero() {
        let xml = r#"<report>
            <counter type="LINE" covered="3"/>
            <counter type="LINE" missed="100" covered="100"/>
        </report>"#;
        let report = CoverageReport::parse(xml).unwrap();
        assert_eq!(report.lines, LineCounts::new(0, 3));
        assert_eq!(report.name, "");
    }

    #[test]
    fn test_report_without_line_counter_is_zero() {
        let report = CoverageReport::parse("<report name=\"x\"/>").unwrap();
        assert_eq!(report.lines, LineCounts::default());
        assert!(report.packages.is_empty());
    }

    #[test]
    fn test_packages_inside_groups_are_not_direct_children() {
        let xml = r#"<report>
            <group name="module-a">
              <package name="a"><counter type="LINE" missed="1" covered="1"/></package>
            </group>
        </report>"#;
        let report = CoverageReport::parse(xml).unwrap();
        assert!(report.packages.is_empty());
    }

    #[test]
    fn test_malformed_reports() {
        let cases = [
            "",
            "not xml at all",
            "<coverage line-rate=\"0.5\"/>",
            "<report><package name=\"a\">",
            "<report><counter type=\"LINE\" missed=\"x\" covered=\"1\"/></report>",
            "<report></package></report>",
            "<report/><report/>",
        ];
        for xml in cases {
            let err = CoverageReport::parse(xml).unwrap_err();
            assert!(
                matches!(err, PipelineError::MalformedReport(_)),
                "expected malformed error for {xml:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_overflowing_line_counter_is_malformed() {
        let xml = r#"<report>
  <counter type="LINE" missed="18446744073709551615" covered="1"/>
</report>"#;
        let err = CoverageReport::parse(xml).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedReport(m) if m.contains("overflows")));

        assert_eq!(LineCounts::new(u64::MAX, 1).total(), u64::MAX);
    }

    #[test]
    fn test_unread_counters_are_not_validated() {
        let xml = r#"<report>
  <package name="p">
    <class name="p/A">
      <method name="run" desc="()V">
        <counter type="LINE" missed="x" covered="y"/>
      </method>
      <counter type="LINE" missed="" covered="oops"/>
    </class>
    <counter type="LINE" missed="1" covered="3"/>
    <counter type="LINE" missed="bad" covered="bad"/>
  </package>
  <counter type="LINE" missed="1" covered="3"/>
</report>"#;
        let report = CoverageReport::parse(xml).unwrap();
        assert_eq!(report.packages[0].lines, LineCounts::new(1, 3));
        assert_eq!(report.lines, LineCounts::new(1, 3));
    }

    #[test]
    fn test_from_file_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacoco.xml");
        let err = CoverageReport::from_file(&path).unwrap_err();
        assert!(matches!(err, PipelineError::ReportNotFound(p) if p == path));
    }

    #[test]
    fn test_from_file_reads_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacoco.xml");
        std::fs::write(&path, HEAD).unwrap();
        let report = CoverageReport::from_file(&path).unwrap();
        assert_eq!(report.lines.covered, 87);
    }
}
