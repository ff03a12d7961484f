//! Batch results: accumulation, summary, export

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::verdict::{OverallStatus, Verdict};

/// Exit code when every data point met its declared expectations
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code when at least one data point failed or errored
pub const EXIT_FAILURE: i32 = 1;

/// Counts plus one line per data point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub error_count: usize,
    /// Sorted by instance id, then status
    pub entries: Vec<(String, OverallStatus)>,
}

impl BatchSummary {
    pub fn pass_rate(&self) -> f64 {
        if self.total > 0 {
            self.pass_count as f64 / self.total as f64
        } else {
            0.0
        }
    }

    pub fn all_passed(&self) -> bool {
        self.fail_count == 0 && self.error_count == 0
    }

    /// ERROR over FAIL over PASS
    pub fn worst_status(&self) -> OverallStatus {
        if self.error_count > 0 {
            OverallStatus::Error
        } else if self.fail_count > 0 {
            OverallStatus::Fail
        } else {
            OverallStatus::Pass
        }
    }
}

/// Collects verdicts from any number of concurrent validations.
#[derive(Default)]
pub struct ResultReporter {
    verdicts: Mutex<Vec<Verdict>>,
}

impl ResultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one verdict
    pub fn accumulate(&self, verdict: Verdict) {
        self.verdicts.lock().push(verdict);
    }

    pub fn len(&self) -> usize {
        self.verdicts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accumulated verdicts in a stable order: instance id, status, error,
    /// then evaluation time
    pub fn verdicts(&self) -> Vec<Verdict> {
        let mut verdicts = self.verdicts.lock().clone();
        verdicts.sort_by(|a, b| {
            a.instance_id
                .cmp(&b.instance_id)
                .then(a.overall_status.cmp(&b.overall_status))
                .then_with(|| a.error.cmp(&b.error))
                .then_with(|| a.evaluated_at.cmp(&b.evaluated_at))
        });
        verdicts
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for verdict in self.verdicts.lock().iter() {
            summary.total += 1;
            match verdict.overall_status {
                OverallStatus::Pass => summary.pass_count += 1,
                OverallStatus::Fail => summary.fail_count += 1,
                OverallStatus::Error => summary.error_count += 1,
            }
            summary
                .entries
                .push((verdict.instance_id.clone(), verdict.overall_status));
        }
        summary.entries.sort();
        summary
    }

    /// Process exit code for the batch
    pub fn finalize(&self) -> i32 {
        if self.summary().all_passed() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    /// Exit code for a whole run. A run that validated nothing, or was
    /// cancelled, never counts as a success.
    pub fn finalize_run(&self, cancelled: bool) -> i32 {
        if cancelled || self.is_empty() {
            EXIT_FAILURE
        } else {
            self.finalize()
        }
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        out.push_str(&format!("{}\n", "=".repeat(70)));
        out.push_str("DATA POINT VALIDATION REPORT\n");
        out.push_str(&format!("{}\n", "=".repeat(70)));
        out.push_str(&format!("Total:   {}\n", summary.total));
        out.push_str(&format!(
            "Passed:  {} ({:.1}%)\n",
            summary.pass_count,
            summary.pass_rate() * 100.0
        ));
        out.push_str(&format!("Failed:  {}\n", summary.fail_count));
        out.push_str(&format!("Errors:  {}\n", summary.error_count));

        let verdicts = self.verdicts();
        if !verdicts.is_empty() {
            out.push_str("\n--- Data Points ---\n");
        }
        for verdict in &verdicts {
            out.push_str(&format!(
                "{:<6} {}\n",
                verdict.overall_status,
                verdict.instance_id
            ));
            if let Some(error) = &verdict.error {
                out.push_str(&format!("       error: {}\n", error));
            }
            for (test, outcome) in verdict.unmet_tests() {
                out.push_str(&format!("       {:<8} {}\n", outcome.to_string(), test));
            }
        }

        out.push_str(&format!("{}\n", "=".repeat(70)));
        out
    }
}

/// Exported form of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub summary: BatchSummary,
    pub verdicts: Vec<Verdict>,
}

impl BatchReport {
    pub fn from_reporter(reporter: &ResultReporter) -> Self {
        Self {
            generated_at: Utc::now(),
            summary: reporter.summary(),
            verdicts: reporter.verdicts(),
        }
    }
}

/// Writes batch reports to an output directory
pub struct ResultExporter {
    output_dir: PathBuf,
}

impl ResultExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Export results to JSON
    pub fn export_json(&self, report: &BatchReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("validation.json");
        std::fs::write(&path, serde_json::to_string_pretty(report)?)?;

        info!("Exported JSON results to {:?}", path);
        Ok(path)
    }

    /// Export results to Markdown
    pub fn export_markdown(&self, report: &BatchReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("validation.md");
        let s = &report.summary;
        let mut md = String::new();

        md.push_str("# Data Point Validation\n\n");
        md.push_str(&format!("Generated: {}\n\n", report.generated_at));
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Total | {} |\n", s.total));
        md.push_str(&format!(
            "| Passed | {} ({:.1}%) |\n",
            s.pass_count,
            s.pass_rate() * 100.0
        ));
        md.push_str(&format!("| Failed | {} |\n", s.fail_count));
        md.push_str(&format!("| Errors | {} |\n\n", s.error_count));

        md.push_str("| Instance | Status | Unmet tests | Error |\n");
        md.push_str("|----------|--------|-------------|-------|\n");
        for verdict in &report.verdicts {
            let unmet: Vec<String> = verdict
                .unmet_tests()
                .into_iter()
                .map(|(test, outcome)| format!("`{}` {}", md_cell(test), outcome))
                .collect();
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                md_cell(&verdict.instance_id),
                verdict.overall_status,
                unmet.join("<br>"),
                md_cell(verdict.error.as_deref().unwrap_or(""))
            ));
        }

        std::fs::write(&path, md)?;

        info!("Exported Markdown results to {:?}", path);
        Ok(path)
    }

    /// Export all formats
    pub fn export_all(&self, report: &BatchReport) -> Result<Vec<PathBuf>> {
        Ok(vec![self.export_json(report)?, self.export_markdown(report)?])
    }
}

/// Escape a value for a Markdown table cell
fn md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Print the report to stdout
pub fn print_summary(reporter: &ResultReporter) {
    print!("\n{}", reporter.render());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::TestOutcome;
    use indexmap::{IndexMap, IndexSet};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn verdict(id: &str, status: OverallStatus) -> Verdict {
        let mut f2p = IndexMap::new();
        f2p.insert(
            "test_a".to_string(),
            if status == OverallStatus::Pass {
                TestOutcome::Passed
            } else {
                TestOutcome::Failed
            },
        );
        Verdict {
            instance_id: id.to_string(),
            overall_status: status,
            fail_to_pass_results: f2p,
            pass_to_pass_results: IndexMap::new(),
            missing_tests: IndexSet::new(),
            error: (status == OverallStatus::Error).then(|| "timeout after 1800s".to_string()),
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_counts_add_up() {
        let reporter = ResultReporter::new();
        reporter.accumulate(verdict("a", OverallStatus::Pass));
        reporter.accumulate(verdict("b", OverallStatus::Fail));
        reporter.accumulate(verdict("c", OverallStatus::Error));
        reporter.accumulate(verdict("d", OverallStatus::Pass));

        let s = reporter.summary();
        assert_eq!(s.total, 4);
        assert_eq!(s.pass_count, 2);
        assert_eq!(s.fail_count, 1);
        assert_eq!(s.error_count, 1);
        assert_eq!(s.pass_count + s.fail_count + s.error_count, s.total);
        assert!((s.pass_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.worst_status(), OverallStatus::Error);
    }

    #[test]
    fn test_finalize_exit_codes() {
        let reporter = ResultReporter::new();
        assert_eq!(reporter.finalize(), EXIT_SUCCESS);

        reporter.accumulate(verdict("a", OverallStatus::Pass));
        assert_eq!(reporter.finalize(), EXIT_SUCCESS);

        reporter.accumulate(verdict("b", OverallStatus::Error));
        assert_eq!(reporter.finalize(), EXIT_FAILURE);

        let failing = ResultReporter::new();
        failing.accumulate(verdict("c", OverallStatus::Fail));
        assert_eq!(failing.finalize(), EXIT_FAILURE);
    }

    #[test]
    fn test_summary_independent_of_accumulation_order() {
        let forward = ResultReporter::new();
        let backward = ResultReporter::new();
        let items = vec![
            verdict("x", OverallStatus::Fail),
            verdict("a", OverallStatus::Pass),
            verdict("m", OverallStatus::Error),
        ];
        for v in items.iter().cloned() {
            forward.accumulate(v);
        }
        for v in items.into_iter().rev() {
            backward.accumulate(v);
        }
        assert_eq!(forward.summary(), backward.summary());
        assert_eq!(forward.finalize(), backward.finalize());
        assert_eq!(forward.summary().entries[0].0, "a");
    }

    #[test]
    fn test_concurrent_accumulation() {
        let reporter = Arc::new(ResultReporter::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reporter = Arc::clone(&reporter);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let status = if i % 5 == 0 {
                            OverallStatus::Fail
                        } else {
                            OverallStatus::Pass
                        };
                        reporter.accumulate(verdict(&format!("t{}-{}", t, i), status));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let s = reporter.summary();
        assert_eq!(s.total, 200);
        assert_eq!(s.fail_count, 40);
        assert_eq!(s.pass_count, 160);
    }

    #[test]
    fn test_render_lists_unmet_tests_and_errors() {
        let reporter = ResultReporter::new();
        reporter.accumulate(verdict("django__django-1", OverallStatus::Fail));
        reporter.accumulate(verdict("flask__flask-2", OverallStatus::Error));

        let text = reporter.render();
        assert!(text.contains("Total:   2"));
        assert!(text.contains("FAIL   django__django-1"));
        assert!(text.contains("FAILED   test_a"));
        assert!(text.contains("error: timeout after 1800s"));
    }

    #[test]
    fn test_export_all() {
        let dir = tempdir().unwrap();
        let reporter = ResultReporter::new();
        reporter.accumulate(verdict("a", OverallStatus::Pass));
        reporter.accumulate(verdict("b", OverallStatus::Fail));

        let exporter = ResultExporter::new(dir.path().join("out"));
        let paths = exporter
            .export_all(&BatchReport::from_reporter(&reporter))
            .unwrap();
        assert_eq!(paths.len(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["verdicts"][1]["overall_status"], "FAIL");

        let md = std::fs::read_to_string(&paths[1]).unwrap();
        assert!(md.contains("| b | FAIL | `test_a` FAILED |"));
    }

    #[test]
    fn test_empty_or_cancelled_run_fails() {
        let reporter = ResultReporter::new();
        assert_eq!(reporter.finalize_run(false), EXIT_FAILURE);

        reporter.accumulate(verdict("a", OverallStatus::Pass));
        assert_eq!(reporter.finalize_run(false), EXIT_SUCCESS);
        assert_eq!(reporter.finalize_run(true), EXIT_FAILURE);
    }

    #[test]
    fn test_duplicate_ids_sort_deterministically() {
        let mut first = verdict("dup", OverallStatus::Error);
        first.error = Some("container crashed".to_string());
        let mut second = verdict("dup", OverallStatus::Error);
        second.error = Some("timeout after 1800s".to_string());

        let forward = ResultReporter::new();
        forward.accumulate(first.clone());
        forward.accumulate(second.clone());
        let backward = ResultReporter::new();
        backward.accumulate(second);
        backward.accumulate(first);

        assert_eq!(forward.verdicts(), backward.verdicts());
        assert_eq!(
            forward.verdicts()[0].error.as_deref(),
            Some("container crashed")
        );
        assert_eq!(forward.render(), backward.render());
    }

    #[test]
    fn test_markdown_escapes_pipes_in_ids() {
        let dir = tempdir().unwrap();
        let mut v = verdict("org|repo-1", OverallStatus::Fail);
        v.fail_to_pass_results.clear();
        v.fail_to_pass_results
            .insert("test_x[a|b]".to_string(), TestOutcome::Failed);
        let reporter = ResultReporter::new();
        reporter.accumulate(v);

        let path = ResultExporter::new(dir.path())
            .export_markdown(&BatchReport::from_reporter(&reporter))
            .unwrap();
        let md = std::fs::read_to_string(path).unwrap();
        assert!(md.contains("| org\\|repo-1 | FAIL | `test_x[a\\|b]` FAILED |"));
    }
}
