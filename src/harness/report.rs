//! SWE-bench harness report parsing

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::ExecutionResponse;
use crate::verdict::TestOutcome;

/// Log written by the harness next to `report.json`
pub const TEST_OUTPUT_FILE: &str = "test_output.txt";

/// Per-instance entry of a harness `report.json`
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessReport {
    #[serde(default)]
    pub patch_is_none: Option<bool>,
    #[serde(default)]
    pub patch_exists: Option<bool>,
    #[serde(default)]
    pub patch_successfully_applied: Option<bool>,
    #[serde(default)]
    pub resolved: bool,
    /// Bucket (FAIL_TO_PASS, PASS_TO_PASS, FAIL_TO_FAIL, PASS_TO_FAIL)
    /// → success/failure lists
    #[serde(default)]
    pub tests_status: IndexMap<String, BucketStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketStatus {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failure: Vec<String>,
}

impl HarnessReport {
    /// Flatten every bucket into a test → outcome map
    pub fn outcomes(&self) -> IndexMap<String, TestOutcome> {
        let mut outcomes = IndexMap::new();
        for bucket in self.tests_status.values() {
            for id in &bucket.success {
                outcomes.insert(id.clone(), TestOutcome::Passed);
            }
            for id in &bucket.failure {
                outcomes.insert(id.clone(), TestOutcome::Failed);
            }
        }
        outcomes
    }

    fn apply_error(&self) -> Option<String> {
        if self.patch_is_none == Some(true) || self.patch_exists == Some(false) {
            return Some("harness received no patch".to_string());
        }
        if self.patch_successfully_applied == Some(false) {
            return Some("patch failed to apply".to_string());
        }
        None
    }
}

/// Parse the `report.json` content for `instance_id`.
pub fn parse_report(content: &str, instance_id: &str) -> Result<HarnessReport> {
    let mut reports: IndexMap<String, serde_json::Value> =
        serde_json::from_str(content).context("Failed to parse harness report")?;
    let entry = reports
        .swap_remove(instance_id)
        .ok_or_else(|| anyhow!("report has no entry for {}", instance_id))?;
    // Older harness versions spell it `patch_is_None`
    let entry = match entry {
        serde_json::Value::Object(mut map) => {
            if let Some(v) = map.remove("patch_is_None") {
                map.entry("patch_is_none".to_string()).or_insert(v);
            }
            serde_json::Value::Object(map)
        }
        other => other,
    };
    serde_json::from_value(entry).context("Unexpected harness report entry")
}

static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)\s+(\S+)").expect("valid regex")
});

/// Read pytest `-rA` short summary lines (`PASSED tests/x.py::test_y`).
///
/// `FAILED id - reason` keeps only the id. Expected failures count as
/// passed, the way the harness grades them.
pub fn parse_pytest_summary(log: &str) -> IndexMap<String, TestOutcome> {
    let mut outcomes = IndexMap::new();
    for line in log.lines() {
        let Some(caps) = SUMMARY_LINE.captures(line.trim_start()) else {
            continue;
        };
        let outcome = match &caps[1] {
            "PASSED" | "XFAIL" => TestOutcome::Passed,
            "FAILED" | "XPASS" => TestOutcome::Failed,
            "ERROR" => TestOutcome::Error,
            _ => TestOutcome::Skipped,
        };
        outcomes.insert(caps[2].to_string(), outcome);
    }
    outcomes
}

/// Build a response from a report directory (`report.json` plus an optional
/// test log).
pub fn response_from_report_dir(dir: &Path, instance_id: &str) -> Result<ExecutionResponse> {
    let report_path = dir.join("report.json");
    let content = std::fs::read_to_string(&report_path)
        .with_context(|| format!("Report not found: {}", report_path.display()))?;
    let report = parse_report(&content, instance_id)?;
    let log = std::fs::read_to_string(dir.join(TEST_OUTPUT_FILE)).ok();
    Ok(response_from_report(&report, log.as_deref()))
}

/// Convert a parsed report into the driver response.
///
/// FAILED entries are refined into ERROR or SKIPPED when the test log
/// says so; the report itself only knows success and failure.
pub fn response_from_report(report: &HarnessReport, log: Option<&str>) -> ExecutionResponse {
    let mut outcomes = report.outcomes();

    if let Some(log) = log {
        let detailed = parse_pytest_summary(log);
        for (id, outcome) in outcomes.iter_mut() {
            if *outcome != TestOutcome::Failed {
                continue;
            }
            if let Some(refined @ (TestOutcome::Error | TestOutcome::Skipped)) = detailed.get(id) {
                debug!(test = %id, outcome = %refined, "refined failed outcome from test log");
                *outcome = *refined;
            }
        }
    }

    ExecutionResponse {
        raw_outcomes: outcomes,
        execution_error: report.apply_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const REPORT: &str = r#"{
        "astropy__astropy-12907": {
            "patch_is_None": false,
            "patch_exists": true,
            "patch_successfully_applied": true,
            "resolved": false,
            "tests_status": {
                "FAIL_TO_PASS": {
                    "success": ["astropy/modeling/tests/test_separable.py::test_a"],
                    "failure": ["astropy/modeling/tests/test_separable.py::test_b"]
                },
                "PASS_TO_PASS": {
                    "success": ["astropy/modeling/tests/test_separable.py::test_c"],
                    "failure": []
                },
                "FAIL_TO_FAIL": {"success": [], "failure": []},
                "PASS_TO_FAIL": {"success": [], "failure": []}
            }
        }
    }"#;

    #[test]
    fn test_parse_report_outcomes() {
        let report = parse_report(REPORT, "astropy__astropy-12907").unwrap();
        assert!(!report.resolved);
        assert_eq!(report.patch_is_none, Some(false));
        let outcomes = report.outcomes();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes["astropy/modeling/tests/test_separable.py::test_b"],
            TestOutcome::Failed
        );
        assert_eq!(
            outcomes["astropy/modeling/tests/test_separable.py::test_c"],
            TestOutcome::Passed
        );
    }

    #[test]
    fn test_parse_report_missing_instance() {
        let err = parse_report(REPORT, "other__other-1").unwrap_err();
        assert!(err.to_string().contains("other__other-1"));
    }

    #[test]
    fn test_unapplied_patch_is_execution_error() {
        let content = r#"{"x": {"patch_successfully_applied": false, "resolved": false}}"#;
        let report = parse_report(content, "x").unwrap();
        let resp = response_from_report(&report, None);
        assert_eq!(resp.execution_error.as_deref(), Some("patch failed to apply"));
        assert!(resp.raw_outcomes.is_empty());
    }

    #[test]
    fn test_pytest_summary_parsing() {
        let log = "\
============ short test summary info ============
PASSED tests/test_a.py::test_one
FAILED tests/test_a.py::test_two - AssertionError: boom
ERROR tests/test_a.py::test_three - fixture missing
SKIPPED tests/test_a.py::test_four
XFAIL tests/test_a.py::test_five
random noise
";
        let outcomes = parse_pytest_summary(log);
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes["tests/test_a.py::test_one"], TestOutcome::Passed);
        assert_eq!(outcomes["tests/test_a.py::test_two"], TestOutcome::Failed);
        assert_eq!(outcomes["tests/test_a.py::test_three"], TestOutcome::Error);
        assert_eq!(outcomes["tests/test_a.py::test_four"], TestOutcome::Skipped);
        assert_eq!(outcomes["tests/test_a.py::test_five"], TestOutcome::Passed);
    }

    #[test]
    fn test_log_refines_failures_only() {
        let content = r#"{"x": {
            "patch_successfully_applied": true,
            "tests_status": {
                "FAIL_TO_PASS": {"success": ["ok"], "failure": ["collect", "plain"]}
            }
        }}"#;
        let report = parse_report(content, "x").unwrap();
        let log = "ERROR collect\nFAILED plain\nSKIPPED ok\n";
        let resp = response_from_report(&report, Some(log));
        assert!(resp.execution_error.is_none());
        assert_eq!(resp.raw_outcomes["collect"], TestOutcome::Error);
        assert_eq!(resp.raw_outcomes["plain"], TestOutcome::Failed);
        // The report's success wins over the log
        assert_eq!(resp.raw_outcomes["ok"], TestOutcome::Passed);
    }

    #[test]
    fn test_response_from_report_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("report.json"), REPORT).unwrap();
        let resp = response_from_report_dir(dir.path(), "astropy__astropy-12907").unwrap();
        assert_eq!(resp.raw_outcomes.len(), 3);

        let empty = tempdir().unwrap();
        let err = response_from_report_dir(empty.path(), "astropy__astropy-12907").unwrap_err();
        assert!(err.to_string().contains("Report not found"));
    }
}
