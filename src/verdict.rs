//! Verdicts: declared test expectations checked against raw outcomes

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::DataPoint;
use crate::harness::ExecutionResponse;

/// Outcome of a single test in one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestOutcome {
    Passed,
    Failed,
    /// Errored during setup or collection
    Error,
    Skipped,
    /// Declared but absent from the harness report
    NotRun,
}

impl TestOutcome {
    pub fn is_passed(self) -> bool {
        self == TestOutcome::Passed
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestOutcome::Passed => "PASSED",
            TestOutcome::Failed => "FAILED",
            TestOutcome::Error => "ERROR",
            TestOutcome::Skipped => "SKIPPED",
            TestOutcome::NotRun => "NOT_RUN",
        };
        f.pad(s)
    }
}

/// Overall judgment for one data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Pass => "PASS",
            OverallStatus::Fail => "FAIL",
            OverallStatus::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// Result of validating one data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub instance_id: String,
    pub overall_status: OverallStatus,
    pub fail_to_pass_results: IndexMap<String, TestOutcome>,
    pub pass_to_pass_results: IndexMap<String, TestOutcome>,
    pub missing_tests: IndexSet<String>,
    /// Execution error, or why the point was refused before execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl Verdict {
    /// ERROR verdict for a point that never reached the harness
    pub fn rejected(instance_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            overall_status: OverallStatus::Error,
            fail_to_pass_results: IndexMap::new(),
            pass_to_pass_results: IndexMap::new(),
            missing_tests: IndexSet::new(),
            error: Some(reason.into()),
            evaluated_at: Utc::now(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.overall_status == OverallStatus::Pass
    }

    /// Declared tests whose outcome is anything but PASSED
    pub fn unmet_tests(&self) -> Vec<(&str, TestOutcome)> {
        self.fail_to_pass_results
            .iter()
            .chain(self.pass_to_pass_results.iter())
            .filter(|(_, outcome)| !outcome.is_passed())
            .map(|(id, outcome)| (id.as_str(), *outcome))
            .collect()
    }
}

/// Score one execution against the data point's declared test sets.
///
/// An execution error always yields `ERROR`, whatever the outcomes say:
/// a broken sandbox needs an infrastructure fix, not a data fix. Tests the
/// harness did not report are scored `NOT_RUN` and listed in
/// `missing_tests`; on their own they make the verdict `FAIL`, not `ERROR`.
/// Outcomes for undeclared tests are ignored.
pub fn evaluate(point: &DataPoint, response: &ExecutionResponse) -> Verdict {
    let mut missing_tests = IndexSet::new();
    let mut lookup = |id: &String| -> (String, TestOutcome) {
        let outcome = match response.raw_outcomes.get(id) {
            Some(outcome) => *outcome,
            None => {
                missing_tests.insert(id.clone());
                TestOutcome::NotRun
            }
        };
        (id.clone(), outcome)
    };

    let fail_to_pass_results: IndexMap<String, TestOutcome> =
        point.fail_to_pass.iter().map(&mut lookup).collect();
    let pass_to_pass_results: IndexMap<String, TestOutcome> =
        point.pass_to_pass.iter().map(&mut lookup).collect();

    let overall_status = if response.execution_error.is_some() {
        OverallStatus::Error
    } else if fail_to_pass_results
        .values()
        .chain(pass_to_pass_results.values())
        .all(|o| o.is_passed())
    {
        OverallStatus::Pass
    } else {
        OverallStatus::Fail
    };

    if !missing_tests.is_empty() {
        debug!(
            instance_id = %point.instance_id,
            missing = missing_tests.len(),
            "declared tests missing from harness outcomes"
        );
    }

    let verdict = Verdict {
        instance_id: point.instance_id.clone(),
        overall_status,
        fail_to_pass_results,
        pass_to_pass_results,
        missing_tests,
        error: response.execution_error.clone(),
        evaluated_at: Utc::now(),
    };

    info!(
        instance_id = %verdict.instance_id,
        status = %verdict.overall_status,
        unmet = verdict.unmet_tests().len(),
        "verdict"
    );
    verdict
}
