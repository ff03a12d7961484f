//! Re-scoring of harness reports that already exist on disk

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::report::{parse_report, response_from_report, response_from_report_dir};
use super::{ExecutionDriver, ExecutionResponse};
use crate::dataset::TestSet;
use crate::prediction::PredictionRequest;

/// Driver that reads `report.json` files instead of running anything.
///
/// Looks for `<dir>/<instance_id>/report.json` (harness layout, with an
/// optional `test_output.txt` beside it), then `<dir>/<instance_id>.json`.
pub struct ReportReplay {
    dir: PathBuf,
}

impl ReportReplay {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load(&self, instance_id: &str) -> Result<ExecutionResponse> {
        let nested = self.dir.join(instance_id);
        if nested.join("report.json").is_file() {
            return response_from_report_dir(&nested, instance_id);
        }

        let flat = self.dir.join(format!("{}.json", instance_id));
        if flat.is_file() {
            let content = std::fs::read_to_string(&flat)
                .with_context(|| format!("Failed to read {}", flat.display()))?;
            let report = parse_report(&content, instance_id)?;
            return Ok(response_from_report(&report, None));
        }

        bail!("no recorded report for {} in {}", instance_id, self.dir.display())
    }
}

#[async_trait]
impl ExecutionDriver for ReportReplay {
    fn name(&self) -> &str {
        "report-replay"
    }

    async fn health_check(&self) -> Result<()> {
        if !self.dir.is_dir() {
            bail!("reports directory not found: {}", self.dir.display());
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &PredictionRequest,
        _declared_tests: &TestSet,
    ) -> ExecutionResponse {
        debug!(instance_id = %request.instance_id, "replaying recorded report");
        self.load(&request.instance_id)
            .unwrap_or_else(|e| ExecutionResponse::errored(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::TestOutcome;
    use tempfile::tempdir;

    fn request(id: &str) -> PredictionRequest {
        PredictionRequest {
            instance_id: id.to_string(),
            model_name_or_path: "validator".to_string(),
            model_patch: "diff".to_string(),
        }
    }

    fn report(id: &str) -> String {
        format!(
            r#"{{"{}": {{"patch_successfully_applied": true, "resolved": true,
                "tests_status": {{"FAIL_TO_PASS": {{"success": ["a"], "failure": []}},
                                  "PASS_TO_PASS": {{"success": [], "failure": ["b"]}}}}}}}}"#,
            id
        )
    }

    #[tokio::test]
    async fn test_replay_nested_and_flat_layouts() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested-1")).unwrap();
        std::fs::write(dir.path().join("nested-1/report.json"), report("nested-1")).unwrap();
        std::fs::write(dir.path().join("nested-1/test_output.txt"), "ERROR b\n").unwrap();
        std::fs::write(dir.path().join("flat-1.json"), report("flat-1")).unwrap();

        let replay = ReportReplay::new(dir.path());
        replay.health_check().await.unwrap();

        let nested = replay.execute(&request("nested-1"), &TestSet::new()).await;
        assert!(nested.execution_error.is_none());
        assert_eq!(nested.raw_outcomes["a"], TestOutcome::Passed);
        assert_eq!(nested.raw_outcomes["b"], TestOutcome::Error);

        let flat = replay.execute(&request("flat-1"), &TestSet::new()).await;
        assert_eq!(flat.raw_outcomes["b"], TestOutcome::Failed);
    }

    #[tokio::test]
    async fn test_replay_missing_report_is_execution_error() {
        let dir = tempdir().unwrap();
        let replay = ReportReplay::new(dir.path());
        let resp = replay.execute(&request("ghost"), &TestSet::new()).await;
        assert!(resp.execution_error.unwrap().contains("no recorded report"));
    }

    #[tokio::test]
    async fn test_replay_health_check_needs_directory() {
        let replay = ReportReplay::new("/no/such/reports/dir");
        assert!(replay.health_check().await.is_err());
    }
}
