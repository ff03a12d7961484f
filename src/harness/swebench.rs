//! SWE-bench evaluation harness driven as a subprocess

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::docker::ping_daemon;
use super::report::response_from_report_dir;
use super::{ExecutionDriver, ExecutionResponse};
use crate::dataset::TestSet;
use crate::prediction::{write_predictions, PredictionRequest};

const STDERR_TAIL_CHARS: usize = 2000;

/// How the harness is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweBenchHarnessConfig {
    /// Dataset the harness resolves instances from (hub name or local file)
    pub dataset_name: String,
    /// Run through `docker compose run --rm <service>` when set
    pub compose_service: Option<String>,
    /// Python interpreter used to launch the harness module
    pub python: String,
    /// Program and leading arguments run instead of
    /// `<python> -m swebench.harness.run_evaluation`; harness flags follow
    pub launcher: Vec<String>,
    /// Working directory; predictions and harness logs live under it
    pub work_dir: PathBuf,
    /// Hard limit for one execution
    pub timeout_secs: u64,
    /// Pass `--clean True` so instance images are removed afterwards
    pub clean: bool,
    /// Extra arguments appended to the harness command line
    pub extra_args: Vec<String>,
    /// Keep `logs/run_evaluation/<run_id>` after the report has been read
    pub keep_logs: bool,
}

impl Default for SweBenchHarnessConfig {
    fn default() -> Self {
        Self {
            dataset_name: "SWE-bench/SWE-bench".to_string(),
            compose_service: Some("data-quality-checker".to_string()),
            python: "python".to_string(),
            launcher: Vec::new(),
            work_dir: PathBuf::from("."),
            timeout_secs: 1800,
            clean: true,
            extra_args: Vec::new(),
            keep_logs: false,
        }
    }
}

/// Driver running `swebench.harness.run_evaluation` once per data point.
///
/// Every execution gets its own run id, so concurrent executions never
/// share predictions files or log directories.
pub struct SweBenchHarness {
    config: SweBenchHarnessConfig,
}

impl SweBenchHarness {
    pub fn new(config: SweBenchHarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SweBenchHarnessConfig {
        &self.config
    }

    /// Program and arguments for one harness run.
    ///
    /// `predictions` is relative to the working directory so it resolves
    /// the same way inside the compose container.
    pub fn command_line(&self, predictions: &Path, run_id: &str, instance_id: &str) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(service) = &self.config.compose_service {
            argv.extend(
                ["docker", "compose", "run", "--rm", "--name", run_id, service.as_str()]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        if self.config.launcher.is_empty() {
            argv.extend(
                [self.config.python.as_str(), "-m", "swebench.harness.run_evaluation"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        } else {
            argv.extend(self.config.launcher.iter().cloned());
        }
        argv.push("--predictions_path".to_string());
        argv.push(predictions.to_string_lossy().to_string());
        argv.push("--run_id".to_string());
        argv.push(run_id.to_string());
        argv.push("--dataset_name".to_string());
        argv.push(self.config.dataset_name.clone());
        argv.push("--instance_ids".to_string());
        argv.push(instance_id.to_string());
        argv.push("--timeout".to_string());
        argv.push(self.config.timeout_secs.to_string());
        if self.config.clean {
            argv.push("--clean".to_string());
            argv.push("True".to_string());
        }
        argv.extend(self.config.extra_args.iter().cloned());
        argv
    }

    /// Where the harness leaves the report for one instance
    pub fn report_dir(&self, run_id: &str, model_name: &str, instance_id: &str) -> PathBuf {
        self.config
            .work_dir
            .join("logs")
            .join("run_evaluation")
            .join(run_id)
            .join(model_name.replace('/', "__"))
            .join(instance_id)
    }

    fn predictions_path(run_id: &str) -> PathBuf {
        PathBuf::from("predictions").join(format!("{}.jsonl", run_id))
    }

    /// Remove the per-run predictions file and, unless kept, the run's logs
    async fn cleanup(&self, run_id: &str) {
        let predictions = self.config.work_dir.join(Self::predictions_path(run_id));
        if let Err(e) = tokio::fs::remove_file(&predictions).await {
            debug!(path = %predictions.display(), error = %e, "predictions file not removed");
        }
        if !self.config.keep_logs {
            let logs = self.config.work_dir.join("logs").join("run_evaluation").join(run_id);
            if let Err(e) = tokio::fs::remove_dir_all(&logs).await {
                debug!(path = %logs.display(), error = %e, "run logs not removed");
            }
        }
    }

    async fn run(&self, request: &PredictionRequest, run_id: &str) -> Result<ExecutionResponse> {
        let predictions_rel = Self::predictions_path(run_id);
        write_predictions(
            std::slice::from_ref(request),
            &self.config.work_dir.join(&predictions_rel),
        )?;

        let argv = self.command_line(&predictions_rel, run_id, &request.instance_id);
        debug!(command = %argv.join(" "), "launching harness");

        let (program, args) = argv
            .split_first()
            .context("Harness command line is empty")?;
        let child = Command::new(program)
            .args(args)
            .current_dir(&self.config.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to launch harness ({})", program))?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(output) => output.context("Failed to wait for harness")?,
            Err(_) => {
                warn!(
                    instance_id = %request.instance_id,
                    "Harness timed out after {}s",
                    self.config.timeout_secs
                );
                // Killing the compose client leaves its container running
                if self.config.compose_service.is_some() {
                    remove_container(run_id).await;
                }
                return Ok(ExecutionResponse::errored(format!(
                    "timeout after {}s",
                    self.config.timeout_secs
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Ok(ExecutionResponse::errored(format!(
                "harness exited with code {}: {}",
                code,
                tail(stderr.trim(), STDERR_TAIL_CHARS)
            )));
        }

        let report_dir = self.report_dir(run_id, &request.model_name_or_path, &request.instance_id);
        response_from_report_dir(&report_dir, &request.instance_id)
    }
}

#[async_trait]
impl ExecutionDriver for SweBenchHarness {
    fn name(&self) -> &str {
        "swebench-harness"
    }

    async fn health_check(&self) -> Result<()> {
        ping_daemon().await
    }

    #[instrument(skip(self, request, declared_tests), fields(instance_id = %request.instance_id))]
    async fn execute(
        &self,
        request: &PredictionRequest,
        declared_tests: &TestSet,
    ) -> ExecutionResponse {
        let run_id = run_id_for(&request.instance_id);
        let start = Instant::now();
        info!(
            run_id = %run_id,
            declared = declared_tests.len(),
            "Running harness"
        );

        let response = match self.run(request, &run_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Harness execution failed: {:#}", e);
                ExecutionResponse::errored(format!("{:#}", e))
            }
        };
        self.cleanup(&run_id).await;

        info!(
            run_id = %run_id,
            outcomes = response.raw_outcomes.len(),
            error = response.execution_error.as_deref().unwrap_or(""),
            duration_sec = start.elapsed().as_secs_f64(),
            "Harness finished"
        );
        response
    }
}

async fn remove_container(name: &str) {
    let result = Command::new("docker")
        .args(["rm", "-f", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => info!(container = %name, "Removed timed-out container"),
        Ok(status) => warn!(container = %name, %status, "Failed to remove timed-out container"),
        Err(e) => warn!(container = %name, error = %e, "Failed to run docker rm"),
    }
}

fn run_id_for(instance_id: &str) -> String {
    format!("{}-{}", instance_id, &Uuid::new_v4().simple().to_string()[..8])
}

/// Last `max_chars` characters of `s`
fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else {
        let skipped: String = s.chars().skip(count - max_chars).collect();
        format!("...{}", skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request() -> PredictionRequest {
        PredictionRequest {
            instance_id: "sympy__sympy-20590".to_string(),
            model_name_or_path: "org/validator".to_string(),
            model_patch: "diff --git a/x b/x\n".to_string(),
        }
    }

    #[test]
    fn test_command_line_through_compose() {
        let harness = SweBenchHarness::new(SweBenchHarnessConfig::default());
        let argv = harness.command_line(Path::new("predictions/r.jsonl"), "r", "sympy__sympy-20590");
        assert_eq!(
            &argv[..7],
            &["docker", "compose", "run", "--rm", "--name", "r", "data-quality-checker"]
        );
        assert_eq!(argv[7], "python");
        assert!(argv.windows(2).any(|w| w == ["--run_id", "r"]));
        assert!(argv.windows(2).any(|w| w == ["--instance_ids", "sympy__sympy-20590"]));
        assert!(argv.windows(2).any(|w| w == ["--dataset_name", "SWE-bench/SWE-bench"]));
        assert!(argv.windows(2).any(|w| w == ["--clean", "True"]));
    }

    #[test]
    fn test_command_line_without_compose() {
        let harness = SweBenchHarness::new(SweBenchHarnessConfig {
            compose_service: None,
            python: "python3".to_string(),
            clean: false,
            extra_args: vec!["--max_workers".to_string(), "1".to_string()],
            ..Default::default()
        });
        let argv = harness.command_line(Path::new("p.jsonl"), "r", "i");
        assert_eq!(argv[0], "python3");
        assert!(!argv.contains(&"--clean".to_string()));
        assert_eq!(&argv[argv.len() - 2..], &["--max_workers", "1"]);
    }

    #[test]
    fn test_report_dir_layout() {
        let harness = SweBenchHarness::new(SweBenchHarnessConfig {
            work_dir: PathBuf::from("/work"),
            ..Default::default()
        });
        assert_eq!(
            harness.report_dir("run-1", "org/validator", "inst"),
            PathBuf::from("/work/logs/run_evaluation/run-1/org__validator/inst")
        );
    }

    #[test]
    fn test_run_ids_are_unique_per_execution() {
        let a = run_id_for("inst");
        let b = run_id_for("inst");
        assert!(a.starts_with("inst-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdefghij", 3), "...hij");
    }

    #[tokio::test]
    async fn test_missing_program_becomes_execution_error() {
        let dir = tempdir().unwrap();
        let harness = SweBenchHarness::new(SweBenchHarnessConfig {
            compose_service: None,
            python: "/nonexistent/python-for-dpv-tests".to_string(),
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let response = harness.execute(&request(), &TestSet::new()).await;
        let error = response.execution_error.expect("execution error");
        assert!(error.contains("Failed to launch harness"), "got: {}", error);
        assert!(dir.path().join("predictions").is_dir());
    }

    fn scripted(dir: &Path, script: &str, timeout_secs: u64) -> SweBenchHarness {
        SweBenchHarness::new(SweBenchHarnessConfig {
            compose_service: None,
            launcher: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            work_dir: dir.to_path_buf(),
            timeout_secs,
            ..Default::default()
        })
    }

    #[test]
    fn test_launcher_replaces_harness_module() {
        let harness = scripted(Path::new("."), "exit 0", 5);
        let argv = harness.command_line(Path::new("p.jsonl"), "r", "i");
        assert_eq!(&argv[..3], &["sh", "-c", "exit 0"]);
        assert_eq!(argv[3], "--predictions_path");
        assert!(!argv.contains(&"swebench.harness.run_evaluation".to_string()));
    }

    #[tokio::test]
    async fn test_nonzero_exit_becomes_execution_error() {
        let dir = tempdir().unwrap();
        let harness = scripted(dir.path(), "echo 'image build failed' >&2; exit 3", 30);

        let response = harness.execute(&request(), &TestSet::new()).await;
        let error = response.execution_error.expect("execution error");
        assert!(
            error.starts_with("harness exited with code 3: image build failed"),
            "got: {}",
            error
        );
        assert!(response.raw_outcomes.is_empty());

        // Per-run files are cleaned up
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("predictions"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_harness() {
        let dir = tempdir().unwrap();
        let harness = scripted(dir.path(), "echo $$ > harness.pid; exec sleep 30", 1);

        let start = Instant::now();
        let response = harness.execute(&request(), &TestSet::new()).await;
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(response.execution_error.as_deref(), Some("timeout after 1s"));

        let pid = std::fs::read_to_string(dir.path().join("harness.pid")).unwrap();
        let status_path = format!("/proc/{}/status", pid.trim());
        let mut gone = false;
        for _ in 0..50 {
            match std::fs::read_to_string(&status_path) {
                Err(_) => gone = true,
                Ok(status) => gone = status.lines().any(|l| l.starts_with("State:") && l.contains('Z')),
            }
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gone, "harness process still running");
    }
}
