//! Execution driver seam
//!
//! The validator never builds sandboxes itself. An [`ExecutionDriver`]
//! takes a prediction, applies it on the instance's base commit inside an
//! isolated environment, runs the declared tests, and reports per-test
//! outcomes. Adapters:
//! - [`SweBenchHarness`]: runs the SWE-bench evaluation harness as a
//!   subprocess (optionally through `docker compose`)
//! - [`ReportReplay`]: re-scores harness reports already on disk

pub mod docker;
pub mod replay;
pub mod report;
pub mod swebench;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dataset::TestSet;
use crate::prediction::PredictionRequest;
use crate::verdict::TestOutcome;

pub use docker::ping_daemon;
pub use replay::ReportReplay;
pub use report::{parse_pytest_summary, parse_report, HarnessReport};
pub use swebench::{SweBenchHarness, SweBenchHarnessConfig};

/// What one execution produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Outcome per test id. May be partial when `execution_error` is set.
    pub raw_outcomes: IndexMap<String, TestOutcome>,
    /// Sandbox crash, timeout, or patch-apply failure
    pub execution_error: Option<String>,
}

impl ExecutionResponse {
    pub fn completed(raw_outcomes: IndexMap<String, TestOutcome>) -> Self {
        Self {
            raw_outcomes,
            execution_error: None,
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            raw_outcomes: IndexMap::new(),
            execution_error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.execution_error.is_some()
    }
}

/// Isolated execution capability the pipeline depends on.
///
/// Implementations must keep invocations isolated from each other and must
/// not fail: every problem is reported through `execution_error`.
#[async_trait]
pub trait ExecutionDriver: Send + Sync {
    /// Driver name (for logging)
    fn name(&self) -> &str;

    /// Check that the isolation backend is reachable at all
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Apply `request` on the instance's base commit and run `declared_tests`
    async fn execute(
        &self,
        request: &PredictionRequest,
        declared_tests: &TestSet,
    ) -> ExecutionResponse;
}
