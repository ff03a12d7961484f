//! Validation pipeline: store → converter → driver → evaluator → reporter

use std::sync::Arc;
use std::time::Instant;

use futures::{future, stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::dataset::{DataPoint, DataPointStore, LoadedRecord};
use crate::error::{ValidationError, ValidationResult};
use crate::harness::{ExecutionDriver, ExecutionResponse};
use crate::prediction::{PredictionConverter, PredictionRequest};
use crate::reporter::{BatchSummary, ResultReporter};
use crate::verdict::{evaluate, OverallStatus, Verdict};

/// Error recorded for executions interrupted by cancellation
pub const CANCELLED: &str = "validation cancelled";

/// Receiving side of the batch cancellation signal
pub type Cancellation = watch::Receiver<bool>;

/// New cancellation signal; send `true` to cancel
pub fn cancellation() -> (watch::Sender<bool>, Cancellation) {
    watch::channel(false)
}

/// Batch scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Data points validated at the same time
    pub concurrency: usize,
    /// Re-executions after an execution error; a FAIL is never retried
    pub retries_on_error: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            retries_on_error: 0,
        }
    }
}

/// Which records a batch covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every record in the store
    All,
    /// Records from the named files
    Files(Vec<String>),
}

/// Runs data points through the driver and collects their verdicts.
///
/// Holds no per-point state: every verdict depends only on its data point
/// and its own execution.
pub struct ValidationPipeline {
    store: DataPointStore,
    converter: PredictionConverter,
    driver: Arc<dyn ExecutionDriver>,
    reporter: Arc<ResultReporter>,
    config: PipelineConfig,
}

impl ValidationPipeline {
    pub fn new(
        store: DataPointStore,
        converter: PredictionConverter,
        driver: Arc<dyn ExecutionDriver>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            converter,
            driver,
            reporter: Arc::new(ResultReporter::new()),
            config,
        }
    }

    pub fn reporter(&self) -> Arc<ResultReporter> {
        Arc::clone(&self.reporter)
    }

    /// Fail the whole run when the isolation backend is unreachable
    pub async fn ensure_driver(&self) -> ValidationResult<()> {
        self.driver.health_check().await.map_err(|e| {
            ValidationError::DriverUnavailable(format!("{}: {:#}", self.driver.name(), e))
        })
    }

    /// Validate a batch.
    ///
    /// Malformed records and rejected patches become ERROR verdicts; missing
    /// files are logged and skipped. After cancellation no new point starts
    /// and the summary covers whatever was accumulated.
    pub async fn run_batch(
        &self,
        selection: &Selection,
        cancel: Cancellation,
    ) -> ValidationResult<BatchSummary> {
        self.ensure_driver().await?;

        let records = match selection {
            Selection::All => self.store.scan()?,
            Selection::Files(names) => self.store.load_files(names)?,
        };

        let start = Instant::now();
        info!(
            records = records.len(),
            driver = self.driver.name(),
            concurrency = self.config.concurrency,
            "Starting validation batch"
        );

        stream::iter(records)
            .map(|record| self.validate_record(record, cancel.clone()))
            .buffer_unordered(self.config.concurrency.max(1))
            .for_each(|verdict| {
                if let Some(verdict) = verdict {
                    self.reporter.accumulate(verdict);
                }
                future::ready(())
            })
            .await;

        let summary = self.reporter.summary();
        info!(
            total = summary.total,
            passed = summary.pass_count,
            failed = summary.fail_count,
            errors = summary.error_count,
            duration_sec = start.elapsed().as_secs_f64(),
            "Validation batch complete"
        );
        Ok(summary)
    }

    /// Validate one instance. A missing instance is fatal here.
    pub async fn run_single(
        &self,
        instance_id: &str,
        cancel: Cancellation,
    ) -> ValidationResult<Verdict> {
        self.ensure_driver().await?;

        let verdict = match self.store.load(instance_id) {
            Ok(point) => self.validate_point(&point, cancel).await,
            Err(e @ ValidationError::NotFound { .. }) => return Err(e),
            Err(e) if e.is_record_local() => Verdict::rejected(instance_id, e.to_string()),
            Err(e) => return Err(e),
        };

        self.reporter.accumulate(verdict.clone());
        Ok(verdict)
    }

    async fn validate_record(&self, record: LoadedRecord, cancel: Cancellation) -> Option<Verdict> {
        if *cancel.borrow() {
            debug!(key = %record.key, "batch cancelled, not starting");
            return None;
        }

        match record.result {
            Ok(point) => Some(self.validate_point(&point, cancel).await),
            Err(ValidationError::NotFound { instance_id }) => {
                warn!(instance_id = %instance_id, "data point not found, skipping");
                None
            }
            Err(e) => {
                warn!(
                    key = %record.key,
                    source = %record.source.display(),
                    error = %e,
                    "rejecting malformed record"
                );
                Some(Verdict::rejected(record.key, e.to_string()))
            }
        }
    }

    /// Convert, execute (with the retry policy), and evaluate one data point.
    #[instrument(skip(self, point, cancel), fields(instance_id = %point.instance_id))]
    pub async fn validate_point(&self, point: &DataPoint, mut cancel: Cancellation) -> Verdict {
        let request = match self.converter.to_request(point) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "refusing data point before execution");
                return Verdict::rejected(&point.instance_id, e.to_string());
            }
        };

        info!(
            repo = %point.repo,
            commit = point.short_commit(),
            "Validating data point"
        );

        let declared = point.declared_tests();
        let mut attempt = 0u32;
        loop {
            let response = self.execute(&request, &declared, &mut cancel).await;
            let verdict = evaluate(point, &response);

            let retryable = verdict.overall_status == OverallStatus::Error
                && response.execution_error.as_deref() != Some(CANCELLED)
                && !*cancel.borrow();
            if retryable && attempt < self.config.retries_on_error {
                attempt += 1;
                warn!(
                    attempt,
                    max = self.config.retries_on_error,
                    error = verdict.error.as_deref().unwrap_or(""),
                    "execution error, retrying"
                );
                continue;
            }
            return verdict;
        }
    }

    async fn execute(
        &self,
        request: &PredictionRequest,
        declared: &crate::dataset::TestSet,
        cancel: &mut Cancellation,
    ) -> ExecutionResponse {
        if *cancel.borrow() {
            return ExecutionResponse::errored(CANCELLED);
        }
        tokio::select! {
            response = self.driver.execute(request, declared) => response,
            _ = cancelled(cancel) => {
                warn!(instance_id = %request.instance_id, "execution interrupted by cancellation");
                ExecutionResponse::errored(CANCELLED)
            }
        }
    }
}

/// Resolves once cancellation is requested; never if the sender is gone.
async fn cancelled(cancel: &mut Cancellation) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            future::pending::<()>().await;
        }
    }
}
