//! Validate command - run data points through the harness and report verdicts

use std::sync::Arc;

use anyhow::Result;
use datapoint_validator::harness::{ExecutionDriver, ReportReplay, SweBenchHarness};
use datapoint_validator::pipeline::{cancellation, Selection, ValidationPipeline};
use datapoint_validator::reporter::{print_summary, BatchReport, ResultExporter};
use datapoint_validator::{DataPointStore, PredictionConverter, ValidatorConfig};
use tracing::warn;

use crate::style::*;

pub async fn run(config: ValidatorConfig, instance: Option<String>, files: Vec<String>) -> Result<i32> {
    print_header("Data Point Validation");

    let driver: Arc<dyn ExecutionDriver> = match &config.reports_dir {
        Some(dir) => Arc::new(ReportReplay::new(dir.clone())),
        None => Arc::new(SweBenchHarness::new(config.harness.clone())),
    };

    print_key_value("Data dir", &config.data_dir.display().to_string());
    print_key_value("Driver", driver.name());
    print_key_value("Concurrency", &config.concurrency.to_string());
    if config.retries_on_error > 0 {
        print_key_value("Retries", &config.retries_on_error.to_string());
    }
    println!();

    let store = DataPointStore::new(config.data_dir.clone(), config.shape_policy());
    let pipeline = ValidationPipeline::new(
        store,
        PredictionConverter::new(config.model_name.clone()),
        driver,
        config.pipeline_config(),
    );

    let (cancel_tx, cancel) = cancellation();
    let interrupted = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling validation");
            let _ = cancel_tx.send(true);
        }
    });

    match instance {
        Some(instance_id) => {
            println!("  {} Validating {}", icon_arrow(), instance_id);
            let verdict = pipeline.run_single(&instance_id, cancel).await?;
            println!(
                "  {} {} {}",
                icon_status(verdict.overall_status),
                verdict.instance_id,
                verdict.overall_status
            );
        }
        None => {
            let selection = if files.is_empty() {
                Selection::All
            } else {
                Selection::Files(files)
            };
            pipeline.run_batch(&selection, cancel).await?;
        }
    }

    let reporter = pipeline.reporter();
    print_summary(&reporter);
    println!();

    let cancelled = *interrupted.borrow();
    let summary = reporter.summary();
    if cancelled {
        print_warning("Validation was cancelled; results are partial");
    } else if summary.total == 0 {
        print_warning("No data points were validated");
    } else {
        println!(
            "  {} {} passed, {} failed, {} errors",
            icon_status(summary.worst_status()),
            summary.pass_count,
            summary.fail_count,
            summary.error_count
        );
    }
    println!();

    if let Some(dir) = &config.output_dir {
        match ResultExporter::new(dir.clone()).export_all(&BatchReport::from_reporter(&reporter)) {
            Ok(paths) => {
                for path in paths {
                    print_success(&format!("Results written to {}", path.display()));
                }
            }
            Err(e) => print_warning(&format!("Failed to export results: {:#}", e)),
        }
    }

    Ok(reporter.finalize_run(cancelled))
}
