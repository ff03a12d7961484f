//! Data point validator
//!
//! Checks SWE-bench style data points: each record pairs a reference patch
//! with the tests it must fix (`FAIL_TO_PASS`) and the tests it must leave
//! passing (`PASS_TO_PASS`). The patch is applied on the instance's base
//! commit inside an isolated environment, the declared tests are run, and
//! the outcomes are scored into a PASS / FAIL / ERROR verdict.
//!
//! ## Module Structure
//!
//! - `dataset/`: data point records and the directory store
//! - `prediction`: data point → harness prediction request
//! - `harness/`: execution driver seam and its adapters
//! - `verdict`: scoring of outcomes against declared expectations
//! - `pipeline`: batch orchestration, concurrency, cancellation, retries
//! - `reporter`: summaries, exit codes, exports
//! - `config`: TOML configuration
//! - `error`: error taxonomy

pub mod config;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod pipeline;
pub mod prediction;
pub mod reporter;
pub mod verdict;

pub use config::ValidatorConfig;
pub use dataset::{validate_shape, DataPoint, DataPointStore, LoadedRecord, ShapePolicy, TestSet};
pub use error::{ValidationError, ValidationResult};
pub use harness::{ExecutionDriver, ExecutionResponse, ReportReplay, SweBenchHarness};
pub use pipeline::{PipelineConfig, Selection, ValidationPipeline};
pub use prediction::{write_predictions, PredictionConverter, PredictionRequest};
pub use reporter::{BatchSummary, ResultReporter};
pub use verdict::{evaluate, OverallStatus, TestOutcome, Verdict};
