//! Validator configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration. CLI flags override it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::ShapePolicy;
use crate::error::{ValidationError, ValidationResult};
use crate::harness::SweBenchHarnessConfig;
use crate::pipeline::PipelineConfig;
use crate::prediction::DEFAULT_MODEL_NAME;

/// Complete validator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Directory holding the data point records
    pub data_dir: PathBuf,
    /// Submitter tag sent as `model_name_or_path`
    pub model_name: String,
    /// Reject records with an empty PASS_TO_PASS set
    pub require_pass_to_pass: bool,
    /// Data points validated at the same time
    pub concurrency: usize,
    /// Re-executions allowed after an execution error (never after FAIL)
    pub retries_on_error: u32,
    /// Where JSON/Markdown results are exported; `None` disables export
    pub output_dir: Option<PathBuf>,
    /// Re-score recorded harness reports from here instead of running
    pub reports_dir: Option<PathBuf>,
    /// Harness invocation
    pub harness: SweBenchHarnessConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data_points"),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            require_pass_to_pass: true,
            concurrency: 1,
            retries_on_error: 0,
            output_dir: Some(PathBuf::from("validation_results")),
            reports_dir: None,
            harness: SweBenchHarnessConfig::default(),
        }
    }
}

impl ValidatorConfig {
    /// Load config from a TOML file
    pub fn from_path(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ValidationError::io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| ValidationError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> ValidationResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ValidationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.concurrency == 0 {
            return Err(ValidationError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.harness.timeout_secs == 0 {
            return Err(ValidationError::Config(
                "harness.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.model_name.trim().is_empty() {
            return Err(ValidationError::Config("model_name is empty".to_string()));
        }
        Ok(())
    }

    pub fn shape_policy(&self) -> ShapePolicy {
        ShapePolicy {
            require_pass_to_pass: self.require_pass_to_pass,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            concurrency: self.concurrency,
            retries_on_error: self.retries_on_error,
        }
    }
}
