//! Conversion of data points into harness prediction requests

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::DataPoint;
use crate::error::{ValidationError, ValidationResult};

/// Tag the validator submits under when the harness asks for a model name
pub const DEFAULT_MODEL_NAME: &str = "datapoint-validator";

/// One prediction as the evaluation harness expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub instance_id: String,
    pub model_name_or_path: String,
    pub model_patch: String,
}

/// Builds prediction requests for a fixed submitter tag.
#[derive(Debug, Clone)]
pub struct PredictionConverter {
    model_name: String,
}

impl Default for PredictionConverter {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_NAME)
    }
}

impl PredictionConverter {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Request for the data point's own patch.
    ///
    /// An empty patch can never flip a failing test, so it is refused here
    /// instead of reaching the harness.
    pub fn to_request(&self, point: &DataPoint) -> ValidationResult<PredictionRequest> {
        if point.patch.trim().is_empty() {
            return Err(ValidationError::InvalidPatch {
                instance_id: point.instance_id.clone(),
            });
        }

        debug!(
            instance_id = %point.instance_id,
            patch_bytes = point.patch.len(),
            "converted data point to prediction"
        );

        Ok(PredictionRequest {
            instance_id: point.instance_id.clone(),
            model_name_or_path: self.model_name.clone(),
            model_patch: point.patch.clone(),
        })
    }
}

/// Write predictions as JSON Lines, one request per line.
pub fn write_predictions(requests: &[PredictionRequest], path: &Path) -> ValidationResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ValidationError::io(parent, e))?;
    }

    let mut file = std::fs::File::create(path).map_err(|e| ValidationError::io(path, e))?;
    for request in requests {
        let line = serde_json::to_string(request)?;
        writeln!(file, "{}", line).map_err(|e| ValidationError::io(path, e))?;
    }

    info!(
        path = %path.display(),
        count = requests.len(),
        "wrote predictions file"
    );
    Ok(())
}
