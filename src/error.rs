//! Error types for the validation pipeline

use thiserror::Error;

/// Result type for validator operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised before or around a data point's execution.
///
/// Execution-level failures (timeouts, crashes, patches that do not apply)
/// are not errors here: they travel as `execution_error` on the driver
/// response and end up as an `ERROR` verdict.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Malformed record {key}: {}", problems.join("; "))]
    MalformedRecord { key: String, problems: Vec<String> },

    #[error("Invalid patch for {instance_id}: patch is empty")]
    InvalidPatch { instance_id: String },

    #[error("Data point not found: {instance_id}")]
    NotFound { instance_id: String },

    #[error("Execution driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ValidationError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        ValidationError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Whether the error only concerns one data point, so a batch can record
    /// it as that point's verdict and move on.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            ValidationError::MalformedRecord { .. }
                | ValidationError::InvalidPatch { .. }
                | ValidationError::NotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_malformed_record_lists_every_problem() {
        let err = ValidationError::MalformedRecord {
            key: "django__django-1".to_string(),
            problems: vec![
                "missing field 'repo'".to_string(),
                "patch is empty".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Malformed record django__django-1: missing field 'repo'; patch is empty"
        );
    }

    #[test]
    fn test_error_display_variants() {
        let cases = vec![
            (
                ValidationError::InvalidPatch {
                    instance_id: "a".to_string(),
                },
                "Invalid patch for a: patch is empty",
            ),
            (
                ValidationError::NotFound {
                    instance_id: "b".to_string(),
                },
                "Data point not found: b",
            ),
            (
                ValidationError::DriverUnavailable("docker ping failed".to_string()),
                "Execution driver unavailable: docker ping failed",
            ),
            (
                ValidationError::Config("concurrency must be > 0".to_string()),
                "Invalid configuration: concurrency must be > 0",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected, "Display mismatch for {:?}", error);
        }
    }

    #[test]
    fn test_io_error_keeps_path() {
        let err = ValidationError::io("/data/x.json", IoError::new(ErrorKind::NotFound, "gone"));
        let msg = err.to_string();
        assert!(msg.contains("/data/x.json"), "got: {}", msg);
        assert!(msg.contains("gone"), "got: {}", msg);
    }

    #[test]
    fn test_from_serde_json_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{ nope }").unwrap_err();
        let err: ValidationError = serde_err.into();
        assert!(matches!(err, ValidationError::Json(_)));
        assert!(!err.is_record_local());
    }

    #[test]
    fn test_record_local_classification() {
        assert!(ValidationError::InvalidPatch {
            instance_id: "x".to_string()
        }
        .is_record_local());
        assert!(!ValidationError::DriverUnavailable("x".to_string()).is_record_local());
    }
}
