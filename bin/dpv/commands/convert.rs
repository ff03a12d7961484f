//! Convert command - write the harness predictions file without running it

use std::path::Path;

use anyhow::{Context, Result};
use datapoint_validator::reporter::{EXIT_FAILURE, EXIT_SUCCESS};
use datapoint_validator::{write_predictions, DataPointStore, PredictionConverter, ValidatorConfig};

use crate::style::*;

pub fn run(config: &ValidatorConfig, output: &Path) -> Result<i32> {
    print_header("Predictions Export");

    let store = DataPointStore::new(config.data_dir.clone(), config.shape_policy());
    let converter = PredictionConverter::new(config.model_name.clone());

    let mut requests = Vec::new();
    let mut skipped = 0usize;
    for record in store.scan()? {
        match record.result.and_then(|point| converter.to_request(&point)) {
            Ok(request) => requests.push(request),
            Err(e) => {
                skipped += 1;
                print_warning(&format!("Skipping {}: {}", record.key, e));
            }
        }
    }

    write_predictions(&requests, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!();
    print_key_value("Model", converter.model_name());
    print_key_value("Predictions", &requests.len().to_string());
    print_key_value("Skipped", &skipped.to_string());
    println!();
    print_success(&format!("Wrote {}", output.display()));

    Ok(if skipped == 0 { EXIT_SUCCESS } else { EXIT_FAILURE })
}
