//! Check command - shape validation only, nothing is executed

use anyhow::Result;
use datapoint_validator::reporter::{EXIT_FAILURE, EXIT_SUCCESS};
use datapoint_validator::{DataPointStore, ValidatorConfig};

use crate::style::*;

pub fn run(config: &ValidatorConfig) -> Result<i32> {
    print_header("Data Point Check");

    let store = DataPointStore::new(config.data_dir.clone(), config.shape_policy());
    let records = store.scan()?;

    let mut malformed = 0usize;
    for record in &records {
        match &record.result {
            Ok(point) => println!(
                "  {} {} {}",
                icon_success(),
                point.instance_id,
                style_dim(&format!(
                    "({} fail-to-pass, {} pass-to-pass)",
                    point.fail_to_pass.len(),
                    point.pass_to_pass.len()
                ))
            ),
            Err(e) => {
                malformed += 1;
                println!("  {} {}", icon_error(), record.key);
                println!("      {}", style_dim(&e.to_string()));
            }
        }
    }

    println!();
    print_key_value("Records", &records.len().to_string());
    print_key_value("Malformed", &malformed.to_string());
    println!();

    if malformed == 0 {
        print_success("All records are well-formed");
        Ok(EXIT_SUCCESS)
    } else {
        print_error(&format!("{} malformed record(s)", malformed));
        Ok(EXIT_FAILURE)
    }
}
