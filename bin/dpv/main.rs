//! dpv - data point validator CLI
//!
//! Checks that benchmark data points behave as declared: the reference patch
//! must turn every FAIL_TO_PASS test green and keep every PASS_TO_PASS test
//! green.

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use datapoint_validator::reporter::EXIT_FAILURE;
use datapoint_validator::ValidatorConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::style::print_error;

#[derive(Parser)]
#[command(name = "dpv", version)]
#[command(about = "Validate SWE-bench style data points against their declared tests")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "DPV_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging for the validator
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Directory holding the data point records
    #[arg(short, long, env = "DPV_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run data points through the harness and report verdicts
    Validate {
        #[command(flatten)]
        data: DataArgs,

        /// Only these files from the data directory (`.json` implied)
        #[arg(long, num_args = 1..)]
        files: Vec<String>,

        /// Validate a single instance
        #[arg(short, long, conflicts_with = "files")]
        instance: Option<String>,

        /// Re-score recorded harness reports instead of running the harness
        #[arg(long, env = "DPV_REPORTS_DIR")]
        reports_dir: Option<PathBuf>,

        /// Data points validated at the same time
        #[arg(short = 'j', long, env = "DPV_CONCURRENCY")]
        concurrency: Option<usize>,

        /// Per-execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Re-executions after an execution error
        #[arg(long)]
        retries: Option<u32>,

        /// Directory for JSON and Markdown results
        #[arg(short, long, env = "DPV_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Do not export results
        #[arg(long)]
        no_export: bool,
    },

    /// Check record shape without executing anything
    Check {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Write the harness predictions file for every well-formed record
    Convert {
        #[command(flatten)]
        data: DataArgs,

        /// Predictions file (JSONL)
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "datapoint_validator=debug,dpv=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => ValidatorConfig::from_path(path)?,
        None => ValidatorConfig::default(),
    };

    match cli.command {
        Commands::Validate {
            data,
            files,
            instance,
            reports_dir,
            concurrency,
            timeout,
            retries,
            output_dir,
            no_export,
        } => {
            apply_data_args(&mut config, data);
            if reports_dir.is_some() {
                config.reports_dir = reports_dir;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(timeout) = timeout {
                config.harness.timeout_secs = timeout;
            }
            if let Some(retries) = retries {
                config.retries_on_error = retries;
            }
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }
            if no_export {
                config.output_dir = None;
            }
            config.validate()?;
            debug!(?config, "effective configuration");
            commands::validate::run(config, instance, files).await
        }
        Commands::Check { data } => {
            apply_data_args(&mut config, data);
            commands::check::run(&config)
        }
        Commands::Convert { data, output } => {
            apply_data_args(&mut config, data);
            commands::convert::run(&config, &output)
        }
    }
}

fn apply_data_args(config: &mut ValidatorConfig, data: DataArgs) {
    if let Some(dir) = data.data_dir {
        config.data_dir = dir;
    }
}
