//! Command-line front end for the gateway.
//!
//! ```bash
//! # List the available operations
//! trialgate list
//!
//! # Run one operation
//! trialgate call search_by_condition --args '{"condition": "asthma", "phase": "PHASE3"}'
//!
//! # With a deadline and debug logging
//! RUST_LOG=trialgate=debug trialgate call get_trial_statistics --timeout 120
//! ```
//!
//! Configuration is read from `TRIALGATE_*` environment variables.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use trialgate::{Gateway, GatewayConfig, Operation};

#[derive(Parser)]
#[command(name = "trialgate")]
#[command(version)]
#[command(about = "Rate-limited query gateway for the ClinicalTrials.gov registry")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the operation catalogue
    List,
    /// Run one operation and print its result as JSON
    Call {
        /// Operation name, e.g. `search_by_condition`
        operation: String,
        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
        /// Deadline for the whole call, in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trialgate=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::List => {
            let catalogue: Vec<Value> = Operation::ALL
                .iter()
                .map(|op| json!({"name": op.as_str(), "description": op.description()}))
                .collect();
            print_json(&Value::Array(catalogue));
            ExitCode::SUCCESS
        }
        Command::Call { operation, args, timeout } => match call(&operation, args.as_deref(), timeout).await {
            Ok(result) => {
                print_json(&result);
                ExitCode::SUCCESS
            }
            Err(report) => {
                print_json(&report);
                ExitCode::FAILURE
            }
        },
    }
}

async fn call(operation: &str, args: Option<&str>, timeout: Option<u64>) -> Result<Value, Value> {
    let arguments = match args {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| json!({"kind": "invalid_argument", "field": "args", "message": e.to_string()}))?,
        None => Value::Null,
    };
    let config =
        GatewayConfig::from_env().map_err(|e| json!({"kind": "configuration", "message": e.to_string()}))?;
    let gateway = Gateway::from_config(config).map_err(|e| json!({"kind": "configuration", "message": e.to_string()}))?;

    let outcome = match timeout {
        Some(secs) => gateway.execute_with_timeout(operation, arguments, Duration::from_secs(secs)).await,
        None => gateway.execute(operation, arguments).await,
    };
    match outcome {
        Ok(result) => serde_json::to_value(result).map_err(|e| json!({"kind": "internal", "message": e.to_string()})),
        Err(err) => Err(serde_json::to_value(err.report()).unwrap_or(Value::Null)),
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}
