//! fleetbench drives listing and write load against a multi-cluster management platform
#![deny(missing_docs)]

mod config;
mod list;
mod rbac;
mod resources;
mod scenario;
mod seed;
mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fleetbench_common::telemetry;
use opentelemetry::{global, KeyValue};
use tracing::{error, info};

use crate::{list::list, rbac::rbac, seed::seed, simulate::simulate};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(
        long,
        env = "RUNNER_OTLP_ENDPOINT",
        default_value = "http://localhost:4317"
    )]
    otlp_endpoint: String,
}

/// Available Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk a paginated listing end to end and report its size
    List(list::Opts),
    /// Simulate a load scenario against the platform
    Simulate(simulate::Opts),
    /// Create the config maps written by the churn scenario
    Seed(seed::Opts),
    /// Create global roles, users and global role bindings
    Rbac(rbac::Opts),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::List(_) => "list",
            Command::Simulate(_) => "simulate",
            Command::Seed(_) => "seed",
            Command::Rbac(_) => "rbac",
        }
    }
}

/// Outcome of a command that ran to completion.
#[derive(Debug)]
pub enum CommandResult {
    /// The command met its checks.
    Success,
    /// The command ran but did not meet its checks.
    Failure(anyhow::Error),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let meter_provider = telemetry::init(args.otlp_endpoint.clone()).await?;

    let meter = global::meter("fleetbench");
    let runs = meter
        .u64_counter("runner_runs")
        .with_description("Number of runs of the runner")
        .init();

    runs.add(1, &[KeyValue::new("command", args.command.name())]);

    info!(command = args.command.name(), ?args.otlp_endpoint, "starting runner");
    let result = match args.command {
        Command::List(opts) => list(opts).await,
        Command::Simulate(opts) => simulate(opts).await,
        Command::Seed(opts) => seed(opts).await,
        Command::Rbac(opts) => rbac(opts).await,
    };
    // Flush traces and metrics before shutdown
    telemetry::shutdown(&meter_provider)?;
    match result? {
        CommandResult::Success => Ok(()),
        CommandResult::Failure(err) => {
            error!(%err, "run failed");
            Err(err)
        }
    }
}
