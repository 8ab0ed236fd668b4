use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::process;

mod config;
mod telemetry;

#[derive(Parser)]
#[command(about = "Moves incidents from memcached into the incident API")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the reconciliation loop (default)
    Run,
    /// Print the version and exit
    Version,
}

fn main() {
    let cli = Cli::parse();

    match cli.command.unwrap_or(CliCommand::Run) {
        CliCommand::Version => {
            println!("{}", version_line());
        }
        CliCommand::Run => run(&cli.config),
    }
}

fn version_line() -> String {
    format!("redborder-mem2incident version {}", env!("CARGO_PKG_VERSION"))
}

fn run(config_path: &std::path::Path) {
    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading config {}: {e}", config_path.display());
            process::exit(1);
        }
    };

    // Held for the lifetime of the process to keep sentry reporting
    let _sentry = telemetry::init_logging(config.common.logging.as_ref());

    if let Some(metrics) = &config.common.metrics
        && let Err(e) = telemetry::init_metrics(metrics)
    {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    if let Err(e) = reconciler::run(config.reconciler) {
        tracing::error!(error = %e, "Reconciler failed");
        process::exit(1);
    }
}
