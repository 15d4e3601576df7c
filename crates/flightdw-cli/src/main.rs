//! FlightDW CLI - Main entry point

use anyhow::Context;
use clap::Parser;
use flightdw_cli::commands::etl::EtlArgs;
use flightdw_cli::{Cli, Commands};
use flightdw_common::logging::{init_logging, LogConfig, LogLevel, LogOutput, LoggingGuard};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Connection settings may come from a .env file next to the binary
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // The CLI works without logging; a broken LOG_* setting only costs the logs
    let _guard = match setup_logging(cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: {:#}", e);
            None
        }
    };

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn setup_logging(verbose: bool) -> anyhow::Result<LoggingGuard> {
    let level = if verbose { LogLevel::Debug } else { LogLevel::Warn };
    let default_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("flightdw")
        .build();

    // Environment variables take precedence when any are set
    let log_config = if std::env::var_os("LOG_LEVEL").is_some() || std::env::var_os("LOG_OUTPUT").is_some() {
        LogConfig::from_env().context("Invalid LOG_* environment variable")?
    } else {
        default_config
    };

    init_logging(&log_config).context("Failed to initialize logging")
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> flightdw_cli::Result<()> {
    match &cli.command {
        Commands::Etl {
            source,
            config,
            data_dir,
            warehouse,
            reset,
            clean,
            batch_size,
            load_timestamp,
            format,
        } => {
            flightdw_cli::commands::etl::run(EtlArgs {
                source: *source,
                config: config.clone(),
                data_dir: data_dir.clone(),
                warehouse: warehouse.clone(),
                reset: *reset,
                clean: *clean,
                batch_size: *batch_size,
                load_timestamp: load_timestamp.clone(),
                format: *format,
            })
            .await
        }

        Commands::Query {
            warehouse,
            query,
            format,
        } => flightdw_cli::commands::query::run(warehouse, query, *format).await,
    }
}
