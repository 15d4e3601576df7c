//! FlightDW CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Command surface of the `flightdw` binary: running the ETL into the
//! warehouse and printing the analytical reports computed from it.

pub mod commands;
pub mod error;
pub mod output;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand, ValueEnum};
use flightdw_etl::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_DATA_DIR, DEFAULT_SOURCE_CONFIG_FILE, DEFAULT_WAREHOUSE_PATH,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flightdw")]
#[command(author, version, about = "Flight operations data warehouse ETL", long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full ETL into the warehouse
    Etl {
        /// Where flights, maintenance and reports are read from
        #[arg(long, value_enum, default_value_t = SourceKind::Postgres)]
        source: SourceKind,

        /// Database connection file (key=value lines)
        #[arg(long, env = "FLIGHTDW_SOURCE_CONFIG", default_value = DEFAULT_SOURCE_CONFIG_FILE)]
        config: PathBuf,

        /// Directory with the source CSV files and reference lookups
        #[arg(long, env = "FLIGHTDW_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        /// Warehouse database file
        #[arg(long, env = "FLIGHTDW_WAREHOUSE", default_value = DEFAULT_WAREHOUSE_PATH)]
        warehouse: PathBuf,

        /// Delete and recreate the warehouse before loading
        #[arg(long)]
        reset: bool,

        /// Apply the optional cleaning rules
        #[arg(long)]
        clean: bool,

        /// Rows per insert batch when loading facts
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Timestamp stamped on flight-leg facts (RFC 3339, defaults to now)
        #[arg(long)]
        load_timestamp: Option<String>,

        /// Output format for the run summary
        #[arg(short, long, value_enum, default_value_t = SummaryFormat::Table)]
        format: SummaryFormat,
    },

    /// Run the analytical queries against the warehouse
    Query {
        /// Warehouse database file
        #[arg(long, env = "FLIGHTDW_WAREHOUSE", default_value = DEFAULT_WAREHOUSE_PATH)]
        warehouse: PathBuf,

        /// Query to run: utilization, reporting, reporting-per-role or all
        #[arg(short, long, default_value = "all")]
        query: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ResultFormat::Table)]
        format: ResultFormat,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Operational PostgreSQL database
    Postgres,
    /// CSV exports in the data directory
    Csv,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    Table,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ResultFormat {
    Table,
    Csv,
    Json,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_etl_defaults() {
        let cli = Cli::try_parse_from(["flightdw", "etl"]).unwrap();

        let Commands::Etl {
            source,
            batch_size,
            reset,
            clean,
            format,
            ..
        } = cli.command
        else {
            panic!("expected etl command");
        };
        assert_eq!(source, SourceKind::Postgres);
        assert_eq!(batch_size, DEFAULT_BATCH_SIZE);
        assert!(!reset);
        assert!(!clean);
        assert_eq!(format, SummaryFormat::Table);
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::try_parse_from([
            "flightdw",
            "query",
            "--warehouse",
            "dw.sqlite",
            "--query",
            "reporting",
            "--format",
            "csv",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Query { warehouse, query, format } = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(warehouse, PathBuf::from("dw.sqlite"));
        assert_eq!(query, "reporting");
        assert_eq!(format, ResultFormat::Csv);
    }

    #[test]
    fn test_unknown_source_rejected() {
        assert!(Cli::try_parse_from(["flightdw", "etl", "--source", "oracle"]).is_err());
    }
}
