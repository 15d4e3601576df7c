//! Error types for the FlightDW CLI
//!
//! Library errors are wrapped with a hint on what to check next. The message
//! is printed once, on stderr, right before the process exits with status 1.

use flightdw_etl::EtlError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// The ETL pipeline failed
    #[error("{0}. {hint}", hint = etl_hint(.0))]
    Etl(#[from] EtlError),

    /// A command-line value could not be interpreted
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Warehouse file is missing for a query run
    #[error("Warehouse '{0}' not found. Run 'flightdw etl' first to build it.")]
    WarehouseNotFound(String),

    /// Writing results failed
    #[error("Failed to write output: {0}")]
    Output(String),

    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }
}

impl From<csv::Error> for CliError {
    fn from(err: csv::Error) -> Self {
        Self::Output(err.to_string())
    }
}

fn etl_hint(err: &EtlError) -> &'static str {
    match err.root() {
        EtlError::Connection(_) => "Check the host, port and credentials in the database configuration file",
        EtlError::Config(_) => "Check the command-line options and the database configuration file",
        EtlError::DataFormat { .. } => "Check that the source files exist and have the expected header row",
        EtlError::Storage(_) => "Check the warehouse file, or rerun with --reset to rebuild it",
        _ => "Rerun with --verbose for details",
    }
}
