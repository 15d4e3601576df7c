//! Error taxonomy of the ETL pipeline
//!
//! Only [`ValidationError`] is row-level: the transformer records it, drops the
//! row and moves on. Everything else reaching the orchestrator aborts the run
//! and is surfaced once, wrapped in [`EtlError::Stage`].

use crate::extract::Dataset;
use crate::orchestrator::RunState;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Source database or warehouse unreachable, or credentials rejected
    #[error("Connection error: {0}")]
    Connection(String),

    /// An input file cannot be parsed into the expected columns
    #[error("Data format error in {dataset}: {message}")]
    DataFormat { dataset: Dataset, message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Warehouse read or write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A fact references a natural key that was never resolved in this run
    #[error("Referential integrity violation: no {dimension} row for natural key {key}")]
    ReferentialIntegrity { dimension: &'static str, key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid run state transition from {from} to {to}")]
    InvalidTransition { from: RunState, to: RunState },

    /// Terminal failure of a run, tagged with the stage it happened in
    #[error("ETL run failed while {stage}: {source}")]
    Stage {
        stage: RunState,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data_format(dataset: Dataset, msg: impl Into<String>) -> Self {
        Self::DataFormat {
            dataset,
            message: msg.into(),
        }
    }

    /// The stage a terminal failure happened in, if this is one.
    pub fn stage(&self) -> Option<RunState> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost cause, looking through [`EtlError::Stage`] wrappers.
    pub fn root(&self) -> &EtlError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::Connection(err.to_string()),
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for EtlError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(format!("Warehouse schema migration failed: {}", err))
    }
}

/// Whether a database error rejects only the offending row (constraint
/// violations) rather than the whole load.
pub fn is_row_level(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| {
        matches!(
            db.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        )
    })
}

/// A source row that broke a business rule. The row is dropped and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{dataset} record {record}: {reason}")]
pub struct ValidationError {
    pub dataset: Dataset,
    /// Identifier of the offending row (business id, or its 1-based position)
    pub record: String,
    pub reason: DropReason,
}

impl ValidationError {
    pub fn new(dataset: Dataset, record: impl Into<String>, reason: DropReason) -> Self {
        Self {
            dataset,
            record: record.into(),
            reason,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has unparseable value '{value}'")]
    Unparseable { field: &'static str, value: String },

    #[error("field '{field}' value '{value}' is out of domain")]
    OutOfDomain { field: &'static str, value: String },

    #[error("arrival precedes departure by {minutes} minutes")]
    NegativeDuration { minutes: i64 },

    #[error("duplicate of an earlier record")]
    Duplicate,

    #[error("overlaps the next flight of the same aircraft")]
    OverlappingFlight,

    #[error("aircraft '{0}' is not in the aircraft reference")]
    UnknownAircraft(String),
}
