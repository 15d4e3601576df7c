//! Pipeline configuration
//!
//! Nothing here is global: the CLI builds these structs once and hands them to
//! the extractor, the warehouse and the orchestrator.

use crate::error::{EtlError, Result};
use crate::transform::CleaningRules;
use chrono::{DateTime, Utc};
use config::{Environment, File, FileFormat};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_SOURCE_CONFIG_FILE: &str = "db_conf.txt";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_WAREHOUSE_PATH: &str = "flightdw.sqlite";
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_SOURCE_PORT: u16 = 5432;

/// Environment variables with this prefix override the connection file,
/// e.g. `FLIGHTDW_SOURCE_PASSWORD`.
pub const SOURCE_ENV_PREFIX: &str = "FLIGHTDW_SOURCE";

/// Connection parameters of the operational source database.
///
/// Read from a flat `key=value` file:
///
/// ```text
/// dbname=flights
/// user=etl
/// password=secret
/// ip=10.0.0.5
/// port=5432
/// ```
#[derive(Clone, Deserialize)]
pub struct SourceConfig {
    pub dbname: String,
    pub user: String,
    pub password: String,
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_SOURCE_PORT
}

impl SourceConfig {
    /// Load the connection file, then apply `FLIGHTDW_SOURCE_*` overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EtlError::config(format!(
                "Database configuration file '{}' not found",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini).required(true))
            .add_source(Environment::with_prefix(SOURCE_ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| {
                EtlError::config(format!("Failed to read '{}': {}", path.display(), e))
            })?;

        let source: SourceConfig = settings.try_deserialize().map_err(|e| {
            EtlError::config(format!(
                "Database configuration file '{}' is not properly formatted: {}",
                path.display(),
                e
            ))
        })?;

        source.validate()?;
        Ok(source)
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [("dbname", &self.dbname), ("user", &self.user), ("host", &self.host)] {
            if value.trim().is_empty() {
                return Err(EtlError::config(format!("'{}' must not be empty", key)));
            }
        }
        if self.port == 0 {
            return Err(EtlError::config("'port' must be between 1 and 65535"));
        }
        Ok(())
    }

    /// Connection options for a read-only session.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname)
            .application_name("flightdw-etl")
            .options([("default_transaction_read_only", "on")])
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.dbname)
    }
}

/// Embedded warehouse settings.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub path: PathBuf,
    /// Delete the warehouse file before opening it
    pub reset: bool,
    /// Rows per multi-row INSERT when loading facts
    pub batch_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_WAREHOUSE_PATH),
            reset: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl WarehouseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EtlError::config("batch size must be at least 1"));
        }
        if self.path.as_os_str().is_empty() {
            return Err(EtlError::config("warehouse path must not be empty"));
        }
        Ok(())
    }
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stamped on every flight-leg fact; the pipeline never reads the clock itself
    pub load_timestamp: DateTime<Utc>,
    pub rules: CleaningRules,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn new(load_timestamp: DateTime<Utc>) -> Self {
        Self {
            load_timestamp,
            rules: CleaningRules::default(),
            show_progress: false,
        }
    }

    pub fn with_rules(mut self, rules: CleaningRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}
