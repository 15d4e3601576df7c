//! `flightdw etl` command implementation

use crate::error::{CliError, Result};
use crate::{output, SourceKind, SummaryFormat};
use chrono::{DateTime, Utc};
use flightdw_etl::{
    CleaningRules, CsvExtractor, Extractor, Pipeline, PostgresExtractor, RunOptions, SourceConfig,
    WarehouseConfig,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{info, warn};

/// Everything the `etl` subcommand was given.
#[derive(Debug, Clone)]
pub struct EtlArgs {
    pub source: SourceKind,
    pub config: PathBuf,
    pub data_dir: PathBuf,
    pub warehouse: PathBuf,
    pub reset: bool,
    pub clean: bool,
    pub batch_size: usize,
    pub load_timestamp: Option<String>,
    pub format: SummaryFormat,
}

/// Run the ETL and print its summary
pub async fn run(args: EtlArgs) -> Result<()> {
    let load_timestamp = parse_load_timestamp(args.load_timestamp.as_deref())?;
    let extractor = build_extractor(&args)?;

    let warehouse = WarehouseConfig {
        path: args.warehouse.clone(),
        reset: args.reset,
        batch_size: args.batch_size,
    };
    if args.reset {
        warn!(path = %args.warehouse.display(), "Resetting warehouse");
    }

    let rules = if args.clean {
        CleaningRules::all()
    } else {
        CleaningRules::default()
    };
    let options = RunOptions::new(load_timestamp)
        .with_rules(rules)
        .with_progress(std::io::stderr().is_terminal());

    let mut pipeline = Pipeline::new(extractor, warehouse, options);
    info!(run_id = %pipeline.run_id(), source = ?args.source, "Starting ETL run");
    let summary = pipeline.run().await?;

    let rendered = match args.format {
        SummaryFormat::Table => output::summary_as_table(&summary),
        SummaryFormat::Json => output::summary_as_json(&summary)?,
    };
    output::print(&rendered)
}

fn build_extractor(args: &EtlArgs) -> Result<Box<dyn Extractor>> {
    match args.source {
        SourceKind::Postgres => {
            let source = SourceConfig::load(&args.config)?;
            info!(source = %source, "Using PostgreSQL source");
            Ok(Box::new(PostgresExtractor::new(source, args.data_dir.clone())))
        }
        SourceKind::Csv => {
            info!(data_dir = %args.data_dir.display(), "Using CSV source");
            Ok(Box::new(CsvExtractor::new(args.data_dir.clone())))
        }
    }
}

fn parse_load_timestamp(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                CliError::invalid_argument(format!(
                    "--load-timestamp '{}' is not an RFC 3339 timestamp ({}), e.g. 2024-06-01T00:00:00Z",
                    raw, e
                ))
            }),
    }
}
