//! FlightDW ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch ETL from the operational flight, maintenance and logbook sources
//! into a star-schema warehouse (SQLite), plus the analytical queries run
//! against it.
//!
//! # Overview
//!
//! A run moves through four stages, driven by [`Pipeline`]:
//!
//! - **Extract**: an [`Extractor`] reads every source dataset into memory
//!   (PostgreSQL or CSV files)
//! - **Transform**: [`Transformer`] validates, cleans and aggregates raw rows
//!   into dimension rows and fact records; rejected rows are counted
//! - **Load dimensions**: [`DimensionSet`] resolves natural keys to surrogate
//!   keys through a per-run cache, overwriting changed attributes (Type 1)
//! - **Load facts**: [`FactLoader`] inserts fact rows in batches, rejecting
//!   offending rows without failing the load
//!
//! # Example
//!
//! ```no_run
//! use flightdw_etl::{CsvExtractor, Pipeline, RunOptions, WarehouseConfig};
//!
//! # async fn run() -> flightdw_etl::Result<()> {
//! let mut pipeline = Pipeline::new(
//!     Box::new(CsvExtractor::new("data")),
//!     WarehouseConfig::new("flightdw.sqlite"),
//!     RunOptions::new(chrono::Utc::now()),
//! );
//! let summary = pipeline.run().await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dimension;
pub mod error;
pub mod extract;
pub mod fact;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod queries;
pub mod transform;
pub mod warehouse;

pub use config::{RunOptions, SourceConfig, WarehouseConfig};
pub use dimension::{DimensionLoader, DimensionSet, DimensionStats, DimensionStore};
pub use error::{DropReason, EtlError, Result, ValidationError};
pub use extract::{CsvExtractor, Dataset, Extractor, PostgresExtractor, RawDatasets};
pub use fact::{FactLoadReport, FactLoader};
pub use orchestrator::{Pipeline, RunState, RunSummary};
pub use queries::{AnalyticalQuery, QueryResults};
pub use transform::{CleaningRules, TransformContext, TransformOutput, Transformer};
pub use warehouse::Warehouse;
