//! Run orchestration
//!
//! A [`Pipeline`] drives one ETL run through a strictly sequential state
//! machine:
//!
//! ```text
//! Idle -> Extracting -> Transforming -> LoadingDimensions -> LoadingFacts -> Done
//!   \________\______________\_________________\________________\-> Failed
//! ```
//!
//! The pipeline owns the warehouse connection for the whole run and releases
//! it on both terminal states. A failure is surfaced once, wrapped in
//! [`EtlError::Stage`] with the stage it happened in.

use crate::config::{RunOptions, WarehouseConfig};
use crate::dimension::{DimensionSet, DimensionStats};
use crate::error::{EtlError, Result};
use crate::extract::Extractor;
use crate::fact::{FactLoadReport, FactLoader};
use crate::progress::{create_progress_bar, create_spinner};
use crate::transform::{TransformContext, Transformer};
use crate::warehouse::Warehouse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Extracting,
    Transforming,
    LoadingDimensions,
    LoadingFacts,
    Done,
    Failed,
}

impl RunState {
    /// The state following this one on a successful run.
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Idle => Some(RunState::Extracting),
            RunState::Extracting => Some(RunState::Transforming),
            RunState::Transforming => Some(RunState::LoadingDimensions),
            RunState::LoadingDimensions => Some(RunState::LoadingFacts),
            RunState::LoadingFacts => Some(RunState::Done),
            RunState::Done | RunState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition_to(self, to: RunState) -> bool {
        match to {
            RunState::Failed => !self.is_terminal(),
            _ => self.next() == Some(to),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting",
            RunState::Transforming => "transforming",
            RunState::LoadingDimensions => "loading dimensions",
            RunState::LoadingFacts => "loading facts",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts reported at the end of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub load_timestamp: DateTime<Utc>,
    pub rows_extracted: usize,
    /// Source rows that passed validation
    pub rows_transformed: usize,
    pub rows_dropped: usize,
    pub dimensions: Vec<DimensionStats>,
    pub facts: Vec<FactLoadReport>,
    pub elapsed_ms: u128,
}

impl RunSummary {
    pub fn dimension(&self, name: &str) -> Option<&DimensionStats> {
        self.dimensions.iter().find(|d| d.dimension == name)
    }

    pub fn fact(&self, table: &str) -> Option<&FactLoadReport> {
        self.facts.iter().find(|f| f.table == table)
    }

    pub fn dimension_rows_inserted(&self) -> usize {
        self.dimensions.iter().map(|d| d.inserted).sum()
    }

    pub fn fact_rows_loaded(&self) -> usize {
        self.facts.iter().map(|f| f.loaded).sum()
    }

    pub fn fact_rows_rejected(&self) -> usize {
        self.facts.iter().map(|f| f.rejected).sum()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "{} rows extracted, {} transformed, {} dropped; {} dimension rows inserted; {} fact rows loaded, {} rejected",
            self.rows_extracted,
            self.rows_transformed,
            self.rows_dropped,
            self.dimension_rows_inserted(),
            self.fact_rows_loaded(),
            self.fact_rows_rejected()
        )
    }
}

pub struct Pipeline {
    extractor: Box<dyn Extractor>,
    warehouse_config: WarehouseConfig,
    options: RunOptions,
    state: RunState,
    run_id: Uuid,
}

impl Pipeline {
    pub fn new(extractor: Box<dyn Extractor>, warehouse_config: WarehouseConfig, options: RunOptions) -> Self {
        Self {
            extractor,
            warehouse_config,
            options,
            state: RunState::Idle,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn advance(&mut self, to: RunState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(EtlError::InvalidTransition { from: self.state, to });
        }
        info!(run_id = %self.run_id, from = %self.state, to = %to, "Run state changed");
        self.state = to;
        Ok(())
    }

    /// Execute the run from `Idle` to `Done`. A pipeline runs once.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        info!(
            run_id = %self.run_id,
            source = self.extractor.name(),
            warehouse = %self.warehouse_config.path.display(),
            load_timestamp = %self.options.load_timestamp,
            "Starting ETL run"
        );

        self.advance(RunState::Extracting)?;

        if let Err(err) = self.warehouse_config.validate() {
            return Err(self.fail(err));
        }
        let warehouse = match Warehouse::open(&self.warehouse_config).await {
            Ok(warehouse) => warehouse,
            Err(err) => return Err(self.fail(err)),
        };

        match self.stages(&warehouse, started).await {
            Ok(summary) => {
                warehouse.close().await;
                info!(
                    run_id = %self.run_id,
                    rows_extracted = summary.rows_extracted,
                    rows_transformed = summary.rows_transformed,
                    rows_dropped = summary.rows_dropped,
                    dimension_rows_inserted = summary.dimension_rows_inserted(),
                    fact_rows_loaded = summary.fact_rows_loaded(),
                    fact_rows_rejected = summary.fact_rows_rejected(),
                    elapsed_ms = summary.elapsed_ms as u64,
                    "ETL run complete"
                );
                Ok(summary)
            },
            Err(err) => {
                warehouse.close().await;
                Err(self.fail(err))
            },
        }
    }

    async fn stages(&mut self, warehouse: &Warehouse, started: Instant) -> Result<RunSummary> {
        let show_progress = self.options.show_progress;

        let spinner = create_spinner(show_progress, "Extracting source data");
        let raw = self.extractor.extract().await;
        spinner.finish_and_clear();
        let raw = raw?;
        let rows_extracted = raw.total_rows();
        info!(rows = rows_extracted, "Extraction complete");

        self.advance(RunState::Transforming)?;
        let transformer = Transformer::new(TransformContext {
            load_timestamp: self.options.load_timestamp,
            rules: self.options.rules,
        });
        let output = transformer.transform(&raw);
        drop(raw);

        self.advance(RunState::LoadingDimensions)?;
        let mut dims = DimensionSet::new();
        let progress = create_progress_bar(
            show_progress,
            output.dimensions.len() as u64,
            "Loading dimensions",
        );
        dims.load(warehouse, &output.dimensions, &progress).await?;
        progress.finish_and_clear();
        let dimensions = dims.stats();
        for stats in &dimensions {
            info!(
                dimension = stats.dimension,
                inserted = stats.inserted,
                reused = stats.reused,
                updated = stats.updated,
                "Dimension loaded"
            );
        }

        self.advance(RunState::LoadingFacts)?;
        let progress = create_progress_bar(show_progress, output.facts.len() as u64, "Loading facts");
        let facts = FactLoader::new(warehouse, self.warehouse_config.batch_size)
            .load_all(&output.facts, &dims, output.load_timestamp, &progress)
            .await?;
        progress.finish_and_clear();

        self.advance(RunState::Done)?;
        Ok(RunSummary {
            run_id: self.run_id,
            load_timestamp: output.load_timestamp,
            rows_extracted,
            rows_transformed: output.rows_accepted,
            rows_dropped: output.rows_dropped(),
            dimensions,
            facts,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    /// Move to `Failed` and tag `err` with the stage it interrupted.
    fn fail(&mut self, err: EtlError) -> EtlError {
        let stage = self.state;
        error!(run_id = %self.run_id, stage = %stage, error = %err, "ETL run failed");
        self.state = RunState::Failed;
        if stage.is_terminal() {
            return err;
        }
        EtlError::Stage {
            stage,
            source: Box::new(err),
        }
    }
}
