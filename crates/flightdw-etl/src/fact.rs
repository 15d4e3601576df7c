//! Fact loading with partial success
//!
//! Fact records arrive keyed by natural keys. Each one is bound to surrogate
//! keys through the run's [`DimensionSet`] cache, then written in multi-row
//! `INSERT`s inside a single transaction.
//!
//! A row that cannot be bound, or that the warehouse rejects with a
//! constraint violation, is counted in [`FactLoadReport::rejected`] and the
//! rest of the batch still lands: each batch runs under a savepoint and is
//! replayed row by row when one of its rows is refused. Any other failure
//! rolls back the table's whole load and aborts the run.

use crate::dimension::{DimensionSet, SqlValue, SurrogateKey};
use crate::error::{is_row_level, EtlError, Result};
use crate::transform::{
    DailyOperationsRecord, FactRecords, FlightLegRecord, LogbookRecord, MonthlySummaryRecord,
};
use crate::warehouse::Warehouse;
use chrono::{DateTime, SecondsFormat, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

/// SQLite's default cap on bound parameters per statement.
const MAX_BIND_PARAMS: usize = 32_766;
/// Rejection messages kept per table.
const SAMPLE_ERRORS: usize = 5;

/// A fact row ready for insertion: surrogate keys and measures only.
pub trait FactRow: Send + Sync {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// One value per column, in [`COLUMNS`](Self::COLUMNS) order.
    fn values(&self) -> Vec<SqlValue>;

    /// Short identification for rejection messages.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightLegFact {
    pub flight_id: i64,
    pub aircraft_id: SurrogateKey,
    pub departure_airport_id: SurrogateKey,
    pub arrival_airport_id: SurrogateKey,
    pub duration_minutes: i64,
    pub load_timestamp: String,
}

impl FlightLegFact {
    pub fn bind(record: &FlightLegRecord, dims: &DimensionSet, load_timestamp: &str) -> Result<Self> {
        Ok(Self {
            flight_id: record.flight_id,
            aircraft_id: dims.aircraft.require(&record.aircraft)?,
            departure_airport_id: dims.airports.require(&record.departure_airport)?,
            arrival_airport_id: dims.airports.require(&record.arrival_airport)?,
            duration_minutes: record.duration_minutes,
            load_timestamp: load_timestamp.to_string(),
        })
    }
}

impl FactRow for FlightLegFact {
    const TABLE: &'static str = "Flight_Legs";
    const COLUMNS: &'static [&'static str] = &[
        "Flight_ID",
        "Aircraft_ID",
        "Departure_Airport_ID",
        "Arrival_Airport_ID",
        "Duration_Minutes",
        "Load_Timestamp",
    ];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.flight_id.into(),
            self.aircraft_id.into(),
            self.departure_airport_id.into(),
            self.arrival_airport_id.into(),
            self.duration_minutes.into(),
            self.load_timestamp.as_str().into(),
        ]
    }

    fn describe(&self) -> String {
        format!("flight {}", self.flight_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyOperationsFact {
    pub date_id: SurrogateKey,
    pub aircraft_id: SurrogateKey,
    pub flight_hours: f64,
    pub takeoffs: i64,
    pub delayed_cycles: i64,
    pub cancelled_cycles: i64,
    pub total_delay_minutes: i64,
}

impl DailyOperationsFact {
    pub fn bind(record: &DailyOperationsRecord, dims: &DimensionSet) -> Result<Self> {
        Ok(Self {
            date_id: dims.dates.require(&record.date)?,
            aircraft_id: dims.aircraft.require(&record.aircraft)?,
            flight_hours: record.flight_hours,
            takeoffs: record.takeoffs,
            delayed_cycles: record.delayed_cycles,
            cancelled_cycles: record.cancelled_cycles,
            total_delay_minutes: record.total_delay_minutes,
        })
    }
}

impl FactRow for DailyOperationsFact {
    const TABLE: &'static str = "Flight_Operations_Daily";
    const COLUMNS: &'static [&'static str] =
        &["Date_ID", "Aircraft_ID", "FH", "Takeoffs", "DFC", "CFC", "TDM"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.date_id.into(),
            self.aircraft_id.into(),
            self.flight_hours.into(),
            self.takeoffs.into(),
            self.delayed_cycles.into(),
            self.cancelled_cycles.into(),
            self.total_delay_minutes.into(),
        ]
    }

    fn describe(&self) -> String {
        format!("date {} aircraft {}", self.date_id, self.aircraft_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummaryFact {
    pub month_id: SurrogateKey,
    pub aircraft_id: SurrogateKey,
    pub adis: f64,
    pub adoss: f64,
    pub adosu: f64,
}

impl MonthlySummaryFact {
    pub fn bind(record: &MonthlySummaryRecord, dims: &DimensionSet) -> Result<Self> {
        Ok(Self {
            month_id: dims.months.require(&record.month)?,
            aircraft_id: dims.aircraft.require(&record.aircraft)?,
            adis: record.adis,
            adoss: record.adoss,
            adosu: record.adosu,
        })
    }
}

impl FactRow for MonthlySummaryFact {
    const TABLE: &'static str = "Aircraft_Monthly_Summary";
    const COLUMNS: &'static [&'static str] = &["Month_ID", "Aircraft_ID", "ADIS", "ADOSS", "ADOSU"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.month_id.into(),
            self.aircraft_id.into(),
            self.adis.into(),
            self.adoss.into(),
            self.adosu.into(),
        ]
    }

    fn describe(&self) -> String {
        format!("month {} aircraft {}", self.month_id, self.aircraft_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogbookFact {
    pub month_id: SurrogateKey,
    pub aircraft_id: SurrogateKey,
    pub reporter_id: SurrogateKey,
    pub log_count: i64,
}

impl LogbookFact {
    pub fn bind(record: &LogbookRecord, dims: &DimensionSet) -> Result<Self> {
        Ok(Self {
            month_id: dims.months.require(&record.month)?,
            aircraft_id: dims.aircraft.require(&record.aircraft)?,
            reporter_id: dims.reporters.require(&record.reporter)?,
            log_count: record.log_count,
        })
    }
}

impl FactRow for LogbookFact {
    const TABLE: &'static str = "Logbooks";
    const COLUMNS: &'static [&'static str] = &["Month_ID", "Aircraft_ID", "Reporter_ID", "Log_Count"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.month_id.into(),
            self.aircraft_id.into(),
            self.reporter_id.into(),
            self.log_count.into(),
        ]
    }

    fn describe(&self) -> String {
        format!(
            "month {} aircraft {} reporter {}",
            self.month_id, self.aircraft_id, self.reporter_id
        )
    }
}

/// Outcome of loading one fact table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FactLoadReport {
    pub table: &'static str,
    pub loaded: usize,
    pub rejected: usize,
    /// First few rejection messages
    pub sample_errors: Vec<String>,
}

impl FactLoadReport {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            ..Self::default()
        }
    }

    fn reject(&mut self, message: String) {
        debug!(table = self.table, %message, "Fact row rejected");
        self.rejected += 1;
        if self.sample_errors.len() < SAMPLE_ERRORS {
            self.sample_errors.push(message);
        }
    }
}

pub struct FactLoader<'a> {
    warehouse: &'a Warehouse,
    batch_size: usize,
}

impl<'a> FactLoader<'a> {
    pub fn new(warehouse: &'a Warehouse, batch_size: usize) -> Self {
        Self {
            warehouse,
            batch_size: batch_size.max(1),
        }
    }

    /// Load every fact table, in dependency-free order.
    pub async fn load_all(
        &self,
        facts: &FactRecords,
        dims: &DimensionSet,
        load_timestamp: DateTime<Utc>,
        progress: &ProgressBar,
    ) -> Result<Vec<FactLoadReport>> {
        let stamp = load_timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);

        Ok(vec![
            self.load(
                &facts.flight_legs,
                |r| FlightLegFact::bind(r, dims, &stamp),
                progress,
            )
            .await?,
            self.load(
                &facts.daily_operations,
                |r| DailyOperationsFact::bind(r, dims),
                progress,
            )
            .await?,
            self.load(
                &facts.monthly_summaries,
                |r| MonthlySummaryFact::bind(r, dims),
                progress,
            )
            .await?,
            self.load(&facts.logbooks, |r| LogbookFact::bind(r, dims), progress)
                .await?,
        ])
    }

    /// Bind and insert `records` into `F::TABLE`.
    pub async fn load<R, F>(
        &self,
        records: &[R],
        bind: impl Fn(&R) -> Result<F>,
        progress: &ProgressBar,
    ) -> Result<FactLoadReport>
    where
        F: FactRow,
    {
        let mut report = FactLoadReport::new(F::TABLE);

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match bind(record) {
                Ok(row) => rows.push(row),
                Err(err @ EtlError::ReferentialIntegrity { .. }) => {
                    report.reject(err.to_string());
                    progress.inc(1);
                },
                Err(err) => return Err(err),
            }
        }

        let chunk_size = self.batch_size.min(MAX_BIND_PARAMS / F::COLUMNS.len()).max(1);
        let mut tx = self.warehouse.pool().begin().await?;

        for chunk in rows.chunks(chunk_size) {
            execute(&mut tx, "SAVEPOINT fact_batch").await?;
            match insert_rows(&mut tx, chunk).await {
                Ok(()) => {
                    execute(&mut tx, "RELEASE fact_batch").await?;
                    report.loaded += chunk.len();
                },
                Err(err) if is_row_level(&err) => {
                    debug!(table = F::TABLE, error = %err, "Batch refused, retrying row by row");
                    execute(&mut tx, "ROLLBACK TO fact_batch").await?;
                    execute(&mut tx, "RELEASE fact_batch").await?;
                    for row in chunk {
                        self.insert_one(&mut tx, row, &mut report).await?;
                    }
                },
                Err(err) => {
                    return Err(EtlError::storage(format!("Loading {} failed: {}", F::TABLE, err)));
                },
            }
            progress.inc(chunk.len() as u64);
        }

        tx.commit().await?;

        if report.rejected > 0 {
            warn!(
                table = F::TABLE,
                loaded = report.loaded,
                rejected = report.rejected,
                "Fact rows rejected"
            );
        } else {
            info!(table = F::TABLE, loaded = report.loaded, "Fact table loaded");
        }
        Ok(report)
    }

    async fn insert_one<F: FactRow>(
        &self,
        conn: &mut SqliteConnection,
        row: &F,
        report: &mut FactLoadReport,
    ) -> Result<()> {
        execute(conn, "SAVEPOINT fact_row").await?;
        match insert_rows(conn, std::slice::from_ref(row)).await {
            Ok(()) => {
                execute(conn, "RELEASE fact_row").await?;
                report.loaded += 1;
            },
            Err(err) if is_row_level(&err) => {
                execute(conn, "ROLLBACK TO fact_row").await?;
                execute(conn, "RELEASE fact_row").await?;
                report.reject(format!("{}: {}", row.describe(), err));
            },
            Err(err) => {
                return Err(EtlError::storage(format!("Loading {} failed: {}", F::TABLE, err)));
            },
        }
        Ok(())
    }
}

async fn execute(conn: &mut SqliteConnection, statement: &'static str) -> Result<()> {
    sqlx::query(statement).execute(conn).await?;
    Ok(())
}

async fn insert_rows<F: FactRow>(conn: &mut SqliteConnection, rows: &[F]) -> std::result::Result<(), sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", F::TABLE, F::COLUMNS.join(", ")));

    builder.push_values(rows, |mut b, row| {
        for value in row.values() {
            value.push_to(&mut b);
        }
    });

    builder.build().execute(conn).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::WarehouseConfig;
    use crate::model::{AircraftAttributes, ReporterClass, ReporterKey, YearMonth};

    async fn warehouse_with(dims: &mut DimensionSet) -> (tempfile::TempDir, Warehouse) {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = Warehouse::open(&WarehouseConfig::new(dir.path().join("dw.sqlite")))
            .await
            .unwrap();

        dims.aircraft
            .resolve(&warehouse, &"N12345".to_string(), &AircraftAttributes::default())
            .await
            .unwrap();
        for airport in ["JFK", "LAX"] {
            dims.airports.resolve(&warehouse, &airport.to_string(), &()).await.unwrap();
        }
        dims.months
            .resolve(&warehouse, &YearMonth::new(2024, 1), &())
            .await
            .unwrap();
        (dir, warehouse)
    }

    fn leg(flight_id: i64, to: &str, minutes: i64) -> FlightLegRecord {
        FlightLegRecord {
            flight_id,
            aircraft: "N12345".into(),
            departure_airport: "JFK".into(),
            arrival_airport: to.into(),
            duration_minutes: minutes,
        }
    }

    #[tokio::test]
    async fn test_unresolved_natural_key_is_rejected_not_fatal() {
        let mut dims = DimensionSet::new();
        let (_dir, warehouse) = warehouse_with(&mut dims).await;
        let loader = FactLoader::new(&warehouse, 100);

        let records = vec![leg(1, "LAX", 180), leg(2, "SFO", 60)];
        let report = loader
            .load(&records, |r| FlightLegFact::bind(r, &dims, "2024-06-01T00:00:00Z"), &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(report.loaded, 1);
        assert_eq!(report.rejected, 1);
        assert!(report.sample_errors[0].contains("airport"));
        assert_eq!(warehouse.count_rows("Flight_Legs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_constraint_violation_keeps_the_rest_of_the_batch() {
        let mut dims = DimensionSet::new();
        let (_dir, warehouse) = warehouse_with(&mut dims).await;
        let loader = FactLoader::new(&warehouse, 100);

        // The CHECK on Duration_Minutes refuses the middle row.
        let records = vec![leg(1, "LAX", 180), leg(2, "LAX", -5), leg(3, "LAX", 60)];
        let report = loader
            .load(&records, |r| FlightLegFact::bind(r, &dims, "2024-06-01T00:00:00Z"), &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(report.rejected, 1);
        assert!(report.sample_errors[0].starts_with("flight 2"));
        assert_eq!(warehouse.count_rows("Flight_Legs").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_primary_key_across_loads_is_rejected() {
        let mut dims = DimensionSet::new();
        let (_dir, warehouse) = warehouse_with(&mut dims).await;
        dims.reporters
            .resolve(&warehouse, &ReporterKey::new(ReporterClass::Pirep, None), &())
            .await
            .unwrap();
        let loader = FactLoader::new(&warehouse, 1);
        let records = vec![LogbookRecord {
            month: YearMonth::new(2024, 1),
            aircraft: "N12345".into(),
            reporter: ReporterKey::new(ReporterClass::Pirep, None),
            log_count: 3,
        }];

        let first = loader
            .load(&records, |r| LogbookFact::bind(r, &dims), &ProgressBar::hidden())
            .await
            .unwrap();
        let second = loader
            .load(&records, |r| LogbookFact::bind(r, &dims), &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!((first.loaded, first.rejected), (1, 0));
        assert_eq!((second.loaded, second.rejected), (0, 1));
        assert_eq!(warehouse.count_rows("Logbooks").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_small_batches_load_everything() {
        let mut dims = DimensionSet::new();
        let (_dir, warehouse) = warehouse_with(&mut dims).await;
        let loader = FactLoader::new(&warehouse, 2);

        let records: Vec<_> = (1..=5).map(|id| leg(id, "LAX", 30)).collect();
        let report = loader
            .load(&records, |r| FlightLegFact::bind(r, &dims, "2024-06-01T00:00:00Z"), &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(report.loaded, 5);
        assert_eq!(warehouse.count_rows("Flight_Legs").await.unwrap(), 5);
    }

    #[test]
    fn test_sample_errors_are_capped() {
        let mut report = FactLoadReport::new("Logbooks");
        for i in 0..8 {
            report.reject(format!("row {}", i));
        }

        assert_eq!(report.rejected, 8);
        assert_eq!(report.sample_errors.len(), SAMPLE_ERRORS);
    }
}
