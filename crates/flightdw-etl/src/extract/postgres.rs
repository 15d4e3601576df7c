use super::{read_csv, Dataset, Extractor, RawDatasets, RawFlight, RawMaintenance, RawReport};
use crate::config::SourceConfig;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Timestamps and flags are cast to text so every column decodes as
// Option<String>, matching the CSV exports of the same tables.
const FLIGHTS_QUERY: &str = r#"
    SELECT id::text                  AS flight_id,
           aircraftregistration::text AS aircraft_registration,
           departure::text            AS departure_airport,
           arrival::text              AS arrival_airport,
           scheduleddeparture::text   AS scheduled_departure,
           scheduledarrival::text     AS scheduled_arrival,
           actualdeparture::text      AS actual_departure,
           actualarrival::text        AS actual_arrival,
           cancelled::text            AS cancelled,
           delaycode::text            AS delay_code
    FROM "AIMS".flights
    ORDER BY id
"#;

const MAINTENANCE_QUERY: &str = r#"
    SELECT aircraftregistration::text AS aircraft_registration,
           scheduleddeparture::text   AS scheduled_departure,
           scheduledarrival::text     AS scheduled_arrival,
           programmed::text           AS programmed
    FROM "AIMS".maintenance
    ORDER BY aircraftregistration, scheduleddeparture
"#;

const REPORTS_QUERY: &str = r#"
    SELECT p.pfrid::text                AS report_id,
           p.aircraftregistration::text AS aircraft_registration,
           p.reportingdate::text        AS reporting_date,
           p.reporteurclass::text       AS reporter_class,
           p.reporteurid::text          AS reporter_id,
           t.executionplace::text       AS execution_place
    FROM "AMOS".postflightreports p
    LEFT JOIN "AMOS".technicallogbookorders t ON t.workorderid = p.tlborder
    ORDER BY p.pfrid
"#;

/// Reads flights, maintenance and post-flight reports from the operational
/// Postgres database; reference files come from `reference_dir`.
#[derive(Debug, Clone)]
pub struct PostgresExtractor {
    source: SourceConfig,
    reference_dir: PathBuf,
}

impl PostgresExtractor {
    pub fn new(source: SourceConfig, reference_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            reference_dir: reference_dir.into(),
        }
    }

    async fn connect(&self) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(self.source.connect_options())
            .await
            .map_err(|e| {
                EtlError::connection(format!(
                    "Unable to connect to the source database {}: {}",
                    self.source, e
                ))
            })
    }

    async fn read_tables(
        pool: &PgPool,
    ) -> Result<(Vec<RawFlight>, Vec<RawMaintenance>, Vec<RawReport>)> {
        let flights = sqlx::query_as::<_, RawFlight>(FLIGHTS_QUERY)
            .fetch_all(pool)
            .await
            .map_err(|e| source_error(Dataset::Flights, e))?;
        let maintenance = sqlx::query_as::<_, RawMaintenance>(MAINTENANCE_QUERY)
            .fetch_all(pool)
            .await
            .map_err(|e| source_error(Dataset::Maintenance, e))?;
        let reports = sqlx::query_as::<_, RawReport>(REPORTS_QUERY)
            .fetch_all(pool)
            .await
            .map_err(|e| source_error(Dataset::PostFlightReports, e))?;

        Ok((flights, maintenance, reports))
    }
}

/// Broken connections stay connection errors; anything else means the
/// source tables do not have the expected shape.
fn source_error(dataset: Dataset, err: sqlx::Error) -> EtlError {
    match EtlError::from(err) {
        EtlError::Storage(message) => EtlError::data_format(dataset, message),
        other => other,
    }
}

#[async_trait]
impl Extractor for PostgresExtractor {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self), fields(source = %self.source))]
    async fn extract(&self) -> Result<RawDatasets> {
        let pool = self.connect().await?;
        info!("Connected to source database");

        let tables = Self::read_tables(&pool).await;
        pool.close().await;
        let (flights, maintenance, reports) = tables?;

        let aircraft = read_csv(
            Dataset::AircraftReference,
            &self.reference_dir.join(Dataset::AircraftReference.file_name()),
        )?;
        let personnel = read_csv(
            Dataset::MaintenancePersonnel,
            &self.reference_dir.join(Dataset::MaintenancePersonnel.file_name()),
        )?;

        let datasets = RawDatasets {
            flights,
            maintenance,
            reports,
            aircraft,
            personnel,
        };
        info!(rows = datasets.total_rows(), "Source extraction complete");
        Ok(datasets)
    }
}
