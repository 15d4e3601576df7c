//! Extraction of raw source records
//!
//! Two extractors produce the same [`RawDatasets`]: [`PostgresExtractor`]
//! reads the operational tables of the source database, [`CsvExtractor`]
//! reads CSV exports of the same tables. Both read the two reference files
//! (aircraft manufacturer lookup and maintenance personnel) from disk.
//!
//! Raw records are deliberately loose: every field is an optional string and
//! all coercion happens in the transformer, where bad rows can be dropped one
//! by one instead of failing the whole extraction.

mod csv_source;
mod postgres;

pub use csv_source::{read_csv, CsvExtractor};
pub use postgres::PostgresExtractor;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical input datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Flights,
    Maintenance,
    PostFlightReports,
    AircraftReference,
    MaintenancePersonnel,
}

impl Dataset {
    pub const ALL: [Dataset; 5] = [
        Dataset::Flights,
        Dataset::Maintenance,
        Dataset::PostFlightReports,
        Dataset::AircraftReference,
        Dataset::MaintenancePersonnel,
    ];

    /// File name of the dataset inside a data directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Dataset::Flights => "flights.csv",
            Dataset::Maintenance => "maintenance.csv",
            Dataset::PostFlightReports => "postflightreports.csv",
            Dataset::AircraftReference => "aircraft_manufacturerinfo-lookup.csv",
            Dataset::MaintenancePersonnel => "maintenance_personnel.csv",
        }
    }

    /// Header columns a CSV file of this dataset must carry.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Dataset::Flights => &[
                "flight_id",
                "aircraft_registration",
                "departure_airport",
                "arrival_airport",
                "scheduled_departure",
                "scheduled_arrival",
                "actual_departure",
                "actual_arrival",
                "cancelled",
            ],
            Dataset::Maintenance => &[
                "aircraft_registration",
                "scheduled_departure",
                "scheduled_arrival",
                "programmed",
            ],
            Dataset::PostFlightReports => &[
                "report_id",
                "aircraft_registration",
                "reporting_date",
                "reporter_class",
                "reporter_id",
            ],
            Dataset::AircraftReference => &[
                "aircraft_reg_code",
                "manufacturer_serial_number",
                "aircraft_model",
                "aircraft_manufacturer",
            ],
            Dataset::MaintenancePersonnel => &["reporteurid", "airport"],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dataset::Flights => "flights",
            Dataset::Maintenance => "maintenance",
            Dataset::PostFlightReports => "post-flight reports",
            Dataset::AircraftReference => "aircraft reference",
            Dataset::MaintenancePersonnel => "maintenance personnel",
        })
    }
}

/// One row of `"AIMS".flights`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct RawFlight {
    pub flight_id: Option<String>,
    pub aircraft_registration: Option<String>,
    pub departure_airport: Option<String>,
    pub arrival_airport: Option<String>,
    pub scheduled_departure: Option<String>,
    pub scheduled_arrival: Option<String>,
    pub actual_departure: Option<String>,
    pub actual_arrival: Option<String>,
    pub cancelled: Option<String>,
    pub delay_code: Option<String>,
}

/// One row of `"AIMS".maintenance`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct RawMaintenance {
    #[sqlx(default)]
    pub maintenance_id: Option<String>,
    pub aircraft_registration: Option<String>,
    pub scheduled_departure: Option<String>,
    pub scheduled_arrival: Option<String>,
    pub programmed: Option<String>,
}

/// One row of `"AMOS".postflightreports`, with the execution place of its
/// technical logbook order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct RawReport {
    pub report_id: Option<String>,
    pub aircraft_registration: Option<String>,
    pub reporting_date: Option<String>,
    pub reporter_class: Option<String>,
    pub reporter_id: Option<String>,
    pub execution_place: Option<String>,
}

/// One row of the aircraft manufacturer lookup file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawAircraft {
    pub aircraft_reg_code: Option<String>,
    pub manufacturer_serial_number: Option<String>,
    pub aircraft_model: Option<String>,
    pub aircraft_manufacturer: Option<String>,
}

/// One row of the maintenance personnel file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawPersonnel {
    pub reporteurid: Option<String>,
    pub airport: Option<String>,
}

/// Everything one run extracts.
#[derive(Debug, Clone, Default)]
pub struct RawDatasets {
    pub flights: Vec<RawFlight>,
    pub maintenance: Vec<RawMaintenance>,
    pub reports: Vec<RawReport>,
    pub aircraft: Vec<RawAircraft>,
    pub personnel: Vec<RawPersonnel>,
}

impl RawDatasets {
    pub fn rows(&self, dataset: Dataset) -> usize {
        match dataset {
            Dataset::Flights => self.flights.len(),
            Dataset::Maintenance => self.maintenance.len(),
            Dataset::PostFlightReports => self.reports.len(),
            Dataset::AircraftReference => self.aircraft.len(),
            Dataset::MaintenancePersonnel => self.personnel.len(),
        }
    }

    pub fn total_rows(&self) -> usize {
        Dataset::ALL.iter().map(|d| self.rows(*d)).sum()
    }
}

/// A source of raw records.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read every dataset. Fails on the first unreachable source or
    /// malformed file; nothing is retried.
    async fn extract(&self) -> Result<RawDatasets>;
}
