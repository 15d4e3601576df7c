//! Shared fixtures for the flightdw-etl integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Utc};
use flightdw_etl::{CsvExtractor, Pipeline, RunOptions, Warehouse, WarehouseConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FLIGHTS_HEADER: &str = "flight_id,aircraft_registration,departure_airport,arrival_airport,scheduled_departure,scheduled_arrival,actual_departure,actual_arrival,cancelled,delay_code";
pub const MAINTENANCE_HEADER: &str = "aircraft_registration,scheduled_departure,scheduled_arrival,programmed";
pub const REPORTS_HEADER: &str =
    "report_id,aircraft_registration,reporting_date,reporter_class,reporter_id,execution_place";
pub const AIRCRAFT_HEADER: &str =
    "aircraft_reg_code,manufacturer_serial_number,aircraft_model,aircraft_manufacturer";
pub const PERSONNEL_HEADER: &str = "reporteurid,airport";

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,flightdw_etl=info")),
        )
        .with_test_writer()
        .try_init();
}

/// A scratch directory holding the five source CSV files and the warehouse.
pub struct Fixture {
    dir: TempDir,
    flights: Vec<String>,
    maintenance: Vec<String>,
    reports: Vec<String>,
    aircraft: Vec<String>,
    personnel: Vec<String>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            flights: Vec::new(),
            maintenance: Vec::new(),
            reports: Vec::new(),
            aircraft: Vec::new(),
            personnel: Vec::new(),
        }
    }

    /// The canonical single flight: 100, N12345, JFK -> LAX, 10:00 -> 13:00.
    pub fn single_flight() -> Self {
        let mut fixture = Self::new();
        fixture.flight("100", "N12345", "JFK", "LAX", "2024-01-01T10:00", "2024-01-01T13:00");
        fixture
    }

    /// A flight that operated on schedule.
    pub fn flight(&mut self, id: &str, tail: &str, from: &str, to: &str, dep: &str, arr: &str) -> &mut Self {
        self.flights
            .push(format!("{id},{tail},{from},{to},{dep},{arr},{dep},{arr},false,"));
        self
    }

    /// A flight that departed on time and landed at `arr` instead of `sched_arr`.
    pub fn delayed_flight(&mut self, id: &str, tail: &str, dep: &str, sched_arr: &str, arr: &str) -> &mut Self {
        self.flights
            .push(format!("{id},{tail},JFK,BOS,{dep},{sched_arr},{dep},{arr},false,"));
        self
    }

    pub fn maintenance(&mut self, tail: &str, start: &str, end: &str, programmed: bool) -> &mut Self {
        self.maintenance.push(format!("{tail},{start},{end},{programmed}"));
        self
    }

    pub fn report(&mut self, id: &str, tail: &str, date: &str, class: &str, reporter: &str, place: &str) -> &mut Self {
        self.reports
            .push(format!("{id},{tail},{date},{class},{reporter},{place}"));
        self
    }

    pub fn aircraft(&mut self, tail: &str, serial: &str, model: &str, manufacturer: &str) -> &mut Self {
        self.aircraft
            .push(format!("{tail},{serial},{model},{manufacturer}"));
        self
    }

    pub fn personnel(&mut self, reporter: &str, airport: &str) -> &mut Self {
        self.personnel.push(format!("{reporter},{airport}"));
        self
    }

    /// Drop previously added reference aircraft (to simulate a changed file).
    pub fn clear_aircraft(&mut self) -> &mut Self {
        self.aircraft.clear();
        self
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn warehouse_path(&self) -> PathBuf {
        self.dir.path().join("flightdw.sqlite")
    }

    /// (Re)write every CSV file from the rows added so far.
    pub fn write(&self) -> &Path {
        let data = self.data_dir();
        fs::create_dir_all(&data).unwrap();
        write_csv(&data.join("flights.csv"), FLIGHTS_HEADER, &self.flights);
        write_csv(&data.join("maintenance.csv"), MAINTENANCE_HEADER, &self.maintenance);
        write_csv(&data.join("postflightreports.csv"), REPORTS_HEADER, &self.reports);
        write_csv(
            &data.join("aircraft_manufacturerinfo-lookup.csv"),
            AIRCRAFT_HEADER,
            &self.aircraft,
        );
        write_csv(&data.join("maintenance_personnel.csv"), PERSONNEL_HEADER, &self.personnel);
        self.dir.path()
    }

    pub fn pipeline(&self) -> Pipeline {
        self.write();
        Pipeline::new(
            Box::new(CsvExtractor::new(self.data_dir())),
            WarehouseConfig::new(self.warehouse_path()),
            RunOptions::new(load_timestamp()),
        )
    }

    pub async fn warehouse(&self) -> Warehouse {
        Warehouse::open_existing(&self.warehouse_path()).await.unwrap()
    }
}

pub fn load_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn write_csv(path: &Path, header: &str, rows: &[String]) {
    let mut contents = String::from(header);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    fs::write(path, contents).unwrap();
}

pub async fn id_of(warehouse: &Warehouse, sql: &str, key: &str) -> Option<i64> {
    sqlx::query_scalar(sql)
        .bind(key)
        .fetch_optional(warehouse.pool())
        .await
        .unwrap()
}
