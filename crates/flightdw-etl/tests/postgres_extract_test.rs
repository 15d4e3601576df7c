//! Extraction from a real PostgreSQL source
//!
//! These tests require Docker to be running. Run with:
//!
//! ```bash
//! cargo test -p flightdw-etl --test postgres_extract_test -- --ignored --nocapture
//! ```

mod common;

use common::{init_test_tracing, Fixture};
use flightdw_etl::{EtlError, Extractor, PostgresExtractor, SourceConfig};
use testcontainers::{runners::AsyncRunner, ImageExt};
use testcontainers_modules::postgres::Postgres;

const SOURCE_SCHEMA: &str = r#"
CREATE SCHEMA "AIMS";
CREATE SCHEMA "AMOS";

CREATE TABLE "AIMS".flights (
    id                   INTEGER PRIMARY KEY,
    aircraftregistration TEXT,
    departure            TEXT,
    arrival              TEXT,
    scheduleddeparture   TIMESTAMP,
    scheduledarrival     TIMESTAMP,
    actualdeparture      TIMESTAMP,
    actualarrival        TIMESTAMP,
    cancelled            BOOLEAN,
    delaycode            TEXT
);

CREATE TABLE "AIMS".maintenance (
    aircraftregistration TEXT,
    scheduleddeparture   TIMESTAMP,
    scheduledarrival     TIMESTAMP,
    programmed           BOOLEAN
);

CREATE TABLE "AMOS".technicallogbookorders (
    workorderid    INTEGER PRIMARY KEY,
    executionplace TEXT
);

CREATE TABLE "AMOS".postflightreports (
    pfrid                INTEGER PRIMARY KEY,
    aircraftregistration TEXT,
    reportingdate        DATE,
    reporteurclass       TEXT,
    reporteurid          INTEGER,
    tlborder             INTEGER
);

INSERT INTO "AIMS".flights VALUES
    (100, 'N12345', 'JFK', 'LAX', '2024-01-01 10:00', '2024-01-01 13:00',
     '2024-01-01 10:00', '2024-01-01 13:00', false, NULL);
INSERT INTO "AIMS".maintenance VALUES
    ('N12345', '2024-01-10 00:00', '2024-01-12 00:00', true);
INSERT INTO "AMOS".technicallogbookorders VALUES (1, 'JFK');
INSERT INTO "AMOS".postflightreports VALUES (7, 'N12345', '2024-01-05', 'PIREP', 5, 1);
"#;

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_extracts_every_dataset_from_postgres() {
    init_test_tracing();

    let container = Postgres::default()
        .with_tag("16-alpine")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");
    let port = container.get_host_port_ipv4(5432).await.unwrap();

    let source = SourceConfig {
        dbname: "postgres".into(),
        user: "postgres".into(),
        password: "postgres".into(),
        host: "127.0.0.1".into(),
        port,
    };

    let setup = sqlx::PgPool::connect_with(source.connect_options()).await.unwrap();
    sqlx::raw_sql(SOURCE_SCHEMA).execute(&setup).await.unwrap();
    setup.close().await;

    let mut fixture = Fixture::new();
    fixture.aircraft("N12345", "MSN-1", "A320", "Airbus").personnel("5", "JFK");
    fixture.write();

    let raw = PostgresExtractor::new(source, fixture.data_dir())
        .extract()
        .await
        .unwrap();

    assert_eq!(raw.flights.len(), 1);
    assert_eq!(raw.flights[0].flight_id.as_deref(), Some("100"));
    assert_eq!(raw.flights[0].cancelled.as_deref(), Some("false"));
    assert_eq!(raw.maintenance.len(), 1);
    assert_eq!(raw.reports.len(), 1);
    assert_eq!(raw.reports[0].execution_place.as_deref(), Some("JFK"));
    assert_eq!(raw.aircraft.len(), 1);
    assert_eq!(raw.personnel.len(), 1);
}

#[tokio::test]
async fn test_unreachable_source_is_a_connection_error() {
    init_test_tracing();
    let fixture = Fixture::new();
    fixture.write();

    let source = SourceConfig {
        dbname: "aims".into(),
        user: "etl".into(),
        password: "secret".into(),
        host: "127.0.0.1".into(),
        // Nothing listens on port 1.
        port: 1,
    };

    let err = PostgresExtractor::new(source, fixture.data_dir())
        .extract()
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::Connection(_)), "{}", err);
}
