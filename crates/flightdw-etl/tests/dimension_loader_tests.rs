//! Dimension loading against the SQLite warehouse
//!
//! Each test uses a fresh DimensionLoader per simulated run, sharing one
//! warehouse file between runs.

mod common;

use flightdw_etl::dimension::{AircraftDim, AirportDim, ReporterDim};
use flightdw_etl::fact::{FactLoader, FlightLegFact};
use flightdw_etl::model::{AircraftAttributes, Manufacturer, ReporterClass, ReporterKey};
use flightdw_etl::transform::FlightLegRecord;
use flightdw_etl::{DimensionLoader, DimensionSet, DimensionStore, EtlError, Warehouse, WarehouseConfig};
use indicatif::ProgressBar;

async fn open(dir: &tempfile::TempDir) -> Warehouse {
    Warehouse::open(&WarehouseConfig::new(dir.path().join("dw.sqlite")))
        .await
        .unwrap()
}

fn attributes(model: &str) -> AircraftAttributes {
    AircraftAttributes {
        serial_number: Some("MSN-1".into()),
        model: Some(model.into()),
        manufacturer: Some(Manufacturer::Airbus),
    }
}

#[tokio::test]
async fn test_resolve_twice_in_one_run_returns_same_key() {
    common::init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let warehouse = open(&dir).await;
    let mut loader = DimensionLoader::<AirportDim>::new();

    let first = loader.resolve(&warehouse, &"JFK".to_string(), &()).await.unwrap();
    let second = loader.resolve(&warehouse, &"JFK".to_string(), &()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(loader.stats().inserted, 1);
    assert_eq!(loader.stats().cache_hits, 1);
    assert_eq!(warehouse.count_rows("Airports").await.unwrap(), 1);
}

#[tokio::test]
async fn test_type1_round_trip_across_runs() {
    common::init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let key = "EC-AAA".to_string();

    let warehouse = open(&dir).await;
    let mut first_run = DimensionLoader::<AircraftDim>::new();
    let id = first_run.resolve(&warehouse, &key, &attributes("A320")).await.unwrap();
    warehouse.close().await;

    let warehouse = open(&dir).await;
    let mut second_run = DimensionLoader::<AircraftDim>::new();
    let again = second_run.resolve(&warehouse, &key, &attributes("A321")).await.unwrap();

    assert_eq!(id, again);
    assert_eq!(second_run.stats().reused, 1);
    assert_eq!(second_run.stats().updated, 1);
    let stored = DimensionStore::<AircraftDim>::lookup(&warehouse, &key).await.unwrap();
    assert_eq!(stored, Some((id, attributes("A321"))));
}

#[tokio::test]
async fn test_unchanged_attributes_are_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = open(&dir).await;
    let key = "EC-AAA".to_string();
    DimensionLoader::<AircraftDim>::new()
        .resolve(&warehouse, &key, &attributes("A320"))
        .await
        .unwrap();

    let mut next_run = DimensionLoader::<AircraftDim>::new();
    next_run.resolve(&warehouse, &key, &attributes("A320")).await.unwrap();

    assert_eq!(next_run.stats().updated, 0);
    assert_eq!(next_run.stats().reused, 1);
}

#[tokio::test]
async fn test_reporter_without_airport_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = open(&dir).await;
    let key = ReporterKey::new(ReporterClass::Pirep, None);

    let id = DimensionLoader::<ReporterDim>::new()
        .resolve(&warehouse, &key, &())
        .await
        .unwrap();
    let mut next_run = DimensionLoader::<ReporterDim>::new();
    let again = next_run.resolve(&warehouse, &key, &()).await.unwrap();

    assert_eq!(id, again);
    assert_eq!(warehouse.count_rows("Reporters").await.unwrap(), 1);
}

#[tokio::test]
async fn test_fact_with_unresolved_dimension_is_never_inserted() {
    common::init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let warehouse = open(&dir).await;
    let mut dims = DimensionSet::new();
    dims.aircraft
        .resolve(&warehouse, &"N12345".to_string(), &AircraftAttributes::default())
        .await
        .unwrap();
    dims.airports.resolve(&warehouse, &"JFK".to_string(), &()).await.unwrap();

    let orphan = FlightLegRecord {
        flight_id: 100,
        aircraft: "N12345".into(),
        departure_airport: "JFK".into(),
        arrival_airport: "LAX".into(),
        duration_minutes: 180,
    };

    let err = FlightLegFact::bind(&orphan, &dims, "2024-06-01T00:00:00Z").unwrap_err();
    assert!(matches!(err, EtlError::ReferentialIntegrity { dimension: "airport", .. }));

    let report = FactLoader::new(&warehouse, 500)
        .load(
            std::slice::from_ref(&orphan),
            |r| FlightLegFact::bind(r, &dims, "2024-06-01T00:00:00Z"),
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();

    assert_eq!((report.loaded, report.rejected), (0, 1));
    assert_eq!(warehouse.count_rows("Flight_Legs").await.unwrap(), 0);
}
