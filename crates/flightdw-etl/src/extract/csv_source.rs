use super::{Dataset, Extractor, RawDatasets};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reads all five datasets from CSV files in one directory.
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    data_dir: PathBuf,
}

impl CsvExtractor {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path_of(&self, dataset: Dataset) -> PathBuf {
        self.data_dir.join(dataset.file_name())
    }
}

#[async_trait]
impl Extractor for CsvExtractor {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn extract(&self) -> Result<RawDatasets> {
        info!(data_dir = %self.data_dir.display(), "Extracting datasets from CSV files");

        let datasets = RawDatasets {
            flights: read_csv(Dataset::Flights, &self.path_of(Dataset::Flights))?,
            maintenance: read_csv(Dataset::Maintenance, &self.path_of(Dataset::Maintenance))?,
            reports: read_csv(
                Dataset::PostFlightReports,
                &self.path_of(Dataset::PostFlightReports),
            )?,
            aircraft: read_csv(
                Dataset::AircraftReference,
                &self.path_of(Dataset::AircraftReference),
            )?,
            personnel: read_csv(
                Dataset::MaintenancePersonnel,
                &self.path_of(Dataset::MaintenancePersonnel),
            )?,
        };

        info!(rows = datasets.total_rows(), "CSV extraction complete");
        Ok(datasets)
    }
}

/// Read one CSV dataset, checking its header first.
///
/// Empty cells become `None`. A missing required column or a row that cannot
/// be decoded is a [`EtlError::DataFormat`] for the whole dataset.
pub fn read_csv<T: DeserializeOwned>(dataset: Dataset, path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            EtlError::data_format(dataset, format!("cannot open '{}': {}", path.display(), e))
        })?;

    let headers = reader
        .headers()
        .map_err(|e| EtlError::data_format(dataset, format!("unreadable header: {}", e)))?
        .clone();

    for column in dataset.required_columns() {
        if !headers.iter().any(|h| h == *column) {
            return Err(EtlError::data_format(
                dataset,
                format!("'{}' is missing required column '{}'", path.display(), column),
            ));
        }
    }

    let rows = reader
        .deserialize()
        .enumerate()
        .map(|(index, row)| {
            // +2: header line, then 1-based numbering
            row.map_err(|e| EtlError::data_format(dataset, format!("line {}: {}", index + 2, e)))
        })
        .collect::<Result<Vec<T>>>()?;

    debug!(%dataset, rows = rows.len(), path = %path.display(), "Read CSV dataset");
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::extract::{RawFlight, RawPersonnel};

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_empty_cells_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "flights.csv",
            "flight_id,aircraft_registration,departure_airport,arrival_airport,scheduled_departure,scheduled_arrival,actual_departure,actual_arrival,cancelled\n\
             7, N1 ,JFK,LAX,,,,,true\n",
        );

        let rows: Vec<RawFlight> = read_csv(Dataset::Flights, &path).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].flight_id.as_deref(), Some("7"));
        assert_eq!(rows[0].aircraft_registration.as_deref(), Some("N1"));
        assert_eq!(rows[0].actual_departure, None);
        assert_eq!(rows[0].delay_code, None);
    }

    #[test]
    fn test_missing_required_column_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "maintenance_personnel.csv", "reporteurid\n12\n");

        let err = read_csv::<RawPersonnel>(Dataset::MaintenancePersonnel, &path).unwrap_err();

        match err {
            EtlError::DataFormat { dataset, message } => {
                assert_eq!(dataset, Dataset::MaintenancePersonnel);
                assert!(message.contains("'airport'"), "{}", message);
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_ragged_row_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "maintenance_personnel.csv", "reporteurid,airport\n1,BCN\n2\n");

        let err = read_csv::<RawPersonnel>(Dataset::MaintenancePersonnel, &path).unwrap_err();

        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[tokio::test]
    async fn test_missing_file_fails_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = CsvExtractor::new(dir.path());

        let err = extractor.extract().await.unwrap_err();

        assert!(matches!(err, EtlError::DataFormat { dataset: Dataset::Flights, .. }));
    }
}
