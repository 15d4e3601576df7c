//! The five dimensions of the star schema.

use super::{Column, Dimension, DimensionLoader, DimensionStats, DimensionStore, SqlValue};
use crate::error::{EtlError, Result};
use crate::model::{AircraftAttributes, Manufacturer, ReporterKey, YearMonth};
use crate::transform::DimensionRows;
use chrono::{Datelike, NaiveDate};
use indicatif::ProgressBar;

fn arity<D: Dimension>(values: &[SqlValue]) -> Result<()> {
    if values.len() == D::ATTRIBUTE_COLUMNS.len() {
        Ok(())
    } else {
        Err(EtlError::storage(format!(
            "{} expects {} attribute values, got {}",
            D::TABLE,
            D::ATTRIBUTE_COLUMNS.len(),
            values.len()
        )))
    }
}

fn optional_text(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(text) => Some(text),
        _ => None,
    }
}

pub struct AircraftDim;

impl Dimension for AircraftDim {
    type Key = String;
    type Attributes = AircraftAttributes;

    const NAME: &'static str = "aircraft";
    const TABLE: &'static str = "Aircrafts";
    const ID_COLUMN: &'static str = "Aircraft_ID";
    const KEY_COLUMNS: &'static [Column] = &[Column::text("Aircraft_Registration_Code")];
    const ATTRIBUTE_COLUMNS: &'static [Column] = &[
        Column::text("Manufacturer_Serial_Number"),
        Column::text("Aircraft_Model"),
        Column::text("Aircraft_Manufacturer_Class"),
    ];

    fn key_values(key: &String) -> Vec<SqlValue> {
        vec![key.as_str().into()]
    }

    fn attribute_values(attributes: &AircraftAttributes) -> Vec<SqlValue> {
        vec![
            attributes.serial_number.clone().into(),
            attributes.model.clone().into(),
            attributes.manufacturer.map(|m| m.as_str()).into(),
        ]
    }

    fn attributes_from_values(values: Vec<SqlValue>) -> Result<AircraftAttributes> {
        arity::<Self>(&values)?;
        let mut values = values.into_iter();
        let serial_number = values.next().and_then(optional_text);
        let model = values.next().and_then(optional_text);
        let manufacturer = values
            .next()
            .and_then(optional_text)
            .map(|m| m.parse::<Manufacturer>().map_err(EtlError::storage))
            .transpose()?;

        Ok(AircraftAttributes {
            serial_number,
            model,
            manufacturer,
        })
    }
}

pub struct AirportDim;

impl Dimension for AirportDim {
    type Key = String;
    type Attributes = ();

    const NAME: &'static str = "airport";
    const TABLE: &'static str = "Airports";
    const ID_COLUMN: &'static str = "Airport_ID";
    const KEY_COLUMNS: &'static [Column] = &[Column::text("Airport_Code")];
    const ATTRIBUTE_COLUMNS: &'static [Column] = &[];

    fn key_values(key: &String) -> Vec<SqlValue> {
        vec![key.as_str().into()]
    }

    fn attribute_values(_: &()) -> Vec<SqlValue> {
        Vec::new()
    }

    fn attributes_from_values(values: Vec<SqlValue>) -> Result<()> {
        arity::<Self>(&values)
    }
}

/// Calendar parts stored next to each date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParts {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl DateParts {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            day: date.day(),
            month: date.month(),
            year: date.year(),
        }
    }
}

pub struct DateDim;

impl Dimension for DateDim {
    type Key = NaiveDate;
    type Attributes = DateParts;

    const NAME: &'static str = "date";
    const TABLE: &'static str = "Dates";
    const ID_COLUMN: &'static str = "Date_ID";
    const KEY_COLUMNS: &'static [Column] = &[Column::text("Full_Date")];
    const ATTRIBUTE_COLUMNS: &'static [Column] = &[
        Column::integer("Day_Num"),
        Column::integer("Month_Num"),
        Column::integer("Year"),
    ];

    fn key_values(key: &NaiveDate) -> Vec<SqlValue> {
        vec![key.format("%Y-%m-%d").to_string().into()]
    }

    fn attribute_values(parts: &DateParts) -> Vec<SqlValue> {
        vec![
            i64::from(parts.day).into(),
            i64::from(parts.month).into(),
            i64::from(parts.year).into(),
        ]
    }

    fn attributes_from_values(values: Vec<SqlValue>) -> Result<DateParts> {
        arity::<Self>(&values)?;
        let part = |index: usize| -> Result<i64> {
            values[index]
                .as_integer()
                .ok_or_else(|| EtlError::storage(format!("Dates has a NULL calendar part in column {}", index)))
        };

        Ok(DateParts {
            day: u32::try_from(part(0)?).map_err(|e| EtlError::storage(e.to_string()))?,
            month: u32::try_from(part(1)?).map_err(|e| EtlError::storage(e.to_string()))?,
            year: i32::try_from(part(2)?).map_err(|e| EtlError::storage(e.to_string()))?,
        })
    }
}

pub struct MonthDim;

impl Dimension for MonthDim {
    type Key = YearMonth;
    type Attributes = ();

    const NAME: &'static str = "month";
    const TABLE: &'static str = "Months";
    const ID_COLUMN: &'static str = "Month_ID";
    const KEY_COLUMNS: &'static [Column] = &[Column::integer("Month_Num"), Column::integer("Year")];
    const ATTRIBUTE_COLUMNS: &'static [Column] = &[];

    fn key_values(key: &YearMonth) -> Vec<SqlValue> {
        vec![i64::from(key.month).into(), i64::from(key.year).into()]
    }

    fn attribute_values(_: &()) -> Vec<SqlValue> {
        Vec::new()
    }

    fn attributes_from_values(values: Vec<SqlValue>) -> Result<()> {
        arity::<Self>(&values)
    }
}

pub struct ReporterDim;

impl Dimension for ReporterDim {
    type Key = ReporterKey;
    type Attributes = ();

    const NAME: &'static str = "reporter";
    const TABLE: &'static str = "Reporters";
    const ID_COLUMN: &'static str = "Reporter_ID";
    const KEY_COLUMNS: &'static [Column] = &[
        Column::text("Reporter_Class"),
        Column::text("Report_Airport_Code"),
    ];
    const ATTRIBUTE_COLUMNS: &'static [Column] = &[];

    fn key_values(key: &ReporterKey) -> Vec<SqlValue> {
        vec![key.class.as_str().into(), key.airport.clone().into()]
    }

    fn attribute_values(_: &()) -> Vec<SqlValue> {
        Vec::new()
    }

    fn attributes_from_values(values: Vec<SqlValue>) -> Result<()> {
        arity::<Self>(&values)
    }
}

/// One loader per dimension, shared by dimension and fact loading.
#[derive(Default)]
pub struct DimensionSet {
    pub aircraft: DimensionLoader<AircraftDim>,
    pub airports: DimensionLoader<AirportDim>,
    pub dates: DimensionLoader<DateDim>,
    pub months: DimensionLoader<MonthDim>,
    pub reporters: DimensionLoader<ReporterDim>,
}

impl DimensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every dimension row of a transform. Reference aircraft go
    /// first so that their attributes win over inferred placeholders.
    pub async fn load<S>(&mut self, store: &S, rows: &DimensionRows, progress: &ProgressBar) -> Result<()>
    where
        S: DimensionStore<AircraftDim>
            + DimensionStore<AirportDim>
            + DimensionStore<DateDim>
            + DimensionStore<MonthDim>
            + DimensionStore<ReporterDim>,
    {
        for (registration, attributes) in &rows.aircraft {
            self.aircraft.resolve(store, registration, attributes).await?;
            progress.inc(1);
        }

        let placeholder = AircraftAttributes::default();
        for registration in &rows.inferred_aircraft {
            self.aircraft
                .resolve_inferred(store, registration, &placeholder)
                .await?;
            progress.inc(1);
        }

        for airport in &rows.airports {
            self.airports.resolve(store, airport, &()).await?;
            progress.inc(1);
        }

        for date in &rows.dates {
            self.dates.resolve(store, date, &DateParts::of(*date)).await?;
            progress.inc(1);
        }

        for month in &rows.months {
            self.months.resolve(store, month, &()).await?;
            progress.inc(1);
        }

        for reporter in &rows.reporters {
            self.reporters.resolve(store, reporter, &()).await?;
            progress.inc(1);
        }

        Ok(())
    }

    pub fn stats(&self) -> Vec<DimensionStats> {
        vec![
            self.aircraft.stats().clone(),
            self.airports.stats().clone(),
            self.dates.stats().clone(),
            self.months.stats().clone(),
            self.reporters.stats().clone(),
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::ReporterClass;

    #[test]
    fn test_aircraft_attributes_round_trip_through_values() {
        let attributes = AircraftAttributes {
            serial_number: Some("MSN-9".into()),
            model: None,
            manufacturer: Some(Manufacturer::Boeing),
        };

        let values = AircraftDim::attribute_values(&attributes);
        assert_eq!(values[1], SqlValue::Null);
        assert_eq!(AircraftDim::attributes_from_values(values).unwrap(), attributes);
    }

    #[test]
    fn test_unknown_manufacturer_in_storage_is_an_error() {
        let values = vec![SqlValue::Null, SqlValue::Null, SqlValue::Text("Fokker".into())];
        assert!(AircraftDim::attributes_from_values(values).is_err());
    }

    #[test]
    fn test_key_values_match_key_columns() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(DateDim::key_values(&date), vec![SqlValue::Text("2024-01-01".into())]);
        assert_eq!(
            MonthDim::key_values(&YearMonth::new(2024, 2)).len(),
            MonthDim::KEY_COLUMNS.len()
        );
        assert_eq!(
            ReporterDim::key_values(&ReporterKey::new(ReporterClass::Pirep, None)),
            vec![SqlValue::Text("PIREP".into()), SqlValue::Null]
        );
    }

    #[test]
    fn test_date_parts_round_trip() {
        let parts = DateParts::of(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        let values = DateDim::attribute_values(&parts);
        assert_eq!(DateDim::attributes_from_values(values).unwrap(), parts);
    }
}
