//! Row validation and business-rule cleaning.
//!
//! Each `clean_*` function turns raw rows into typed rows. A row breaking a
//! rule is dropped and recorded in [`Rejections`] exactly once.

use super::parse::{parse_date, parse_flag, parse_timestamp, present};
use super::CleaningRules;
use crate::error::{DropReason, ValidationError};
use crate::extract::{Dataset, RawAircraft, RawFlight, RawMaintenance, RawPersonnel, RawReport};
use crate::model::{AircraftAttributes, Manufacturer, ReporterClass, ReporterKey};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// Arrivals more than this many seconds after schedule count as delayed.
pub const DELAY_THRESHOLD_SECS: i64 = 15 * 60;

#[derive(Debug, Default)]
pub struct Rejections {
    errors: Vec<ValidationError>,
}

impl Rejections {
    pub fn reject(&mut self, dataset: Dataset, record: String, reason: DropReason) {
        let error = ValidationError::new(dataset, record, reason);
        warn!(
            dataset = %error.dataset,
            record = %error.record,
            reason = %error.reason,
            "Dropped source record"
        );
        self.errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.errors
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flight {
    pub id: i64,
    pub aircraft: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub date: NaiveDate,
    pub cancelled: bool,
    /// Actual departure and arrival; always set for flights that operated
    pub actual: Option<(NaiveDateTime, NaiveDateTime)>,
    pub scheduled_arrival: Option<NaiveDateTime>,
}

impl Flight {
    pub fn duration_minutes(&self) -> Option<i64> {
        self.actual.map(|(dep, arr)| (arr - dep).num_minutes())
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.actual.map(|(dep, arr)| (arr - dep).num_seconds())
    }

    /// Minutes past the scheduled arrival, when the flight operated late
    /// beyond the delay threshold.
    pub fn delay_minutes(&self) -> Option<f64> {
        let (_, arrival) = self.actual?;
        let late = (arrival - self.scheduled_arrival?).num_seconds();
        (late > DELAY_THRESHOLD_SECS).then(|| late as f64 / 60.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceEvent {
    pub aircraft: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub programmed: bool,
}

impl MaintenanceEvent {
    /// Out-of-service time in (fractional) days.
    pub fn days(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 86_400.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: String,
    pub aircraft: String,
    pub date: NaiveDate,
    pub reporter: ReporterKey,
}

fn record_id(id: &Option<String>, index: usize) -> String {
    present(id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", index + 1))
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, DropReason> {
    present(value).ok_or(DropReason::MissingField(field))
}

fn optional_timestamp(
    value: &Option<String>,
    field: &'static str,
) -> Result<Option<NaiveDateTime>, DropReason> {
    match present(value) {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw).map(Some).ok_or_else(|| DropReason::Unparseable {
            field,
            value: raw.to_string(),
        }),
    }
}

fn required_timestamp(value: &Option<String>, field: &'static str) -> Result<NaiveDateTime, DropReason> {
    optional_timestamp(value, field)?.ok_or(DropReason::MissingField(field))
}

fn flag(value: &Option<String>, field: &'static str) -> Result<bool, DropReason> {
    match present(value) {
        None => Ok(false),
        Some(raw) => parse_flag(raw).ok_or_else(|| DropReason::Unparseable {
            field,
            value: raw.to_string(),
        }),
    }
}

fn validate_flight(raw: &RawFlight) -> Result<Flight, DropReason> {
    let raw_id = required(&raw.flight_id, "flight_id")?;
    let id = raw_id.parse::<i64>().map_err(|_| DropReason::Unparseable {
        field: "flight_id",
        value: raw_id.to_string(),
    })?;
    let aircraft = required(&raw.aircraft_registration, "aircraft_registration")?.to_string();
    let departure_airport = required(&raw.departure_airport, "departure_airport")?.to_string();
    let arrival_airport = required(&raw.arrival_airport, "arrival_airport")?.to_string();
    let cancelled = flag(&raw.cancelled, "cancelled")?;
    let scheduled_departure = optional_timestamp(&raw.scheduled_departure, "scheduled_departure")?;
    let scheduled_arrival = optional_timestamp(&raw.scheduled_arrival, "scheduled_arrival")?;

    let actual = if cancelled {
        None
    } else {
        let departure = required_timestamp(&raw.actual_departure, "actual_departure")?;
        let arrival = required_timestamp(&raw.actual_arrival, "actual_arrival")?;
        if arrival < departure {
            return Err(DropReason::NegativeDuration {
                minutes: (departure - arrival).num_minutes(),
            });
        }
        Some((departure, arrival))
    };

    let date = scheduled_departure
        .or(actual.map(|(departure, _)| departure))
        .map(|ts| ts.date())
        .ok_or(DropReason::MissingField("scheduled_departure"))?;

    Ok(Flight {
        id,
        aircraft,
        departure_airport,
        arrival_airport,
        date,
        cancelled,
        actual,
        scheduled_arrival,
    })
}

pub fn clean_flights(
    raws: &[RawFlight],
    rules: &CleaningRules,
    rejections: &mut Rejections,
) -> Vec<Flight> {
    let mut seen = HashSet::new();
    let mut flights = Vec::with_capacity(raws.len());

    for (index, raw) in raws.iter().enumerate() {
        match validate_flight(raw) {
            Ok(flight) if !seen.insert(flight.id) => {
                rejections.reject(Dataset::Flights, flight.id.to_string(), DropReason::Duplicate)
            },
            Ok(flight) => flights.push(flight),
            Err(reason) => rejections.reject(Dataset::Flights, record_id(&raw.flight_id, index), reason),
        }
    }

    if rules.drop_overlapping_flights {
        flights = drop_overlapping(flights, rejections);
    }
    flights
}

/// Per aircraft, operated flights are ordered by actual departure; a flight
/// still in the air when the next one departs is dropped (the later one is
/// kept).
fn drop_overlapping(flights: Vec<Flight>, rejections: &mut Rejections) -> Vec<Flight> {
    let mut by_aircraft: BTreeMap<&str, Vec<(NaiveDateTime, NaiveDateTime, i64)>> = BTreeMap::new();
    for flight in &flights {
        if let Some((departure, arrival)) = flight.actual {
            by_aircraft
                .entry(flight.aircraft.as_str())
                .or_default()
                .push((departure, arrival, flight.id));
        }
    }

    let mut overlapping = HashSet::new();
    for legs in by_aircraft.values_mut() {
        legs.sort();
        for pair in legs.windows(2) {
            let (_, earlier_arrival, earlier_id) = pair[0];
            let (later_departure, _, _) = pair[1];
            if earlier_arrival > later_departure {
                overlapping.insert(earlier_id);
            }
        }
    }

    flights
        .into_iter()
        .filter(|flight| {
            let keep = !overlapping.contains(&flight.id);
            if !keep {
                rejections.reject(
                    Dataset::Flights,
                    flight.id.to_string(),
                    DropReason::OverlappingFlight,
                );
            }
            keep
        })
        .collect()
}

fn validate_maintenance(raw: &RawMaintenance) -> Result<MaintenanceEvent, DropReason> {
    let aircraft = required(&raw.aircraft_registration, "aircraft_registration")?.to_string();
    let start = required_timestamp(&raw.scheduled_departure, "scheduled_departure")?;
    let end = required_timestamp(&raw.scheduled_arrival, "scheduled_arrival")?;
    if end < start {
        return Err(DropReason::NegativeDuration {
            minutes: (start - end).num_minutes(),
        });
    }
    let programmed = flag(&raw.programmed, "programmed")?;

    Ok(MaintenanceEvent {
        aircraft,
        start,
        end,
        programmed,
    })
}

pub fn clean_maintenance(raws: &[RawMaintenance], rejections: &mut Rejections) -> Vec<MaintenanceEvent> {
    let mut seen = HashSet::new();
    let mut events = Vec::with_capacity(raws.len());

    for (index, raw) in raws.iter().enumerate() {
        let record = record_id(&raw.maintenance_id, index);
        match validate_maintenance(raw) {
            Ok(event) if !seen.insert((event.aircraft.clone(), event.start, event.end)) => {
                rejections.reject(Dataset::Maintenance, record, DropReason::Duplicate)
            },
            Ok(event) => events.push(event),
            Err(reason) => rejections.reject(Dataset::Maintenance, record, reason),
        }
    }
    events
}

/// Reference aircraft in file order; the first row of a registration wins.
pub fn clean_aircraft(
    raws: &[RawAircraft],
    rejections: &mut Rejections,
) -> Vec<(String, AircraftAttributes)> {
    let mut seen = HashSet::new();
    let mut aircraft = Vec::with_capacity(raws.len());

    for (index, raw) in raws.iter().enumerate() {
        let record = record_id(&raw.aircraft_reg_code, index);
        let validated = required(&raw.aircraft_reg_code, "aircraft_reg_code").and_then(|registration| {
            let manufacturer = required(&raw.aircraft_manufacturer, "aircraft_manufacturer")?;
            let manufacturer = manufacturer.parse::<Manufacturer>().map_err(|_| DropReason::OutOfDomain {
                field: "aircraft_manufacturer",
                value: manufacturer.to_string(),
            })?;
            Ok((
                registration.to_string(),
                AircraftAttributes {
                    serial_number: present(&raw.manufacturer_serial_number).map(str::to_string),
                    model: present(&raw.aircraft_model).map(str::to_string),
                    manufacturer: Some(manufacturer),
                },
            ))
        });

        match validated {
            Ok((registration, _)) if seen.contains(&registration) => {
                rejections.reject(Dataset::AircraftReference, record, DropReason::Duplicate)
            },
            Ok((registration, attributes)) => {
                seen.insert(registration.clone());
                aircraft.push((registration, attributes));
            },
            Err(reason) => rejections.reject(Dataset::AircraftReference, record, reason),
        }
    }
    aircraft
}

/// Maintenance personnel as `reporter id -> airport`, plus the airports in
/// file order.
pub fn clean_personnel(
    raws: &[RawPersonnel],
    rejections: &mut Rejections,
) -> (HashMap<String, String>, Vec<String>) {
    let mut airports_by_reporter = HashMap::new();
    let mut airports = Vec::new();

    for (index, raw) in raws.iter().enumerate() {
        let record = record_id(&raw.reporteurid, index);
        let validated = required(&raw.reporteurid, "reporteurid")
            .and_then(|id| Ok((id, required(&raw.airport, "airport")?)));

        match validated {
            Ok((id, _)) if airports_by_reporter.contains_key(id) => {
                rejections.reject(Dataset::MaintenancePersonnel, record, DropReason::Duplicate)
            },
            Ok((id, airport)) => {
                airports_by_reporter.insert(id.to_string(), airport.to_string());
                airports.push(airport.to_string());
            },
            Err(reason) => rejections.reject(Dataset::MaintenancePersonnel, record, reason),
        }
    }
    (airports_by_reporter, airports)
}

pub struct ReportContext<'a> {
    pub rules: &'a CleaningRules,
    pub known_aircraft: &'a HashSet<String>,
    pub personnel: &'a HashMap<String, String>,
}

fn validate_report(raw: &RawReport, context: &ReportContext<'_>) -> Result<Report, DropReason> {
    let id = required(&raw.report_id, "report_id")?.to_string();
    let aircraft = required(&raw.aircraft_registration, "aircraft_registration")?.to_string();
    let raw_date = required(&raw.reporting_date, "reporting_date")?;
    let date = parse_date(raw_date).ok_or_else(|| DropReason::Unparseable {
        field: "reporting_date",
        value: raw_date.to_string(),
    })?;
    let raw_class = required(&raw.reporter_class, "reporter_class")?;
    let class = raw_class.parse::<ReporterClass>().map_err(|_| DropReason::OutOfDomain {
        field: "reporter_class",
        value: raw_class.to_string(),
    })?;

    if context.rules.require_known_aircraft && !context.known_aircraft.contains(&aircraft) {
        return Err(DropReason::UnknownAircraft(aircraft));
    }

    let airport = match (present(&raw.execution_place), class) {
        (Some(place), _) => Some(place.to_string()),
        (None, ReporterClass::Marep) => present(&raw.reporter_id)
            .and_then(|reporter| context.personnel.get(reporter))
            .cloned(),
        (None, ReporterClass::Pirep) => None,
    };

    Ok(Report {
        id,
        aircraft,
        date,
        reporter: ReporterKey::new(class, airport),
    })
}

pub fn clean_reports(
    raws: &[RawReport],
    context: &ReportContext<'_>,
    rejections: &mut Rejections,
) -> Vec<Report> {
    let mut seen = HashSet::new();
    let mut reports = Vec::with_capacity(raws.len());

    for (index, raw) in raws.iter().enumerate() {
        let record = record_id(&raw.report_id, index);
        match validate_report(raw, context) {
            Ok(report) if !seen.insert(report.id.clone()) => {
                rejections.reject(Dataset::PostFlightReports, record, DropReason::Duplicate)
            },
            Ok(report) => reports.push(report),
            Err(reason) => rejections.reject(Dataset::PostFlightReports, record, reason),
        }
    }
    reports
}
