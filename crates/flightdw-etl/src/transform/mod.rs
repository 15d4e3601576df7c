//! Transformation of raw source records into dimension rows and fact records
//!
//! [`Transformer::transform`] is pure: it never touches the warehouse or the
//! clock, and identical inputs always produce identical outputs (ordered
//! collections only). Rows failing validation are dropped, logged and listed
//! in [`TransformOutput::rejected`]; validation never fails the transform.

mod aggregate;
mod clean;
pub mod parse;

use crate::error::ValidationError;
use crate::extract::RawDatasets;
use crate::model::{AircraftAttributes, ReporterClass, ReporterKey, YearMonth};
use chrono::{DateTime, NaiveDate, Utc};
use clean::{ReportContext, Rejections};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

pub use clean::DELAY_THRESHOLD_SECS;

/// Optional business rules, off unless requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleaningRules {
    /// Drop a flight that is still airborne when the same aircraft departs again
    pub drop_overlapping_flights: bool,
    /// Drop post-flight reports for aircraft missing from the aircraft reference
    pub require_known_aircraft: bool,
}

impl CleaningRules {
    pub fn all() -> Self {
        Self {
            drop_overlapping_flights: true,
            require_known_aircraft: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformContext {
    pub load_timestamp: DateTime<Utc>,
    pub rules: CleaningRules,
}

/// One operated flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightLegRecord {
    pub flight_id: i64,
    pub aircraft: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyOperationsRecord {
    pub date: NaiveDate,
    pub aircraft: String,
    pub flight_hours: f64,
    pub takeoffs: i64,
    pub delayed_cycles: i64,
    pub cancelled_cycles: i64,
    /// Rounded to whole minutes
    pub total_delay_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummaryRecord {
    pub month: YearMonth,
    pub aircraft: String,
    pub adis: f64,
    pub adoss: f64,
    pub adosu: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogbookRecord {
    pub month: YearMonth,
    pub aircraft: String,
    pub reporter: ReporterKey,
    pub log_count: i64,
}

/// Natural keys (and attributes) to resolve before any fact is loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionRows {
    /// Reference aircraft with full attributes, in file order
    pub aircraft: Vec<(String, AircraftAttributes)>,
    /// Registrations seen only in operational data, in first-seen order
    pub inferred_aircraft: Vec<String>,
    /// Airports in first-seen order (departure before arrival)
    pub airports: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub months: Vec<YearMonth>,
    pub reporters: Vec<ReporterKey>,
}

impl DimensionRows {
    pub fn len(&self) -> usize {
        self.aircraft.len()
            + self.inferred_aircraft.len()
            + self.airports.len()
            + self.dates.len()
            + self.months.len()
            + self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactRecords {
    pub flight_legs: Vec<FlightLegRecord>,
    pub daily_operations: Vec<DailyOperationsRecord>,
    pub monthly_summaries: Vec<MonthlySummaryRecord>,
    pub logbooks: Vec<LogbookRecord>,
}

impl FactRecords {
    pub fn len(&self) -> usize {
        self.flight_legs.len()
            + self.daily_operations.len()
            + self.monthly_summaries.len()
            + self.logbooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub load_timestamp: DateTime<Utc>,
    pub dimensions: DimensionRows,
    pub facts: FactRecords,
    /// Source rows that passed validation
    pub rows_accepted: usize,
    pub rejected: Vec<ValidationError>,
}

impl TransformOutput {
    pub fn rows_dropped(&self) -> usize {
        self.rejected.len()
    }
}

#[derive(Debug, Clone)]
pub struct Transformer {
    context: TransformContext,
}

impl Transformer {
    pub fn new(context: TransformContext) -> Self {
        Self { context }
    }

    pub fn transform(&self, raw: &RawDatasets) -> TransformOutput {
        let rules = &self.context.rules;
        let mut rejections = Rejections::default();

        let aircraft = clean::clean_aircraft(&raw.aircraft, &mut rejections);
        let (personnel, personnel_airports) = clean::clean_personnel(&raw.personnel, &mut rejections);
        let flights = clean::clean_flights(&raw.flights, rules, &mut rejections);
        let maintenance = clean::clean_maintenance(&raw.maintenance, &mut rejections);

        let known_aircraft: HashSet<String> = aircraft.iter().map(|(reg, _)| reg.clone()).collect();
        let report_context = ReportContext {
            rules,
            known_aircraft: &known_aircraft,
            personnel: &personnel,
        };
        let reports = clean::clean_reports(&raw.reports, &report_context, &mut rejections);

        let rows_accepted =
            aircraft.len() + personnel.len() + flights.len() + maintenance.len() + reports.len();

        let mut inferred_aircraft = FirstSeen::default();
        let operational_tails = flights
            .iter()
            .map(|f| &f.aircraft)
            .chain(maintenance.iter().map(|m| &m.aircraft))
            .chain(reports.iter().map(|r| &r.aircraft));
        for tail in operational_tails {
            if !known_aircraft.contains(tail) {
                inferred_aircraft.push(tail.clone());
            }
        }

        let mut airports = FirstSeen::default();
        for flight in &flights {
            airports.push(flight.departure_airport.clone());
            airports.push(flight.arrival_airport.clone());
        }

        let dates: BTreeSet<NaiveDate> = flights
            .iter()
            .map(|f| f.date)
            .chain(reports.iter().map(|r| r.date))
            .collect();
        let months: BTreeSet<YearMonth> = dates
            .iter()
            .copied()
            .chain(maintenance.iter().map(|m| m.start.date()))
            .map(YearMonth::of)
            .collect();

        let mut reporters = FirstSeen::default();
        for airport in personnel_airports {
            reporters.push(ReporterKey::new(ReporterClass::Marep, Some(airport)));
        }
        for report in &reports {
            reporters.push(report.reporter.clone());
        }

        let output = TransformOutput {
            load_timestamp: self.context.load_timestamp,
            dimensions: DimensionRows {
                aircraft,
                inferred_aircraft: inferred_aircraft.into_vec(),
                airports: airports.into_vec(),
                dates: dates.into_iter().collect(),
                months: months.into_iter().collect(),
                reporters: reporters.into_vec(),
            },
            facts: FactRecords {
                flight_legs: aggregate::flight_legs(&flights),
                daily_operations: aggregate::daily_operations(&flights),
                monthly_summaries: aggregate::monthly_summaries(&maintenance),
                logbooks: aggregate::logbooks(&reports),
            },
            rows_accepted,
            rejected: rejections.into_inner(),
        };

        info!(
            accepted = output.rows_accepted,
            dropped = output.rows_dropped(),
            dimension_rows = output.dimensions.len(),
            fact_records = output.facts.len(),
            "Transformation complete"
        );
        output
    }
}

/// Insertion-ordered set.
struct FirstSeen<T> {
    seen: HashSet<T>,
    items: Vec<T>,
}

impl<T> Default for FirstSeen<T> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }
}

impl<T: Clone + Eq + std::hash::Hash> FirstSeen<T> {
    fn push(&mut self, item: T) {
        if self.seen.insert(item.clone()) {
            self.items.push(item);
        }
    }

    fn into_vec(self) -> Vec<T> {
        self.items
    }
}
