//! Fact-shaped aggregations over cleaned rows.

use super::clean::{Flight, MaintenanceEvent, Report};
use super::{DailyOperationsRecord, FlightLegRecord, LogbookRecord, MonthlySummaryRecord};
use crate::model::{ReporterKey, YearMonth};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub fn flight_legs(flights: &[Flight]) -> Vec<FlightLegRecord> {
    flights
        .iter()
        .filter_map(|flight| {
            Some(FlightLegRecord {
                flight_id: flight.id,
                aircraft: flight.aircraft.clone(),
                departure_airport: flight.departure_airport.clone(),
                arrival_airport: flight.arrival_airport.clone(),
                duration_minutes: flight.duration_minutes()?,
            })
        })
        .collect()
}

#[derive(Default)]
struct DailyTotals {
    seconds: i64,
    takeoffs: i64,
    delayed: i64,
    cancelled: i64,
    delay_minutes: f64,
}

pub fn daily_operations(flights: &[Flight]) -> Vec<DailyOperationsRecord> {
    let mut totals: BTreeMap<(NaiveDate, &str), DailyTotals> = BTreeMap::new();

    for flight in flights {
        let day = totals.entry((flight.date, flight.aircraft.as_str())).or_default();
        if flight.cancelled {
            day.cancelled += 1;
            continue;
        }
        day.takeoffs += 1;
        day.seconds += flight.duration_seconds().unwrap_or(0);
        if let Some(delay) = flight.delay_minutes() {
            day.delayed += 1;
            day.delay_minutes += delay;
        }
    }

    totals
        .into_iter()
        .map(|((date, aircraft), day)| DailyOperationsRecord {
            date,
            aircraft: aircraft.to_string(),
            flight_hours: day.seconds as f64 / 3600.0,
            takeoffs: day.takeoffs,
            delayed_cycles: day.delayed,
            cancelled_cycles: day.cancelled,
            total_delay_minutes: day.delay_minutes.round() as i64,
        })
        .collect()
}

/// Out-of-service days per month of the maintenance start. Days in service
/// are what remains of the month, floored at zero.
pub fn monthly_summaries(events: &[MaintenanceEvent]) -> Vec<MonthlySummaryRecord> {
    let mut totals: BTreeMap<(YearMonth, &str), (f64, f64)> = BTreeMap::new();

    for event in events {
        let (scheduled, unscheduled) = totals
            .entry((YearMonth::of(event.start.date()), event.aircraft.as_str()))
            .or_default();
        if event.programmed {
            *scheduled += event.days();
        } else {
            *unscheduled += event.days();
        }
    }

    totals
        .into_iter()
        .map(|((month, aircraft), (adoss, adosu))| MonthlySummaryRecord {
            month,
            aircraft: aircraft.to_string(),
            adis: (month.days_in_month() as f64 - (adoss + adosu)).max(0.0),
            adoss,
            adosu,
        })
        .collect()
}

pub fn logbooks(reports: &[Report]) -> Vec<LogbookRecord> {
    let mut counts: BTreeMap<(YearMonth, &str, &ReporterKey), i64> = BTreeMap::new();

    for report in reports {
        *counts
            .entry((YearMonth::of(report.date), report.aircraft.as_str(), &report.reporter))
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((month, aircraft, reporter), log_count)| LogbookRecord {
            month,
            aircraft: aircraft.to_string(),
            reporter: reporter.clone(),
            log_count,
        })
        .collect()
}
