//! Domain value types shared by the transformer and the warehouse dimensions.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Manufacturer {
    Airbus,
    Boeing,
}

impl Manufacturer {
    pub fn as_str(self) -> &'static str {
        match self {
            Manufacturer::Airbus => "Airbus",
            Manufacturer::Boeing => "Boeing",
        }
    }
}

impl FromStr for Manufacturer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "airbus" => Ok(Manufacturer::Airbus),
            "boeing" => Ok(Manufacturer::Boeing),
            _ => Err(format!("unknown manufacturer '{}'", s)),
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who filed a post-flight report: a pilot (PIREP) or maintenance staff (MAREP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ReporterClass {
    Pirep,
    Marep,
}

impl ReporterClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ReporterClass::Pirep => "PIREP",
            ReporterClass::Marep => "MAREP",
        }
    }
}

impl FromStr for ReporterClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PIREP" => Ok(ReporterClass::Pirep),
            "MAREP" => Ok(ReporterClass::Marep),
            _ => Err(format!("unknown reporter class '{}'", s)),
        }
    }
}

impl fmt::Display for ReporterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn days_in_month(self) -> i64 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        match (
            NaiveDate::from_ymd_opt(self.year, self.month, 1),
            NaiveDate::from_ymd_opt(next_year, next_month, 1),
        ) {
            (Some(first), Some(next)) => (next - first).num_days(),
            _ => 0,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Descriptive attributes of an aircraft.
///
/// All fields are `None` for an inferred member, i.e. a registration seen in
/// operational data but missing from the manufacturer reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AircraftAttributes {
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<Manufacturer>,
}

impl AircraftAttributes {
    pub fn is_inferred(&self) -> bool {
        *self == Self::default()
    }
}

/// Natural key of the reporter dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReporterKey {
    pub class: ReporterClass,
    /// Airport where the report was filed, when known
    pub airport: Option<String>,
}

impl ReporterKey {
    pub fn new(class: ReporterClass, airport: Option<String>) -> Self {
        Self { class, airport }
    }
}

impl fmt::Display for ReporterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.airport {
            Some(airport) => write!(f, "{}@{}", self.class, airport),
            None => write!(f, "{}@?", self.class),
        }
    }
}
