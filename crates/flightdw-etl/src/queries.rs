//! Analytical queries over the star schema
//!
//! Per manufacturer and year:
//! - utilization: FH, takeoffs, days out of service (scheduled/unscheduled/total),
//!   days in service, daily utilization (DU) and cycles (DC), delay rate (DYR),
//!   cancellation rate (CNR), technical dispatch reliability (TDR) and average
//!   delay duration (ADD)
//! - reporting: logbook reporting rate per 1000 flight hours (RRh) and per
//!   100 cycles (RRc)
//! - reporting per role: the same rates split by reporter class

use crate::dimension::{Column, SqlValue};
use crate::error::{EtlError, Result};
use crate::warehouse::Warehouse;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info};

const UTILIZATION_SQL: &str = r#"
WITH yearly_data AS (
    SELECT
        a.Aircraft_Manufacturer_Class AS manufacturer,
        d.Year AS year,
        SUM(f.FH) AS total_fh,
        CAST(SUM(f.Takeoffs) AS REAL) AS total_takeoffs,
        CAST(SUM(f.TDM) AS REAL) AS total_tdm,
        CAST(SUM(f.CFC) AS REAL) AS total_cfc,
        CAST(SUM(f.DFC) AS REAL) AS total_dfc,
        COUNT(DISTINCT a.Aircraft_ID) AS num_aircraft
    FROM Flight_Operations_Daily f
    JOIN Aircrafts a ON f.Aircraft_ID = a.Aircraft_ID
    JOIN Dates d ON f.Date_ID = d.Date_ID
    GROUP BY a.Aircraft_Manufacturer_Class, d.Year
),
maintenance_data AS (
    SELECT
        a.Aircraft_Manufacturer_Class AS manufacturer,
        m.Year AS year,
        SUM(s.ADOSS) AS total_adoss,
        SUM(s.ADOSU) AS total_adosu,
        SUM(s.ADIS) AS total_adis,
        COUNT(DISTINCT a.Aircraft_ID) AS num_aircraft
    FROM Aircraft_Monthly_Summary s
    JOIN Aircrafts a ON s.Aircraft_ID = a.Aircraft_ID
    JOIN Months m ON s.Month_ID = m.Month_ID
    GROUP BY a.Aircraft_Manufacturer_Class, m.Year
),
per_aircraft AS (
    SELECT
        y.manufacturer,
        y.year,
        ROUND(y.total_fh / y.num_aircraft, 2) AS fh,
        ROUND(y.total_takeoffs / y.num_aircraft, 2) AS takeoffs,
        ROUND(m.total_adoss / m.num_aircraft, 2) AS adoss,
        ROUND(m.total_adosu / m.num_aircraft, 2) AS adosu,
        ROUND((m.total_adoss + m.total_adosu) / m.num_aircraft, 2) AS ados,
        ROUND(m.total_adis / m.num_aircraft, 2) AS adis,
        y.total_takeoffs,
        y.total_dfc,
        y.total_cfc,
        y.total_tdm
    FROM yearly_data y
    JOIN maintenance_data m
        ON y.manufacturer = m.manufacturer AND y.year = m.year
)
SELECT
    manufacturer,
    year,
    fh,
    takeoffs,
    adoss,
    adosu,
    ados,
    adis,
    ROUND(fh / NULLIF((365 - ados) * 24, 0), 2) AS du,
    ROUND(takeoffs / NULLIF(365 - ados, 0), 2) AS dc,
    100 * ROUND(total_dfc / NULLIF(total_takeoffs, 0), 4) AS dyr,
    100 * ROUND(total_cfc / NULLIF(total_takeoffs, 0), 4) AS cnr,
    100 - ROUND(100 * (total_dfc + total_cfc) / NULLIF(total_takeoffs, 0), 2) AS tdr,
    100 * ROUND(total_tdm / NULLIF(total_dfc, 0), 2) AS add_score
FROM per_aircraft
ORDER BY manufacturer, year
"#;

const REPORTING_SQL: &str = r#"
WITH utilization AS (
    SELECT
        a.Aircraft_Manufacturer_Class AS manufacturer,
        d.Year AS year,
        SUM(f.FH) AS total_fh,
        CAST(SUM(f.Takeoffs) AS REAL) AS total_takeoffs
    FROM Flight_Operations_Daily f
    JOIN Aircrafts a ON f.Aircraft_ID = a.Aircraft_ID
    JOIN Dates d ON f.Date_ID = d.Date_ID
    GROUP BY a.Aircraft_Manufacturer_Class, d.Year
),
reports AS (
    SELECT
        a.Aircraft_Manufacturer_Class AS manufacturer,
        m.Year AS year,
        CAST(SUM(l.Log_Count) AS REAL) AS total_reports
    FROM Logbooks l
    JOIN Aircrafts a ON l.Aircraft_ID = a.Aircraft_ID
    JOIN Months m ON l.Month_ID = m.Month_ID
    GROUP BY a.Aircraft_Manufacturer_Class, m.Year
)
SELECT
    u.manufacturer,
    u.year,
    1000 * ROUND(r.total_reports / NULLIF(u.total_fh, 0), 3) AS rrh,
    100 * ROUND(r.total_reports / NULLIF(u.total_takeoffs, 0), 2) AS rrc
FROM utilization u
JOIN reports r
    ON u.manufacturer = r.manufacturer AND u.year = r.year
ORDER BY u.manufacturer, u.year
"#;

const REPORTING_PER_ROLE_SQL: &str = r#"
WITH utilization AS (
    SELECT
        a.Aircraft_Manufacturer_Class AS manufacturer,
        d.Year AS year,
        SUM(f.FH) AS total_fh,
        CAST(SUM(f.Takeoffs) AS REAL) AS total_takeoffs
    FROM Flight_Operations_Daily f
    JOIN Aircrafts a ON f.Aircraft_ID = a.Aircraft_ID
    JOIN Dates d ON f.Date_ID = d.Date_ID
    GROUP BY a.Aircraft_Manufacturer_Class, d.Year
),
reports AS (
    SELECT
        a.Aircraft_Manufacturer_Class AS manufacturer,
        m.Year AS year,
        r.Reporter_Class AS role,
        CAST(SUM(l.Log_Count) AS REAL) AS total_reports
    FROM Logbooks l
    JOIN Aircrafts a ON l.Aircraft_ID = a.Aircraft_ID
    JOIN Reporters r ON l.Reporter_ID = r.Reporter_ID
    JOIN Months m ON l.Month_ID = m.Month_ID
    GROUP BY a.Aircraft_Manufacturer_Class, m.Year, r.Reporter_Class
)
SELECT
    r.manufacturer,
    r.year,
    r.role,
    1000 * ROUND(r.total_reports / NULLIF(u.total_fh, 0), 3) AS rrh,
    100 * ROUND(r.total_reports / NULLIF(u.total_takeoffs, 0), 2) AS rrc
FROM reports r
JOIN utilization u
    ON r.manufacturer = u.manufacturer AND r.year = u.year
ORDER BY r.manufacturer, r.year, r.role
"#;

const UTILIZATION_COLUMNS: &[Column] = &[
    Column::text("Manufacturer"),
    Column::integer("Year"),
    Column::real("FH"),
    Column::real("Takeoffs"),
    Column::real("ADOSS"),
    Column::real("ADOSU"),
    Column::real("ADOS"),
    Column::real("ADIS"),
    Column::real("DU"),
    Column::real("DC"),
    Column::real("DYR(%)"),
    Column::real("CNR(%)"),
    Column::real("TDR(%)"),
    Column::real("ADD"),
];

const REPORTING_COLUMNS: &[Column] = &[
    Column::text("Manufacturer"),
    Column::integer("Year"),
    Column::real("RRh"),
    Column::real("RRc"),
];

const REPORTING_PER_ROLE_COLUMNS: &[Column] = &[
    Column::text("Manufacturer"),
    Column::integer("Year"),
    Column::text("Role"),
    Column::real("RRh"),
    Column::real("RRc"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyticalQuery {
    Utilization,
    Reporting,
    ReportingPerRole,
}

impl AnalyticalQuery {
    pub const ALL: [AnalyticalQuery; 3] = [
        AnalyticalQuery::Utilization,
        AnalyticalQuery::Reporting,
        AnalyticalQuery::ReportingPerRole,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AnalyticalQuery::Utilization => "utilization",
            AnalyticalQuery::Reporting => "reporting",
            AnalyticalQuery::ReportingPerRole => "reporting-per-role",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AnalyticalQuery::Utilization => "Aircraft utilization",
            AnalyticalQuery::Reporting => "Reporting rates",
            AnalyticalQuery::ReportingPerRole => "Reporting rates per role",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            AnalyticalQuery::Utilization => UTILIZATION_COLUMNS,
            AnalyticalQuery::Reporting => REPORTING_COLUMNS,
            AnalyticalQuery::ReportingPerRole => REPORTING_PER_ROLE_COLUMNS,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            AnalyticalQuery::Utilization => UTILIZATION_SQL,
            AnalyticalQuery::Reporting => REPORTING_SQL,
            AnalyticalQuery::ReportingPerRole => REPORTING_PER_ROLE_SQL,
        }
    }

    /// Execute the query, timing it.
    pub async fn run(self, warehouse: &Warehouse) -> Result<QueryResults> {
        debug!(query = self.name(), "Running analytical query");
        let started = Instant::now();

        let rows = sqlx::query(self.sql())
            .fetch_all(warehouse.pool())
            .await
            .map_err(|e| EtlError::storage(format!("Query '{}' failed: {}", self.name(), e)))?;

        let columns = self.columns();
        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| SqlValue::decode(row, i, column.kind).map(json_value))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(query = self.name(), rows = rows.len(), elapsed_ms, "Analytical query complete");

        Ok(QueryResults {
            query: self,
            columns: columns.iter().map(|c| c.name).collect(),
            rows,
            elapsed_ms,
        })
    }
}

impl fmt::Display for AnalyticalQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalyticalQuery {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utilization" => Ok(AnalyticalQuery::Utilization),
            "reporting" => Ok(AnalyticalQuery::Reporting),
            "reporting-per-role" => Ok(AnalyticalQuery::ReportingPerRole),
            other => Err(format!(
                "Unknown query '{}'. Use utilization, reporting or reporting-per-role",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResults {
    pub query: AnalyticalQuery,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub elapsed_ms: f64,
}

impl QueryResults {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn json_value(value: SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(v) => v.into(),
        SqlValue::Real(v) => serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(v) => v.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::WarehouseConfig;
    use crate::dimension::{DateParts, DimensionSet};
    use crate::fact::FactLoader;
    use crate::model::{AircraftAttributes, Manufacturer, ReporterClass, ReporterKey, YearMonth};
    use crate::transform::{DailyOperationsRecord, FactRecords, LogbookRecord, MonthlySummaryRecord};
    use chrono::{NaiveDate, Utc};
    use indicatif::ProgressBar;
    use serde_json::json;

    async fn loaded_warehouse() -> (tempfile::TempDir, Warehouse) {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = Warehouse::open(&WarehouseConfig::new(dir.path().join("dw.sqlite")))
            .await
            .unwrap();

        let tail = "EC-AAA".to_string();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let month = YearMonth::new(2024, 1);
        let pirep = ReporterKey::new(ReporterClass::Pirep, Some("LAX".into()));

        let mut dims = DimensionSet::new();
        let airbus = AircraftAttributes {
            serial_number: Some("MSN-1".into()),
            model: Some("A320".into()),
            manufacturer: Some(Manufacturer::Airbus),
        };
        dims.aircraft.resolve(&warehouse, &tail, &airbus).await.unwrap();
        dims.dates.resolve(&warehouse, &day, &DateParts::of(day)).await.unwrap();
        dims.months.resolve(&warehouse, &month, &()).await.unwrap();
        dims.reporters.resolve(&warehouse, &pirep, &()).await.unwrap();

        let facts = FactRecords {
            flight_legs: vec![],
            daily_operations: vec![DailyOperationsRecord {
                date: day,
                aircraft: tail.clone(),
                flight_hours: 3.0,
                takeoffs: 2,
                delayed_cycles: 1,
                cancelled_cycles: 0,
                total_delay_minutes: 30,
            }],
            monthly_summaries: vec![MonthlySummaryRecord {
                month,
                aircraft: tail.clone(),
                adis: 30.0,
                adoss: 1.0,
                adosu: 0.0,
            }],
            logbooks: vec![LogbookRecord {
                month,
                aircraft: tail,
                reporter: pirep,
                log_count: 3,
            }],
        };
        FactLoader::new(&warehouse, 100)
            .load_all(&facts, &dims, Utc::now(), &ProgressBar::hidden())
            .await
            .unwrap();

        (dir, warehouse)
    }

    #[test]
    fn test_parse_query_names() {
        assert_eq!("reporting_per_role".parse::<AnalyticalQuery>().unwrap(), AnalyticalQuery::ReportingPerRole);
        assert_eq!("Utilization".parse::<AnalyticalQuery>().unwrap(), AnalyticalQuery::Utilization);
        assert!("fleet".parse::<AnalyticalQuery>().is_err());
    }

    #[tokio::test]
    async fn test_utilization() {
        let (_dir, warehouse) = loaded_warehouse().await;

        let results = AnalyticalQuery::Utilization.run(&warehouse).await.unwrap();

        assert_eq!(results.columns.len(), 14);
        assert_eq!(results.rows.len(), 1);
        let row = &results.rows[0];
        assert_eq!(row[0], json!("Airbus"));
        assert_eq!(row[1], json!(2024));
        assert_eq!(row[2], json!(3.0)); // FH
        assert_eq!(row[3], json!(2.0)); // takeoffs
        assert_eq!(row[6], json!(1.0)); // ADOS
        assert_eq!(row[10], json!(50.0)); // DYR
        assert_eq!(row[12], json!(50.0)); // TDR
        assert_eq!(row[13], json!(3000.0)); // ADD
    }

    #[tokio::test]
    async fn test_reporting_rates() {
        let (_dir, warehouse) = loaded_warehouse().await;

        let results = AnalyticalQuery::Reporting.run(&warehouse).await.unwrap();

        assert_eq!(results.rows, vec![vec![json!("Airbus"), json!(2024), json!(1000.0), json!(150.0)]]);
    }

    #[tokio::test]
    async fn test_reporting_per_role() {
        let (_dir, warehouse) = loaded_warehouse().await;

        let results = AnalyticalQuery::ReportingPerRole.run(&warehouse).await.unwrap();

        assert_eq!(results.rows.len(), 1);
        assert_eq!(results.rows[0][2], json!("PIREP"));
    }

    #[tokio::test]
    async fn test_empty_warehouse_yields_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = Warehouse::open(&WarehouseConfig::new(dir.path().join("dw.sqlite")))
            .await
            .unwrap();

        for query in AnalyticalQuery::ALL {
            assert!(query.run(&warehouse).await.unwrap().is_empty());
        }
    }
}
