//! Rendering of run summaries and query results
//!
//! Every renderer returns a `String`; commands pass it to [`print`]. Tables
//! use the same rounded UTF-8 preset throughout.

use crate::error::{CliError, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use flightdw_etl::{QueryResults, RunSummary};
use serde_json::Value;
use std::io::Write;

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Human-readable run summary: headline counts, then one table per stage.
pub fn summary_as_table(summary: &RunSummary) -> String {
    let mut out = format!(
        "ETL run {} completed in {} ms\nLoad timestamp: {}\n\n",
        summary.run_id,
        summary.elapsed_ms,
        summary.load_timestamp.to_rfc3339()
    );

    let mut rows = new_table();
    rows.set_header(vec!["Extracted", "Transformed", "Dropped"]);
    rows.add_row(vec![
        summary.rows_extracted.to_string(),
        summary.rows_transformed.to_string(),
        summary.rows_dropped.to_string(),
    ]);
    out.push_str(&format!("{}\n\n", rows));

    let mut dims = new_table();
    dims.set_header(vec!["Dimension", "Inserted", "Reused", "Updated", "Cache hits"]);
    for stats in &summary.dimensions {
        dims.add_row(vec![
            stats.dimension.to_string(),
            stats.inserted.to_string(),
            stats.reused.to_string(),
            stats.updated.to_string(),
            stats.cache_hits.to_string(),
        ]);
    }
    out.push_str(&format!("{}\n\n", dims));

    let mut facts = new_table();
    facts.set_header(vec!["Fact table", "Loaded", "Rejected"]);
    for report in &summary.facts {
        facts.add_row(vec![
            report.table.to_string(),
            report.loaded.to_string(),
            report.rejected.to_string(),
        ]);
    }
    out.push_str(&format!("{}\n", facts));

    for report in summary.facts.iter().filter(|r| !r.sample_errors.is_empty()) {
        out.push_str(&format!("\nRejected rows in {}:\n", report.table));
        for message in &report.sample_errors {
            out.push_str(&format!("  - {}\n", message));
        }
    }

    out
}

pub fn summary_as_json(summary: &RunSummary) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string_pretty(summary)?))
}

/// Query title, result table (or a placeholder) and the execution time.
pub fn results_as_table(results: &QueryResults) -> String {
    let mut out = format!("{}\n", results.query.title());

    if results.is_empty() {
        out.push_str("(No results)\n");
    } else {
        let mut table = new_table();
        table.set_header(&results.columns);
        for row in &results.rows {
            table.add_row(row.iter().map(value_to_string).collect::<Vec<_>>());
        }
        out.push_str(&format!("{}\n", table));
    }

    out.push_str(&format!(
        "{} row(s), query executed in {:.2} ms\n",
        results.rows.len(),
        results.elapsed_ms
    ));
    out
}

pub fn results_as_csv(results: &QueryResults) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&results.columns)?;
    for row in &results.rows {
        writer.write_record(row.iter().map(value_to_string))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CliError::output(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CliError::output(e.to_string()))
}

/// All results as one JSON array, rows keyed by column name.
pub fn results_as_json(results: &[QueryResults]) -> Result<String> {
    let documents: Vec<Value> = results
        .iter()
        .map(|result| {
            let rows: Vec<Value> = result
                .rows
                .iter()
                .map(|row| {
                    let map: serde_json::Map<String, Value> = result
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(column, value)| (column.to_string(), value.clone()))
                        .collect();
                    Value::Object(map)
                })
                .collect();
            serde_json::json!({
                "query": result.query,
                "elapsed_ms": result.elapsed_ms,
                "rows": rows,
            })
        })
        .collect();

    Ok(format!("{}\n", serde_json::to_string_pretty(&documents)?))
}

/// Write rendered output to stdout. A closed pipe is reported, not a panic.
pub fn print(rendered: &str) -> Result<()> {
    write_to(&mut std::io::stdout().lock(), rendered)
}

fn write_to(writer: &mut impl Write, rendered: &str) -> Result<()> {
    writer.write_all(rendered.as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
