//! `flightdw query` command implementation
//!
//! Runs the analytical queries against an existing warehouse and prints each
//! result with its execution time.

use crate::error::{CliError, Result};
use crate::{output, ResultFormat};
use flightdw_etl::{AnalyticalQuery, QueryResults, Warehouse};
use std::path::Path;
use tracing::{debug, info};

/// Run the query command
pub async fn run(warehouse_path: &Path, query: &str, format: ResultFormat) -> Result<()> {
    let queries = select_queries(query)?;

    if !warehouse_path.is_file() {
        return Err(CliError::WarehouseNotFound(warehouse_path.display().to_string()));
    }
    let warehouse = Warehouse::open_existing(warehouse_path).await?;

    let mut results = Vec::with_capacity(queries.len());
    for query in queries {
        debug!(query = %query, "Running analytical query");
        match query.run(&warehouse).await {
            Ok(result) => results.push(result),
            Err(e) => {
                warehouse.close().await;
                return Err(e.into());
            }
        }
    }
    warehouse.close().await;
    info!(queries = results.len(), "Queries complete");

    output::print(&render(&results, format)?)
}

fn select_queries(query: &str) -> Result<Vec<AnalyticalQuery>> {
    if query.eq_ignore_ascii_case("all") {
        return Ok(AnalyticalQuery::ALL.to_vec());
    }
    let selected = query.parse::<AnalyticalQuery>().map_err(CliError::invalid_argument)?;
    Ok(vec![selected])
}

fn render(results: &[QueryResults], format: ResultFormat) -> Result<String> {
    match format {
        ResultFormat::Json => output::results_as_json(results),
        ResultFormat::Table => Ok(results
            .iter()
            .map(output::results_as_table)
            .collect::<Vec<_>>()
            .join("\n")),
        ResultFormat::Csv => {
            let mut blocks = Vec::with_capacity(results.len());
            for result in results {
                let csv = output::results_as_csv(result)?;
                // Titles separate blocks only when several queries share stdout
                if results.len() > 1 {
                    blocks.push(format!("# {}\n{}", result.query, csv));
                } else {
                    blocks.push(csv);
                }
            }
            Ok(blocks.join("\n"))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_queries() {
        assert_eq!(select_queries("all").unwrap(), AnalyticalQuery::ALL.to_vec());
        assert_eq!(select_queries("ALL").unwrap().len(), 3);
    }

    #[test]
    fn test_select_single_query() {
        assert_eq!(
            select_queries("reporting_per_role").unwrap(),
            vec![AnalyticalQuery::ReportingPerRole]
        );
    }

    #[test]
    fn test_unknown_query_is_invalid_argument() {
        let err = select_queries("revenue").unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_warehouse_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("missing.sqlite"), "all", ResultFormat::Table)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::WarehouseNotFound(_)));
    }
}
