//! SQLite-backed star-schema warehouse
//!
//! The schema lives in `migrations/` and is applied on every [`Warehouse::open`].
//! The pool holds a single connection: every write of a run happens
//! sequentially, in one place.

use crate::config::WarehouseConfig;
use crate::dimension::{ColumnKind, Dimension, DimensionStore, SqlValue, SurrogateKey};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Every table of the star schema, dimensions first.
pub const TABLES: &[&str] = &[
    "Aircrafts",
    "Airports",
    "Dates",
    "Months",
    "Reporters",
    "Flight_Legs",
    "Flight_Operations_Daily",
    "Aircraft_Monthly_Summary",
    "Logbooks",
];

const ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub struct Warehouse {
    pool: SqlitePool,
    path: PathBuf,
}

impl Warehouse {
    /// Open (creating if needed) the warehouse and bring its schema up to date.
    /// With `reset`, any previous warehouse file is deleted first.
    pub async fn open(config: &WarehouseConfig) -> Result<Self> {
        if config.reset {
            remove_warehouse_files(&config.path).await?;
        }

        let pool = connect(&config.path, true).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(path = %config.path.display(), reset = config.reset, "Warehouse ready");
        Ok(Self {
            pool,
            path: config.path.clone(),
        })
    }

    /// Open a warehouse produced by an earlier run, for reading.
    pub async fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EtlError::config(format!(
                "Warehouse '{}' does not exist; run the ETL first",
                path.display()
            )));
        }

        let pool = connect(path, false).await?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!(path = %self.path.display(), "Warehouse closed");
    }

    /// Row count of one star-schema table.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            return Err(EtlError::storage(format!("Unknown warehouse table '{}'", table)));
        }

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| with_context(format!("counting {}", table), e))?;
        Ok(count)
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .connect_with(options)
        .await
        .map_err(|e| {
            EtlError::connection(format!("Cannot open warehouse '{}': {}", path.display(), e))
        })
}

async fn remove_warehouse_files(path: &Path) -> Result<()> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }

    for file in files {
        match tokio::fs::remove_file(&file).await {
            Ok(()) => info!(path = %file.display(), "Removed previous warehouse file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => {
                return Err(EtlError::storage(format!(
                    "Cannot reset warehouse '{}': {}",
                    file.display(),
                    e
                )))
            },
        }
    }
    Ok(())
}

/// Keep connection failures as such; prefix everything else with what we
/// were doing.
fn with_context(action: impl std::fmt::Display, err: sqlx::Error) -> EtlError {
    match EtlError::from(err) {
        EtlError::Storage(message) => EtlError::Storage(format!("{}: {}", action, message)),
        other => other,
    }
}

fn column_list(columns: impl Iterator<Item = &'static str>) -> String {
    columns.collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl<D: Dimension> DimensionStore<D> for Warehouse {
    async fn lookup(&self, key: &D::Key) -> Result<Option<(SurrogateKey, D::Attributes)>> {
        let selected = std::iter::once(D::ID_COLUMN).chain(D::ATTRIBUTE_COLUMNS.iter().map(|c| c.name));
        let filter = D::KEY_COLUMNS
            .iter()
            .map(|c| format!("{} IS ?", c.name))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT {} FROM {} WHERE {}", column_list(selected), D::TABLE, filter);

        let mut query = sqlx::query(&sql);
        for value in D::key_values(key) {
            query = value.bind_to(query);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| with_context(format!("{} lookup of {:?}", D::TABLE, key), e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id = SqlValue::decode(&row, 0, ColumnKind::Integer)?
            .as_integer()
            .ok_or_else(|| EtlError::storage(format!("{} row without {}", D::TABLE, D::ID_COLUMN)))?;
        let values = D::ATTRIBUTE_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| SqlValue::decode(&row, i + 1, column.kind))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some((id, D::attributes_from_values(values)?)))
    }

    async fn insert(&self, key: &D::Key, attributes: &D::Attributes) -> Result<SurrogateKey> {
        let columns = D::KEY_COLUMNS.iter().chain(D::ATTRIBUTE_COLUMNS).map(|c| c.name);
        let placeholders = vec!["?"; D::KEY_COLUMNS.len() + D::ATTRIBUTE_COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            D::TABLE,
            column_list(columns),
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for value in D::key_values(key).into_iter().chain(D::attribute_values(attributes)) {
            query = value.bind_to(query);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| with_context(format!("{} insert of {:?}", D::TABLE, key), e))?;

        Ok(result.last_insert_rowid())
    }

    async fn update_attributes(&self, id: SurrogateKey, attributes: &D::Attributes) -> Result<()> {
        if D::ATTRIBUTE_COLUMNS.is_empty() {
            return Ok(());
        }

        let assignments = D::ATTRIBUTE_COLUMNS
            .iter()
            .map(|c| format!("{} = ?", c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {} WHERE {} = ?", D::TABLE, assignments, D::ID_COLUMN);

        let mut query = sqlx::query(&sql);
        for value in D::attribute_values(attributes) {
            query = value.bind_to(query);
        }

        let result = query
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| with_context(format!("{} update of row {}", D::TABLE, id), e))?;

        if result.rows_affected() == 0 {
            return Err(EtlError::storage(format!("{} has no row {}", D::TABLE, id)));
        }
        Ok(())
    }
}
