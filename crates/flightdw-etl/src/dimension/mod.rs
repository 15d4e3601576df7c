//! Dimension loading with an explicit per-run cache
//!
//! A [`Dimension`] describes a dimension table declaratively: its natural key,
//! its descriptive attributes and how both map to columns. Storage goes
//! through the narrow [`DimensionStore`] interface (lookup by natural key,
//! insert, update attributes), implemented by the SQLite warehouse and by the
//! in-memory [`MemoryDimensionStore`].
//!
//! [`DimensionLoader`] owns the cache. It is filled lazily by
//! [`DimensionLoader::resolve`] and never invalidated during a run, so a
//! natural key always maps to the same surrogate key within one run, and
//! across runs because existing rows are looked up before anything is
//! inserted. Attributes follow a Type-1 policy: overwritten in place.

mod memory;
mod tables;

pub use memory::MemoryDimensionStore;
pub use tables::{AircraftDim, AirportDim, DateDim, DateParts, DimensionSet, MonthDim, ReporterDim};

use crate::error::{EtlError, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::query::Query;
use sqlx::query_builder::Separated;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::debug;

/// Warehouse-assigned identifier of a dimension row.
pub type SurrogateKey = i64;

/// Column value as stored in the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn bind_to<'q>(
        self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(value) => query.bind(value),
            SqlValue::Real(value) => query.bind(value),
            SqlValue::Text(value) => query.bind(value),
        }
    }

    pub(crate) fn push_to<Sep: fmt::Display>(self, separated: &mut Separated<'_, '_, Sqlite, Sep>) {
        match self {
            SqlValue::Null => separated.push_bind(None::<i64>),
            SqlValue::Integer(value) => separated.push_bind(value),
            SqlValue::Real(value) => separated.push_bind(value),
            SqlValue::Text(value) => separated.push_bind(value),
        };
    }

    pub(crate) fn decode(row: &SqliteRow, index: usize, kind: ColumnKind) -> Result<Self> {
        let value = match kind {
            ColumnKind::Integer => row.try_get::<Option<i64>, _>(index)?.map(SqlValue::Integer),
            ColumnKind::Real => row.try_get::<Option<f64>, _>(index)?.map(SqlValue::Real),
            ColumnKind::Text => row.try_get::<Option<String>, _>(index)?.map(SqlValue::Text),
        };
        Ok(value.unwrap_or(SqlValue::Null))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
        }
    }

    pub const fn real(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Real,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }
}

/// Declarative description of a dimension table.
pub trait Dimension: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync;
    type Attributes: Clone + PartialEq + fmt::Debug + Send + Sync;

    /// Human-readable name used in logs and errors
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Surrogate key column
    const ID_COLUMN: &'static str;
    /// Natural key columns
    const KEY_COLUMNS: &'static [Column];
    const ATTRIBUTE_COLUMNS: &'static [Column];

    /// One value per key column.
    fn key_values(key: &Self::Key) -> Vec<SqlValue>;

    /// One value per attribute column.
    fn attribute_values(attributes: &Self::Attributes) -> Vec<SqlValue>;

    fn attributes_from_values(values: Vec<SqlValue>) -> Result<Self::Attributes>;
}

/// Storage backend of dimension rows.
#[async_trait]
pub trait DimensionStore<D: Dimension>: Send + Sync {
    async fn lookup(&self, key: &D::Key) -> Result<Option<(SurrogateKey, D::Attributes)>>;

    /// Insert a new row; the store assigns the surrogate key.
    async fn insert(&self, key: &D::Key, attributes: &D::Attributes) -> Result<SurrogateKey>;

    async fn update_attributes(&self, id: SurrogateKey, attributes: &D::Attributes) -> Result<()>;
}

/// Per-dimension counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DimensionStats {
    pub dimension: &'static str,
    /// New rows inserted into the warehouse
    pub inserted: usize,
    /// Rows that already existed in the warehouse
    pub reused: usize,
    /// Existing rows whose attributes were overwritten
    pub updated: usize,
    /// Resolutions answered from the cache
    pub cache_hits: usize,
}

#[derive(Debug, Clone)]
struct CachedMember<A> {
    id: SurrogateKey,
    attributes: A,
}

pub struct DimensionLoader<D: Dimension> {
    cache: HashMap<D::Key, CachedMember<D::Attributes>>,
    stats: DimensionStats,
}

impl<D: Dimension> Default for DimensionLoader<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dimension> DimensionLoader<D> {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            stats: DimensionStats {
                dimension: D::NAME,
                ..DimensionStats::default()
            },
        }
    }

    /// Surrogate key of `key`, inserting the row if it does not exist yet.
    /// Differing attributes overwrite the stored ones.
    pub async fn resolve<S>(&mut self, store: &S, key: &D::Key, attributes: &D::Attributes) -> Result<SurrogateKey>
    where
        S: DimensionStore<D> + ?Sized,
    {
        if let Some(member) = self.cache.get_mut(key) {
            self.stats.cache_hits += 1;
            if member.attributes != *attributes {
                store.update_attributes(member.id, attributes).await?;
                member.attributes = attributes.clone();
                self.stats.updated += 1;
            }
            return Ok(member.id);
        }

        let id = match store.lookup(key).await? {
            Some((id, stored)) => {
                self.stats.reused += 1;
                if stored != *attributes {
                    debug!(dimension = D::NAME, ?key, id, "Overwriting changed attributes");
                    store.update_attributes(id, attributes).await?;
                    self.stats.updated += 1;
                }
                id
            },
            None => {
                let id = store.insert(key, attributes).await?;
                self.stats.inserted += 1;
                id
            },
        };

        self.cache.insert(
            key.clone(),
            CachedMember {
                id,
                attributes: attributes.clone(),
            },
        );
        Ok(id)
    }

    /// Like [`resolve`](Self::resolve), but an existing row keeps its
    /// attributes. `placeholder` is only written when the row is new.
    pub async fn resolve_inferred<S>(
        &mut self,
        store: &S,
        key: &D::Key,
        placeholder: &D::Attributes,
    ) -> Result<SurrogateKey>
    where
        S: DimensionStore<D> + ?Sized,
    {
        if let Some(member) = self.cache.get(key) {
            self.stats.cache_hits += 1;
            return Ok(member.id);
        }

        let member = match store.lookup(key).await? {
            Some((id, attributes)) => {
                self.stats.reused += 1;
                CachedMember { id, attributes }
            },
            None => {
                let id = store.insert(key, placeholder).await?;
                self.stats.inserted += 1;
                CachedMember {
                    id,
                    attributes: placeholder.clone(),
                }
            },
        };

        let id = member.id;
        self.cache.insert(key.clone(), member);
        Ok(id)
    }

    /// Cached surrogate key of a natural key resolved earlier in this run.
    pub fn require(&self, key: &D::Key) -> Result<SurrogateKey> {
        self.cache
            .get(key)
            .map(|member| member.id)
            .ok_or_else(|| EtlError::ReferentialIntegrity {
                dimension: D::NAME,
                key: format!("{:?}", key),
            })
    }

    pub fn cached(&self, key: &D::Key) -> Option<SurrogateKey> {
        self.cache.get(key).map(|member| member.id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> &DimensionStats {
        &self.stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{AircraftAttributes, Manufacturer};

    fn airbus(model: &str) -> AircraftAttributes {
        AircraftAttributes {
            serial_number: Some("MSN-1".into()),
            model: Some(model.into()),
            manufacturer: Some(Manufacturer::Airbus),
        }
    }

    #[tokio::test]
    async fn test_resolve_twice_returns_same_key() {
        let store = MemoryDimensionStore::<AircraftDim>::new();
        let mut loader = DimensionLoader::<AircraftDim>::new();
        let key = "EC-AAA".to_string();

        let first = loader.resolve(&store, &key, &airbus("A320")).await.unwrap();
        let second = loader.resolve(&store, &key, &airbus("A320")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(loader.stats().inserted, 1);
        assert_eq!(loader.stats().cache_hits, 1);
        assert_eq!(loader.stats().updated, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_with_changed_attributes_overwrites() {
        let store = MemoryDimensionStore::<AircraftDim>::new();
        let mut loader = DimensionLoader::<AircraftDim>::new();
        let key = "EC-AAA".to_string();

        let id = loader.resolve(&store, &key, &airbus("A320")).await.unwrap();
        let again = loader.resolve(&store, &key, &airbus("A321")).await.unwrap();

        assert_eq!(id, again);
        assert_eq!(store.get(&key).unwrap().1.model.as_deref(), Some("A321"));
        assert_eq!(loader.stats().updated, 1);
    }

    #[tokio::test]
    async fn test_inferred_member_never_overwrites() {
        let store = MemoryDimensionStore::<AircraftDim>::new();
        let key = "EC-AAA".to_string();
        let mut earlier = DimensionLoader::<AircraftDim>::new();
        earlier.resolve(&store, &key, &airbus("A320")).await.unwrap();

        let mut loader = DimensionLoader::<AircraftDim>::new();
        loader
            .resolve_inferred(&store, &key, &AircraftAttributes::default())
            .await
            .unwrap();

        assert_eq!(store.get(&key).unwrap().1, airbus("A320"));
        assert_eq!(loader.stats().reused, 1);
        assert_eq!(loader.stats().inserted, 0);
    }

    #[test]
    fn test_require_unresolved_key_is_referential_integrity_error() {
        let loader = DimensionLoader::<AirportDim>::new();

        let err = loader.require(&"JFK".to_string()).unwrap_err();

        assert!(matches!(
            err,
            EtlError::ReferentialIntegrity {
                dimension: "airport",
                ..
            }
        ));
    }
}
