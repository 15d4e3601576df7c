use super::{Dimension, DimensionStore, SurrogateKey};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

struct Rows<D: Dimension> {
    next_id: SurrogateKey,
    by_key: HashMap<D::Key, (SurrogateKey, D::Attributes)>,
}

/// Dimension store kept in process memory. Surrogate keys start at 1, like
/// the warehouse's.
pub struct MemoryDimensionStore<D: Dimension> {
    rows: Mutex<Rows<D>>,
}

impl<D: Dimension> Default for MemoryDimensionStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dimension> MemoryDimensionStore<D> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Rows {
                next_id: 1,
                by_key: HashMap::new(),
            }),
        }
    }

    fn with_rows<T>(&self, f: impl FnOnce(&mut Rows<D>) -> Result<T>) -> Result<T> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| EtlError::storage(format!("{} store lock poisoned", D::NAME)))?;
        f(&mut rows)
    }

    pub fn get(&self, key: &D::Key) -> Option<(SurrogateKey, D::Attributes)> {
        self.with_rows(|rows| Ok(rows.by_key.get(key).cloned())).ok().flatten()
    }

    pub fn len(&self) -> usize {
        self.with_rows(|rows| Ok(rows.by_key.len())).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<D: Dimension> DimensionStore<D> for MemoryDimensionStore<D> {
    async fn lookup(&self, key: &D::Key) -> Result<Option<(SurrogateKey, D::Attributes)>> {
        self.with_rows(|rows| Ok(rows.by_key.get(key).cloned()))
    }

    async fn insert(&self, key: &D::Key, attributes: &D::Attributes) -> Result<SurrogateKey> {
        self.with_rows(|rows| {
            if rows.by_key.contains_key(key) {
                return Err(EtlError::storage(format!(
                    "UNIQUE constraint failed: {} {:?}",
                    D::TABLE,
                    key
                )));
            }
            let id = rows.next_id;
            rows.next_id += 1;
            rows.by_key.insert(key.clone(), (id, attributes.clone()));
            Ok(id)
        })
    }

    async fn update_attributes(&self, id: SurrogateKey, attributes: &D::Attributes) -> Result<()> {
        self.with_rows(|rows| {
            let row = rows
                .by_key
                .values_mut()
                .find(|(row_id, _)| *row_id == id)
                .ok_or_else(|| EtlError::storage(format!("{} has no row {}", D::TABLE, id)))?;
            row.1 = attributes.clone();
            Ok(())
        })
    }
}
