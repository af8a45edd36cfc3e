use crate::core::{InfoError, Record, Result, Value};

use super::query::{Query, WhereCondition};

/// Operation names reported by providers in logs and injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOperation {
    Select,
    Insert,
    Update,
    Delete,
}

/// Row store the object lifecycle persists through.
///
/// Tables are addressed by object type name. Providers are shared between
/// threads, so every method takes `&self`.
pub trait DataProvider: Send + Sync {
    fn select(&self, object_type: &str, query: &Query) -> Result<Vec<Record>>;

    /// Inserts a row. When `id_column` is given and the record carries no
    /// positive id there, the provider assigns one and returns it.
    fn insert(&self, object_type: &str, id_column: Option<&str>, record: Record)
    -> Result<Option<i64>>;

    /// Overwrites the given columns on every matching row.
    fn update(&self, object_type: &str, condition: &WhereCondition, values: &Record)
    -> Result<usize>;

    fn delete(&self, object_type: &str, condition: &WhereCondition) -> Result<usize>;

    fn begin_transaction(&self) -> Result<()>;

    fn commit_transaction(&self) -> Result<()>;

    fn rollback_transaction(&self) -> Result<()>;

    fn in_transaction(&self) -> Result<bool>;

    fn count(&self, object_type: &str, condition: &WhereCondition) -> Result<usize> {
        Ok(self
            .select(object_type, &Query::filter(condition.clone()))?
            .len())
    }

    fn exists(&self, object_type: &str, condition: &WhereCondition) -> Result<bool> {
        Ok(!self
            .select(object_type, &Query::filter(condition.clone()).top(Some(1)))?
            .is_empty())
    }

    /// Updates the row matching `key` or inserts a new one.
    ///
    /// Returns the id of the affected row when the type has one.
    fn upsert(
        &self,
        object_type: &str,
        id_column: Option<&str>,
        key: &WhereCondition,
        record: Record,
    ) -> Result<Option<i64>> {
        let existing = self.select(object_type, &Query::filter(key.clone()).top(Some(2)))?;
        match existing.len() {
            0 => self.insert(object_type, id_column, record),
            1 => {
                let mut values = record;
                let existing_id = id_column.and_then(|col| {
                    existing[0].get(col).and_then(Value::as_id)
                });
                if let Some(col) = id_column {
                    values.remove(col);
                }
                self.update(object_type, key, &values)?;
                Ok(existing_id)
            }
            n => Err(InfoError::Storage(format!(
                "Upsert key for '{}' matches {} rows",
                object_type, n
            ))),
        }
    }
}
