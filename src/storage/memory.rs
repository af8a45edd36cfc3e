use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use tracing::{debug, trace};

use crate::core::{InfoError, Record, Result, Value};

use super::change::Change;
use super::provider::{DataProvider, StorageOperation};
use super::query::{Query, WhereCondition};

#[derive(Debug, Default)]
struct MemoryTable {
    rows: BTreeMap<u64, Record>,
    next_row_id: u64,
    next_identity: i64,
}

impl MemoryTable {
    fn allocate_row_id(&mut self) -> u64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn allocate_identity(&mut self) -> i64 {
        self.next_identity += 1;
        self.next_identity
    }

    fn observe_identity(&mut self, id: i64) {
        if id > self.next_identity {
            self.next_identity = id;
        }
    }

    fn matching(&self, condition: &WhereCondition) -> Vec<u64> {
        self.rows
            .iter()
            .filter(|(_, row)| condition.matches(row))
            .map(|(row_id, _)| *row_id)
            .collect()
    }
}

#[derive(Debug, Default)]
struct TransactionState {
    depth: usize,
    journal: Vec<Change>,
    rollback_only: bool,
}

/// In-memory [`DataProvider`] with nested transactions backed by an undo journal.
///
/// Outside a transaction mutations apply immediately and are not journaled.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    tables: RwLock<HashMap<String, MemoryTable>>,
    transaction: Mutex<TransactionState>,
    failures: Mutex<HashSet<(StorageOperation, String)>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `operation` against `object_type` fail with a storage error.
    pub fn fail_next(&self, operation: StorageOperation, object_type: &str) -> Result<()> {
        self.failures
            .lock()?
            .insert((operation, object_type.to_string()));
        Ok(())
    }

    pub fn row_count(&self, object_type: &str) -> Result<usize> {
        Ok(self
            .tables
            .read()?
            .get(object_type)
            .map(|t| t.rows.len())
            .unwrap_or(0))
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn check_failure(&self, operation: StorageOperation, object_type: &str) -> Result<()> {
        if self
            .failures
            .lock()?
            .remove(&(operation, object_type.to_string()))
        {
            return Err(InfoError::Storage(format!(
                "{:?} on '{}' failed",
                operation, object_type
            )));
        }
        Ok(())
    }

    fn record(&self, change: Change) -> Result<()> {
        let mut tx = self.transaction.lock()?;
        if tx.depth > 0 {
            tx.journal.push(change);
        }
        Ok(())
    }

    fn undo(&self, journal: Vec<Change>) -> Result<()> {
        let mut tables = self.tables.write()?;
        for change in journal.into_iter().rev() {
            let table = tables.entry(change.table_name().to_string()).or_default();
            match change {
                Change::Insert { row_id, .. } => {
                    table.rows.remove(&row_id);
                }
                Change::Update { row_id, old, .. } | Change::Delete { row_id, old, .. } => {
                    table.rows.insert(row_id, old);
                }
            }
        }
        Ok(())
    }
}

impl DataProvider for InMemoryProvider {
    fn select(&self, object_type: &str, query: &Query) -> Result<Vec<Record>> {
        self.check_failure(StorageOperation::Select, object_type)?;
        let tables = self.tables.read()?;
        let Some(table) = tables.get(object_type) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Record> = table
            .rows
            .values()
            .filter(|row| query.condition.matches(row))
            .cloned()
            .collect();
        query.sort(&mut rows);
        if let Some(top) = query.top {
            rows.truncate(top);
        }
        trace!(object_type, rows = rows.len(), "select");
        Ok(rows.into_iter().map(|r| query.project(r)).collect())
    }

    fn insert(
        &self,
        object_type: &str,
        id_column: Option<&str>,
        mut record: Record,
    ) -> Result<Option<i64>> {
        self.check_failure(StorageOperation::Insert, object_type)?;
        let (row_id, id) = {
            let mut tables = self.tables.write()?;
            let table = tables.entry(object_type.to_string()).or_default();

            let id = match id_column {
                Some(col) => {
                    let id = match record.get(col).and_then(Value::as_id) {
                        Some(explicit) => {
                            let taken = table
                                .rows
                                .values()
                                .any(|row| row.get(col).and_then(Value::as_id) == Some(explicit));
                            if taken {
                                return Err(InfoError::Storage(format!(
                                    "Duplicate id {} in '{}'",
                                    explicit, object_type
                                )));
                            }
                            table.observe_identity(explicit);
                            explicit
                        }
                        None => table.allocate_identity(),
                    };
                    record.insert(col.to_string(), Value::Integer(id));
                    Some(id)
                }
                None => None,
            };

            let row_id = table.allocate_row_id();
            table.rows.insert(row_id, record);
            (row_id, id)
        };

        self.record(Change::Insert {
            table: object_type.to_string(),
            row_id,
        })?;
        debug!(object_type, ?id, "insert");
        Ok(id)
    }

    fn update(
        &self,
        object_type: &str,
        condition: &WhereCondition,
        values: &Record,
    ) -> Result<usize> {
        self.check_failure(StorageOperation::Update, object_type)?;
        let mut changes = Vec::new();
        {
            let mut tables = self.tables.write()?;
            let Some(table) = tables.get_mut(object_type) else {
                return Ok(0);
            };
            for row_id in table.matching(condition) {
                if let Some(row) = table.rows.get_mut(&row_id) {
                    let old = row.clone();
                    for (column, value) in values {
                        row.insert(column.clone(), value.clone());
                    }
                    changes.push(Change::Update {
                        table: object_type.to_string(),
                        row_id,
                        old,
                    });
                }
            }
        }

        let count = changes.len();
        for change in changes {
            self.record(change)?;
        }
        debug!(object_type, rows = count, "update");
        Ok(count)
    }

    fn delete(&self, object_type: &str, condition: &WhereCondition) -> Result<usize> {
        self.check_failure(StorageOperation::Delete, object_type)?;
        let mut changes = Vec::new();
        {
            let mut tables = self.tables.write()?;
            let Some(table) = tables.get_mut(object_type) else {
                return Ok(0);
            };
            for row_id in table.matching(condition) {
                if let Some(old) = table.rows.remove(&row_id) {
                    changes.push(Change::Delete {
                        table: object_type.to_string(),
                        row_id,
                        old,
                    });
                }
            }
        }

        let count = changes.len();
        for change in changes {
            self.record(change)?;
        }
        debug!(object_type, rows = count, "delete");
        Ok(count)
    }

    fn begin_transaction(&self) -> Result<()> {
        let mut tx = self.transaction.lock()?;
        tx.depth += 1;
        trace!(depth = tx.depth, "begin transaction");
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        let journal = {
            let mut tx = self.transaction.lock()?;
            if tx.depth == 0 {
                return Err(InfoError::Storage(
                    "Commit without an active transaction".to_string(),
                ));
            }
            tx.depth -= 1;
            if tx.depth > 0 {
                return Ok(());
            }
            let journal = std::mem::take(&mut tx.journal);
            if !tx.rollback_only {
                return Ok(());
            }
            tx.rollback_only = false;
            journal
        };

        self.undo(journal)?;
        Err(InfoError::Storage(
            "Transaction was rolled back by a nested scope".to_string(),
        ))
    }

    fn rollback_transaction(&self) -> Result<()> {
        let journal = {
            let mut tx = self.transaction.lock()?;
            if tx.depth == 0 {
                return Err(InfoError::Storage(
                    "Rollback without an active transaction".to_string(),
                ));
            }
            tx.depth -= 1;
            if tx.depth > 0 {
                tx.rollback_only = true;
                return Ok(());
            }
            tx.rollback_only = false;
            std::mem::take(&mut tx.journal)
        };
        debug!(changes = journal.len(), "rollback");
        self.undo(journal)
    }

    fn in_transaction(&self) -> Result<bool> {
        Ok(self.transaction.lock()?.depth > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(name: &str) -> Record {
        let mut record = Record::new();
        record.insert("Name".into(), Value::from(name));
        record
    }

    #[test]
    fn test_insert_assigns_identity() {
        let provider = InMemoryProvider::new();
        let a = provider.insert("page", Some("ID"), page("a")).unwrap();
        let b = provider.insert("page", Some("ID"), page("b")).unwrap();
        assert_eq!(a, Some(1));
        assert_eq!(b, Some(2));

        let rows = provider
            .select("page", &Query::filter(WhereCondition::eq("ID", 2i64)))
            .unwrap();
        assert_eq!(rows[0]["Name"], Value::from("b"));
    }

    #[test]
    fn test_rollback_restores_rows() {
        let provider = InMemoryProvider::new();
        provider.insert("page", Some("ID"), page("keep")).unwrap();

        provider.begin_transaction().unwrap();
        provider.insert("page", Some("ID"), page("temp")).unwrap();
        provider
            .update("page", &WhereCondition::eq("ID", 1i64), &page("renamed"))
            .unwrap();
        provider.delete("page", &WhereCondition::All).unwrap();
        assert_eq!(provider.row_count("page").unwrap(), 0);
        provider.rollback_transaction().unwrap();

        let rows = provider.select("page", &Query::all()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Name"], Value::from("keep"));
    }

    #[test]
    fn test_nested_rollback_poisons_outer_commit() {
        let provider = InMemoryProvider::new();
        provider.begin_transaction().unwrap();
        provider.insert("page", Some("ID"), page("a")).unwrap();
        provider.begin_transaction().unwrap();
        provider.rollback_transaction().unwrap();
        assert!(provider.commit_transaction().is_err());
        assert_eq!(provider.row_count("page").unwrap(), 0);
        assert!(!provider.in_transaction().unwrap());
    }

    #[test]
    fn test_upsert_updates_matching_row() {
        let provider = InMemoryProvider::new();
        let key = WhereCondition::eq("Name", "a");
        let id = provider.upsert("page", Some("ID"), &key, page("a")).unwrap();
        let again = provider.upsert("page", Some("ID"), &key, page("a")).unwrap();
        assert_eq!(id, again);
        assert_eq!(provider.row_count("page").unwrap(), 1);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let provider = InMemoryProvider::new();
        provider.fail_next(StorageOperation::Insert, "page").unwrap();
        assert!(provider.insert("page", Some("ID"), page("a")).is_err());
        assert!(provider.insert("page", Some("ID"), page("a")).is_ok());
    }
}
