use std::sync::Arc;

use crate::core::{Record, Schema, Value};

/// Raw column values of one record with original values and dirty bits.
#[derive(Debug, Clone)]
pub struct DataContainer {
    schema: Arc<Schema>,
    values: Vec<Value>,
    original: Vec<Value>,
    changed: Vec<bool>,
    complete: bool,
    read_only: bool,
}

impl DataContainer {
    /// Empty container: every column `Null`, nothing loaded.
    pub fn new(schema: Arc<Schema>) -> Self {
        let count = schema.column_count();
        Self {
            schema,
            values: vec![Value::Null; count],
            original: vec![Value::Null; count],
            changed: vec![false; count],
            complete: false,
            read_only: false,
        }
    }

    /// Container loaded from a stored row; unknown record keys are ignored.
    pub fn from_record(schema: Arc<Schema>, record: &Record) -> Self {
        let mut container = Self::new(schema);
        for (name, value) in record {
            if let Some(idx) = container.schema.find_column_index(name) {
                container.values[idx] = value.clone();
                container.original[idx] = value.clone();
            }
        }
        container.complete = true;
        container
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.schema.find_column_index(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index_of(column).is_some()
    }

    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|idx| &self.values[idx])
    }

    pub fn get_original_value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|idx| &self.original[idx])
    }

    /// `None` when the column is unknown or holds `Null`.
    pub fn try_get_value(&self, column: &str) -> Option<&Value> {
        self.get_value(column).filter(|v| !v.is_null())
    }

    pub fn value_at(&self, idx: usize) -> &Value {
        &self.values[idx]
    }

    pub fn original_at(&self, idx: usize) -> &Value {
        &self.original[idx]
    }

    /// Writes a value and updates its dirty bit; `false` when rejected.
    pub fn set_value(&mut self, column: &str, value: Value) -> bool {
        match self.index_of(column) {
            Some(idx) if !self.read_only => {
                self.set_raw(idx, value);
                self.mark_changed(idx);
                true
            }
            _ => false,
        }
    }

    /// Stores a value without touching the dirty bit.
    pub(crate) fn set_raw(&mut self, idx: usize, value: Value) {
        self.values[idx] = value;
    }

    /// Recomputes the dirty bit against the original value.
    pub(crate) fn mark_changed(&mut self, idx: usize) {
        self.changed[idx] = self.values[idx] != self.original[idx];
    }

    /// Stores a value as if it had been loaded: current and original, clean.
    pub(crate) fn set_unchanged(&mut self, idx: usize, value: Value) {
        self.values[idx] = value.clone();
        self.original[idx] = value;
        self.changed[idx] = false;
    }

    pub fn item_changed(&self, column: &str) -> bool {
        self.index_of(column).is_some_and(|idx| self.changed[idx])
    }

    pub fn is_changed_at(&self, idx: usize) -> bool {
        self.changed[idx]
    }

    pub fn has_changed(&self) -> bool {
        self.changed.iter().any(|c| *c)
    }

    pub fn changed_columns(&self) -> Vec<String> {
        self.schema
            .columns()
            .iter()
            .zip(&self.changed)
            .filter(|(_, changed)| **changed)
            .map(|(column, _)| column.name.clone())
            .collect()
    }

    /// Current values become the original ones.
    pub fn reset_changes(&mut self) {
        self.original.clone_from(&self.values);
        self.changed.iter_mut().for_each(|c| *c = false);
    }

    /// Original values are restored.
    pub fn revert_changes(&mut self) {
        self.values.clone_from(&self.original);
        self.changed.iter_mut().for_each(|c| *c = false);
    }

    /// Forgets the loaded state: originals become `Null` and every non-null
    /// value counts as changed (used for structural copies).
    pub fn detach(&mut self) {
        self.original = vec![Value::Null; self.values.len()];
        for idx in 0..self.values.len() {
            self.mark_changed(idx);
        }
        self.complete = false;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn to_record(&self) -> Record {
        self.schema
            .column_names()
            .zip(&self.values)
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    pub fn original_record(&self) -> Record {
        self.schema
            .column_names()
            .zip(&self.original)
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    /// Read view over current (`original == false`) or original values.
    pub fn view(&self, original: bool) -> ColumnValues<'_> {
        ColumnValues {
            container: self,
            original,
        }
    }
}

/// Borrowed view used by path generators and other column-keyed callbacks.
#[derive(Clone, Copy)]
pub struct ColumnValues<'a> {
    container: &'a DataContainer,
    original: bool,
}

impl<'a> ColumnValues<'a> {
    pub fn get(&self, column: &str) -> Value {
        let value = if self.original {
            self.container.get_original_value(column)
        } else {
            self.container.get_value(column)
        };
        value.cloned().unwrap_or(Value::Null)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).as_i64()
    }

    pub fn get_string(&self, column: &str) -> String {
        match self.get(column) {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn is_original(&self) -> bool {
        self.original
    }
}
