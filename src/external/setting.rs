use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::Value;
use crate::data::ColumnValues;

/// Where the value of a column lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExternalStorageMode {
    /// Database only; the setting is inert.
    Database,
    /// File only; the database copy is left empty.
    #[default]
    External,
    /// File and database both hold the value.
    Both,
}

pub type PathGenerator = Arc<dyn Fn(&ColumnValues<'_>) -> Option<String> + Send + Sync>;
pub type ValueTransform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Storage policy of one externally stored column.
#[derive(Clone)]
pub struct ExternalColumnSetting {
    pub column: String,
    pub mode: ExternalStorageMode,
    pub is_binary: bool,
    pub delete_unused_files: Option<bool>,
    path: PathGenerator,
    read_transform: Option<ValueTransform>,
    write_transform: Option<ValueTransform>,
}

impl ExternalColumnSetting {
    pub fn new<F>(column: &str, path: F) -> Self
    where
        F: Fn(&ColumnValues<'_>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            column: column.to_string(),
            mode: ExternalStorageMode::External,
            is_binary: false,
            delete_unused_files: None,
            path: Arc::new(path),
            read_transform: None,
            write_transform: None,
        }
    }

    pub fn mode(mut self, mode: ExternalStorageMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn binary(mut self) -> Self {
        self.is_binary = true;
        self
    }

    pub fn delete_unused_files(mut self, delete: bool) -> Self {
        self.delete_unused_files = Some(delete);
        self
    }

    /// Applied to file content before it is handed out.
    pub fn on_read<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.read_transform = Some(Arc::new(transform));
        self
    }

    /// Applied to the value before it is written to the file.
    pub fn on_write<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.write_transform = Some(Arc::new(transform));
        self
    }

    pub fn is_external(&self) -> bool {
        self.mode != ExternalStorageMode::Database
    }

    /// The database copy is suppressed in favor of the file.
    pub fn suppresses_database(&self) -> bool {
        self.mode == ExternalStorageMode::External
    }

    /// Storage path for the given column values; empty paths count as none.
    pub fn path_for(&self, values: &ColumnValues<'_>) -> Option<String> {
        (self.path)(values).filter(|p| !p.trim().is_empty())
    }

    pub fn transform_read(&self, value: Value) -> Value {
        match &self.read_transform {
            Some(transform) => transform(&value),
            None => value,
        }
    }

    pub fn transform_write(&self, value: Value) -> Value {
        match &self.write_transform {
            Some(transform) => transform(&value),
            None => value,
        }
    }
}

impl fmt::Debug for ExternalColumnSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalColumnSetting")
            .field("column", &self.column)
            .field("mode", &self.mode)
            .field("is_binary", &self.is_binary)
            .finish_non_exhaustive()
    }
}

/// The external column settings of one type, keyed by lowercase column name.
#[derive(Debug, Default)]
pub struct ExternalColumns {
    settings: HashMap<String, ExternalColumnSetting>,
    order: Vec<String>,
}

impl ExternalColumns {
    pub fn new(settings: Vec<ExternalColumnSetting>) -> Self {
        let mut columns = Self::default();
        for setting in settings.into_iter().filter(|s| s.is_external()) {
            let key = setting.column.to_ascii_lowercase();
            if columns.settings.insert(key.clone(), setting).is_none() {
                columns.order.push(key);
            }
        }
        columns
    }

    pub fn get(&self, column: &str) -> Option<&ExternalColumnSetting> {
        self.settings.get(&column.to_ascii_lowercase())
    }

    /// Settings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ExternalColumnSetting> {
        self.order.iter().filter_map(|key| self.settings.get(key))
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }
}
