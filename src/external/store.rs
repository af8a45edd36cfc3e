use tracing::{debug, trace};

use crate::config::LineEnding;
use crate::core::{Result, Value};
use crate::data::ColumnValues;

use super::provider::StorageProvider;
use super::setting::ExternalColumnSetting;

/// Reads and writes external column values through a [`StorageProvider`].
pub struct ExternalStore<'a> {
    files: &'a dyn StorageProvider,
    line_ending: LineEnding,
    delete_unused_files: bool,
}

impl<'a> ExternalStore<'a> {
    pub fn new(files: &'a dyn StorageProvider, line_ending: LineEnding, delete_unused_files: bool) -> Self {
        Self {
            files,
            line_ending,
            delete_unused_files,
        }
    }

    /// Persists `value` at the path computed from `current`.
    ///
    /// When the path differs from the one implied by `original` and unused
    /// files are to be deleted, the old file is removed. Returns `true` when
    /// the database copy of the column should be suppressed.
    pub fn write(
        &self,
        setting: &ExternalColumnSetting,
        current: &ColumnValues<'_>,
        original: &ColumnValues<'_>,
        value: &Value,
    ) -> Result<bool> {
        let Some(path) = setting.path_for(current) else {
            return Ok(false);
        };

        if setting.delete_unused_files.unwrap_or(self.delete_unused_files)
            && let Some(old_path) = setting.path_for(original)
            && old_path != path
            && self.files.exists(&old_path)?
        {
            debug!(column = %setting.column, %old_path, %path, "Removing unused external file");
            self.files.delete(&old_path)?;
        }

        let data = self.encode(setting, value);
        let exists = self.files.exists(&path)?;
        if data.is_empty() && !exists {
            return Ok(setting.suppresses_database());
        }
        if exists && self.files.read(&path)? == data {
            trace!(column = %setting.column, %path, "External content unchanged");
            return Ok(setting.suppresses_database());
        }

        self.files.write(&path, &data)?;
        debug!(column = %setting.column, %path, bytes = data.len(), "Wrote external column");
        Ok(setting.suppresses_database())
    }

    /// Value stored for the object described by `original`, if any.
    pub fn read(&self, setting: &ExternalColumnSetting, original: &ColumnValues<'_>) -> Result<Option<Value>> {
        let Some(path) = setting.path_for(original) else {
            return Ok(None);
        };
        let info = self.files.file_info(&path)?;
        if !info.exists {
            return Ok(None);
        }
        let data = info.read_all()?;
        Ok(Some(setting.transform_read(self.decode(setting, data))))
    }

    /// Compares the file content with the database value.
    ///
    /// A missing file or an empty database value is never a conflict.
    pub fn is_consistent(
        &self,
        setting: &ExternalColumnSetting,
        values: &ColumnValues<'_>,
        db_value: &Value,
    ) -> Result<bool> {
        if db_value.is_empty() {
            return Ok(true);
        }
        let Some(file_value) = self.read(setting, values)? else {
            return Ok(true);
        };
        let db_value = setting.transform_read(db_value.clone());

        Ok(match (&file_value, &db_value) {
            (Value::Text(file), Value::Text(db)) => {
                self.line_ending.normalize(file) == self.line_ending.normalize(db)
            }
            _ => file_value == db_value,
        })
    }

    /// Removes the backing file of the column.
    pub fn delete(&self, setting: &ExternalColumnSetting, values: &ColumnValues<'_>) -> Result<()> {
        if let Some(path) = setting.path_for(values) {
            self.files.delete(&path)?;
        }
        Ok(())
    }

    fn encode(&self, setting: &ExternalColumnSetting, value: &Value) -> Vec<u8> {
        match setting.transform_write(value.clone()) {
            Value::Null => Vec::new(),
            Value::Binary(bytes) => bytes,
            Value::Text(text) if setting.is_binary => text.into_bytes(),
            Value::Text(text) => self.line_ending.normalize(&text).into_bytes(),
            other => self.line_ending.normalize(&other.to_string()).into_bytes(),
        }
    }

    fn decode(&self, setting: &ExternalColumnSetting, data: Vec<u8>) -> Value {
        if setting.is_binary {
            Value::Binary(data)
        } else {
            Value::Text(self.line_ending.normalize(&String::from_utf8_lossy(&data)))
        }
    }
}
