use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Utc};
use log::warn;
use once_cell::sync::OnceCell;
use uuid::Uuid;

use super::status::ObjectStatus;
use crate::config::LineEnding;
use crate::core::{InfoError, Record, Result, Value};
use crate::data::{ColumnValues, DataContainer};
use crate::external::{ExternalStore, StorageProvider};
use crate::metadata::TypeInfo;

type DataInitializer = Box<dyn FnOnce() -> Result<DataContainer> + Send>;

/// File storage an object reads and writes its external columns through.
#[derive(Clone)]
pub(crate) struct ExternalBinding {
    pub(crate) files: Arc<dyn StorageProvider>,
    pub(crate) line_ending: LineEnding,
    pub(crate) delete_unused_files: bool,
}

impl ExternalBinding {
    pub(crate) fn store(&self) -> ExternalStore<'_> {
        ExternalStore::new(self.files.as_ref(), self.line_ending, self.delete_unused_files)
    }
}

#[derive(Clone)]
pub(crate) struct CachedSettings {
    pub(crate) stamp: u64,
    pub(crate) object_id: i64,
    pub(crate) settings: InfoObject,
}

/// One persistent record of a registered object type.
///
/// Column access goes through a [`DataContainer`] that tracks original
/// values and per-column dirty bits. The container is created on first
/// access, optionally by a caller-supplied initializer; an initializer
/// failure is remembered and reported by every later access.
pub struct InfoObject {
    type_info: Arc<TypeInfo>,
    data: OnceCell<std::result::Result<DataContainer, InfoError>>,
    initializer: Mutex<Option<DataInitializer>>,
    pub(crate) status: ObjectStatus,
    pub(crate) is_clone: bool,
    pub(crate) modified_externally: bool,
    pub(crate) external: Option<ExternalBinding>,
    related: HashMap<String, InfoObject>,
    pub(crate) settings: Option<Box<CachedSettings>>,
    original_view: AtomicBool,
    original_lock: Mutex<()>,
}

impl InfoObject {
    /// Empty, unsaved instance.
    pub fn new(type_info: Arc<TypeInfo>) -> Self {
        let container = DataContainer::new(type_info.schema.clone());
        Self::with_data(type_info, Some(Ok(container)), None)
    }

    /// Instance whose data is produced by `initializer` on first access.
    pub fn lazy<F>(type_info: Arc<TypeInfo>, initializer: F) -> Self
    where
        F: FnOnce() -> Result<DataContainer> + Send + 'static,
    {
        Self::with_data(type_info, None, Some(Box::new(initializer)))
    }

    /// Instance loaded from a stored row.
    pub fn from_record(type_info: Arc<TypeInfo>, record: &Record) -> Self {
        let container = DataContainer::from_record(type_info.schema.clone(), record);
        let mut object = Self::with_data(type_info, Some(Ok(container)), None);
        object.status = ObjectStatus::Unchanged;
        object
    }

    /// Instance that refuses every write.
    pub fn read_only(type_info: Arc<TypeInfo>) -> Self {
        let mut container = DataContainer::new(type_info.schema.clone());
        container.set_read_only(true);
        Self::with_data(type_info, Some(Ok(container)), None)
    }

    fn with_data(
        type_info: Arc<TypeInfo>,
        data: Option<std::result::Result<DataContainer, InfoError>>,
        initializer: Option<DataInitializer>,
    ) -> Self {
        let cell = OnceCell::new();
        if let Some(data) = data {
            let _ = cell.set(data);
        }
        Self {
            type_info,
            data: cell,
            initializer: Mutex::new(initializer),
            status: ObjectStatus::New,
            is_clone: false,
            modified_externally: false,
            external: None,
            related: HashMap::new(),
            settings: None,
            original_view: AtomicBool::new(false),
            original_lock: Mutex::new(()),
        }
    }

    pub fn type_info(&self) -> &Arc<TypeInfo> {
        &self.type_info
    }

    pub fn object_type(&self) -> &str {
        &self.type_info.object_type
    }

    fn load(&self) -> &std::result::Result<DataContainer, InfoError> {
        self.data.get_or_init(|| {
            let initializer = match self.initializer.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            match initializer {
                Some(init) => init(),
                None => Ok(DataContainer::new(self.type_info.schema.clone())),
            }
        })
    }

    /// The data container, or the memoized initialization failure.
    pub fn data(&self) -> Result<&DataContainer> {
        self.load()
            .as_ref()
            .map_err(|e| initialization_failed(&self.type_info, e))
    }

    pub(crate) fn data_mut(&mut self) -> Result<&mut DataContainer> {
        let _ = self.load();
        let type_info = &self.type_info;
        match self.data.get_mut() {
            Some(Ok(data)) => Ok(data),
            Some(Err(e)) => Err(initialization_failed(type_info, e)),
            None => Err(InfoError::InvalidState(format!(
                "Data of '{}' is not available",
                type_info.object_type
            ))),
        }
    }

    /// Column value; unchanged external columns are read from file storage.
    pub fn get_value(&self, column: &str) -> Result<Value> {
        self.read_value(column, true)
    }

    /// Column value as held in the container, never consulting file storage.
    pub fn get_stored_value(&self, column: &str) -> Result<Value> {
        self.read_value(column, false)
    }

    /// `None` for `Null` values.
    pub fn try_get_value(&self, column: &str) -> Result<Option<Value>> {
        Ok(Some(self.get_value(column)?).filter(|v| !v.is_null()))
    }

    fn read_value(&self, column: &str, use_external: bool) -> Result<Value> {
        let data = self.data()?;
        let idx = data
            .index_of(column)
            .ok_or_else(|| self.column_not_found(column))?;

        if use_external
            && !data.is_changed_at(idx)
            && let Some(value) = self.read_external(data, column)?
        {
            return Ok(value);
        }

        let value = if self.original_view.load(Ordering::SeqCst) {
            data.original_at(idx)
        } else {
            data.value_at(idx)
        };
        Ok(value.clone())
    }

    fn read_external(&self, data: &DataContainer, column: &str) -> Result<Option<Value>> {
        if !self.type_info.has_external_columns() {
            return Ok(None);
        }
        let Some(binding) = &self.external else {
            return Ok(None);
        };
        let columns = self.type_info.external_columns()?;
        match columns.get(column) {
            Some(setting) => binding.store().read(setting, &data.view(true)),
            None => Ok(None),
        }
    }

    /// Writes a column value.
    ///
    /// Returns `Ok(false)` when the instance is read-only. Negative values in
    /// foreign-key columns are stored as `Null`.
    pub fn set_value(&mut self, column: &str, value: impl Into<Value>) -> Result<bool> {
        let mut value = value.into();
        let type_info = self.type_info.clone();
        if type_info.is_foreign_key(column) && value.as_i64().is_some_and(|v| v < 0) {
            value = Value::Null;
        }

        let data = self.data_mut()?;
        let Some(idx) = data.index_of(column) else {
            return Err(InfoError::ColumnNotFound(
                column.to_string(),
                type_info.object_type.clone(),
            ));
        };
        if data.is_read_only() {
            return Ok(false);
        }
        data.schema().columns()[idx].validate(&value)?;
        data.set_raw(idx, value);

        for callback in type_info.clear_cache_table()?.callbacks_for(column) {
            callback(self);
        }

        self.data_mut()?.mark_changed(idx);
        if !self.status.is_deleting() {
            self.status = ObjectStatus::Changed;
        }
        Ok(true)
    }

    /// Writes a value and records it as already persisted.
    pub(crate) fn set_persisted_value(&mut self, column: &str, value: Value) -> Result<()> {
        let data = self.data_mut()?;
        if let Some(idx) = data.index_of(column) {
            data.set_unchanged(idx, value);
        }
        Ok(())
    }

    /// Writes a value without dirty tracking or callbacks.
    pub(crate) fn set_raw_value(&mut self, column: &str, value: Value) -> Result<()> {
        let data = self.data_mut()?;
        if let Some(idx) = data.index_of(column) {
            data.set_raw(idx, value);
            data.mark_changed(idx);
        }
        Ok(())
    }

    pub fn item_changed(&self, column: &str) -> Result<bool> {
        Ok(self.data()?.item_changed(column))
    }

    pub fn changed_columns(&self) -> Result<Vec<String>> {
        Ok(self.data()?.changed_columns())
    }

    pub fn has_changed(&self) -> Result<bool> {
        Ok(self.data()?.has_changed())
    }

    pub fn reset_changes(&mut self) -> Result<()> {
        self.data_mut()?.reset_changes();
        Ok(())
    }

    pub fn revert_changes(&mut self) -> Result<()> {
        self.data_mut()?.revert_changes();
        Ok(())
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.data()?.is_complete())
    }

    pub fn is_read_only(&self) -> bool {
        self.data().map(|d| d.is_read_only()).unwrap_or(false)
    }

    pub fn to_record(&self) -> Result<Record> {
        Ok(self.data()?.to_record())
    }

    pub fn original_record(&self) -> Result<Record> {
        Ok(self.data()?.original_record())
    }

    pub fn view(&self, original: bool) -> Result<ColumnValues<'_>> {
        Ok(self.data()?.view(original))
    }

    /// Status with the identifier rule applied: no positive id reads as `New`.
    pub fn status(&self) -> ObjectStatus {
        if self.status.is_deleting() {
            return self.status;
        }
        if self.type_info.has_id_column() && self.object_id().ok().flatten().is_none() {
            return ObjectStatus::New;
        }
        self.status
    }

    pub fn is_clone(&self) -> bool {
        self.is_clone
    }

    /// Set by the consistency check when a backing file differs from the database.
    pub fn is_modified_externally(&self) -> bool {
        self.modified_externally
    }

    // Role accessors

    fn role_value(&self, role: &Option<String>) -> Result<Value> {
        match role {
            Some(column) => self.get_stored_value(column),
            None => Ok(Value::Null),
        }
    }

    pub(crate) fn set_role(&mut self, role: Option<String>, value: impl Into<Value>) -> Result<bool> {
        match role {
            Some(column) => self.set_value(&column, value),
            None => Ok(false),
        }
    }

    pub fn object_id(&self) -> Result<Option<i64>> {
        Ok(self.role_value(&self.type_info.id_column)?.as_id())
    }

    pub fn guid(&self) -> Result<Option<Uuid>> {
        Ok(self.role_value(&self.type_info.guid_column)?.as_guid())
    }

    pub fn code_name(&self) -> Result<Option<String>> {
        Ok(text(self.role_value(&self.type_info.code_name_column)?))
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        Ok(text(self.role_value(&self.type_info.display_name_column)?))
    }

    /// Display name, falling back to the code name.
    pub fn object_name(&self) -> Result<String> {
        Ok(self
            .display_name()?
            .or(self.code_name()?)
            .unwrap_or_default())
    }

    pub fn parent_id(&self) -> Result<Option<i64>> {
        Ok(self.role_value(&self.type_info.parent_id_column)?.as_id())
    }

    pub fn site_id(&self) -> Result<Option<i64>> {
        Ok(self.role_value(&self.type_info.site_id_column)?.as_id())
    }

    pub fn group_id(&self) -> Result<Option<i64>> {
        Ok(self.role_value(&self.type_info.group_id_column)?.as_id())
    }

    pub fn last_modified(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.role_value(&self.type_info.last_modified_column)?.as_timestamp())
    }

    pub fn order(&self) -> Result<Option<i64>> {
        Ok(self.role_value(&self.type_info.order_column)?.as_i64())
    }

    pub fn set_code_name(&mut self, name: &str) -> Result<bool> {
        self.set_role(self.type_info.code_name_column.clone(), name)
    }

    pub fn set_display_name(&mut self, name: &str) -> Result<bool> {
        self.set_role(self.type_info.display_name_column.clone(), name)
    }

    pub fn set_parent_id(&mut self, parent_id: Option<i64>) -> Result<bool> {
        self.set_role(self.type_info.parent_id_column.clone(), parent_id)
    }

    pub fn set_site_id(&mut self, site_id: Option<i64>) -> Result<bool> {
        self.set_role(self.type_info.site_id_column.clone(), site_id)
    }

    // Related object cache

    pub fn cached_related(&self, name: &str) -> Option<&InfoObject> {
        self.related.get(&name.to_ascii_lowercase())
    }

    pub fn cache_related(&mut self, name: &str, object: InfoObject) {
        self.related.insert(name.to_ascii_lowercase(), object);
    }

    pub fn clear_related(&mut self, name: &str) {
        self.related.remove(&name.to_ascii_lowercase());
    }

    pub fn clear_settings_cache(&mut self) {
        self.settings = None;
    }

    pub(crate) fn attach_external(&mut self, binding: ExternalBinding) {
        self.external = Some(binding);
    }

    /// Runs `f` while reads return original (pre-change) values.
    ///
    /// Calls on the same instance are serialized; contention is logged.
    pub fn execute_with_original_data<R>(&self, f: impl FnOnce(&InfoObject) -> R) -> Result<R> {
        let _lock = match self.original_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                warn!(
                    "Concurrent original-data access on the same '{}' instance, waiting for the lock",
                    self.type_info.object_type
                );
                self.original_lock.lock()?
            }
            Err(TryLockError::Poisoned(e)) => {
                return Err(InfoError::LockError(e.to_string()));
            }
        };

        let previous = self.original_view.swap(true, Ordering::SeqCst);
        let _restore = RestoreFlag {
            flag: &self.original_view,
            previous,
        };
        Ok(f(self))
    }

    pub(crate) fn column_not_found(&self, column: &str) -> InfoError {
        InfoError::ColumnNotFound(column.to_string(), self.type_info.object_type.clone())
    }

    /// Copy of the data that no longer counts as loaded: every value is a
    /// pending change and the status is `New`.
    pub(crate) fn structural_copy(&self) -> Result<InfoObject> {
        let mut data = self.data()?.clone();
        data.detach();
        data.set_read_only(false);
        let mut copy = Self::with_data(self.type_info.clone(), Some(Ok(data)), None);
        copy.external = self.external.clone();
        copy.is_clone = true;
        Ok(copy)
    }
}

struct RestoreFlag<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl Drop for RestoreFlag<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(s) if s.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn initialization_failed(type_info: &TypeInfo, error: &InfoError) -> InfoError {
    match error {
        InfoError::InitializationFailed { .. } => error.clone(),
        other => InfoError::InitializationFailed {
            object_type: type_info.object_type.clone(),
            origin: other.to_string(),
        },
    }
}

impl Clone for InfoObject {
    fn clone(&self) -> Self {
        let data = OnceCell::new();
        let _ = data.set(self.load().clone());
        Self {
            type_info: self.type_info.clone(),
            data,
            initializer: Mutex::new(None),
            status: self.status,
            is_clone: self.is_clone,
            modified_externally: self.modified_externally,
            external: self.external.clone(),
            related: self.related.clone(),
            settings: self.settings.clone(),
            original_view: AtomicBool::new(false),
            original_lock: Mutex::new(()),
        }
    }
}

impl fmt::Debug for InfoObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfoObject")
            .field("object_type", &self.type_info.object_type)
            .field("id", &self.object_id().ok().flatten())
            .field("status", &self.status())
            .field("is_clone", &self.is_clone)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};
    use std::thread;
    use std::time::Duration;

    fn page_type() -> Arc<TypeInfo> {
        Arc::new(
            TypeInfo::new(
                "test.page",
                vec![
                    Column::new("PageID", DataType::Integer),
                    Column::new("PageName", DataType::Text),
                    Column::new("PageParentID", DataType::Integer),
                ],
            )
            .id_column("PageID")
            .code_name_column("PageName")
            .parent("PageParentID", "test.page"),
        )
    }

    #[test]
    fn test_set_get_round_trip_and_reset() {
        let mut page = InfoObject::new(page_type());
        assert_eq!(page.status(), ObjectStatus::New);

        assert!(page.set_value("PageName", "Home").unwrap());
        assert_eq!(page.get_value("PageName").unwrap(), Value::from("Home"));
        assert!(page.item_changed("PageName").unwrap());

        page.reset_changes().unwrap();
        assert!(!page.item_changed("PageName").unwrap());
        assert!(page.changed_columns().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_column_and_type_mismatch() {
        let mut page = InfoObject::new(page_type());
        assert!(matches!(
            page.get_value("Missing"),
            Err(InfoError::ColumnNotFound(_, _))
        ));
        assert!(matches!(
            page.set_value("PageID", "x"),
            Err(InfoError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_negative_foreign_key_becomes_null() {
        let mut page = InfoObject::new(page_type());
        page.set_value("PageParentID", -1i64).unwrap();
        assert_eq!(page.get_value("PageParentID").unwrap(), Value::Null);
        assert_eq!(page.parent_id().unwrap(), None);
    }

    #[test]
    fn test_parent_write_clears_cached_parent() {
        let info = page_type();
        let mut page = InfoObject::new(info.clone());
        page.cache_related("Parent", InfoObject::new(info));
        page.set_value("PageParentID", 4i64).unwrap();
        assert!(page.cached_related("parent").is_none());
    }

    #[test]
    fn test_loaded_object_status_transitions() {
        let mut record = Record::new();
        record.insert("PageID".into(), Value::Integer(3));
        let mut page = InfoObject::from_record(page_type(), &record);
        assert_eq!(page.status(), ObjectStatus::Unchanged);
        page.set_value("PageName", "About").unwrap();
        assert_eq!(page.status(), ObjectStatus::Changed);
    }

    #[test]
    fn test_initializer_failure_is_memoized() {
        let page = InfoObject::lazy(page_type(), || {
            Err(InfoError::Storage("connection lost".into()))
        });
        for _ in 0..2 {
            match page.get_value("PageName") {
                Err(InfoError::InitializationFailed { origin, .. }) => {
                    assert!(origin.contains("connection lost"))
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_original_data_view() {
        let mut record = Record::new();
        record.insert("PageName".into(), Value::from("Old"));
        let mut page = InfoObject::from_record(page_type(), &record);
        page.set_value("PageName", "New").unwrap();

        let seen = page
            .execute_with_original_data(|p| p.get_value("PageName").unwrap())
            .unwrap();
        assert_eq!(seen, Value::from("Old"));
        assert_eq!(page.get_value("PageName").unwrap(), Value::from("New"));
    }

    #[test]
    fn test_original_data_callers_are_serialized() {
        let page = Arc::new(InfoObject::new(page_type()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let page = page.clone();
                thread::spawn(move || {
                    page.execute_with_original_data(|_| thread::sleep(Duration::from_millis(5)))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!page.original_view.load(Ordering::SeqCst));
    }
}
