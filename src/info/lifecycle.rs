use chrono::Utc;
use log::warn;
use tracing::{Level, event, info_span};
use uuid::Uuid;

use super::events::EventOutcome;
use super::status::{LifecycleOperation, LifecycleOutcome, ObjectStatus};
use super::InfoObject;
use crate::core::{InfoError, Record, Result, Value};
use crate::services::{ActionContext, ChangeAction, Notification, Permission, object_cache_keys};
use crate::session::InfoSession;
use crate::storage::WhereCondition;

impl InfoObject {
    /// Inserts or updates the object following its type's save policy.
    ///
    /// Types with an identifier column update when the id is positive and
    /// insert (or upsert, when the type opts in) otherwise. Binding types look
    /// for an existing row by GUID, code name and natural key, in that order.
    pub fn save(&mut self, session: &InfoSession) -> Result<LifecycleOutcome> {
        let type_info = self.type_info().clone();
        if type_info.has_id_column() {
            if self.object_id()?.is_some() {
                self.update(session)
            } else if type_info.flags.supports_upsert {
                self.upsert(session)
            } else {
                self.insert(session)
            }
        } else {
            match self.existing_row_condition(session)? {
                Some(key) => self.execute_save(session, LifecycleOperation::Update, Some(key)),
                None => self.insert(session),
            }
        }
    }

    pub fn insert(&mut self, session: &InfoSession) -> Result<LifecycleOutcome> {
        self.execute_save(session, LifecycleOperation::Insert, None)
    }

    /// Updates the stored row; the instance must hold loaded data.
    pub fn update(&mut self, session: &InfoSession) -> Result<LifecycleOutcome> {
        if !self.is_complete()? {
            return Err(InfoError::InvalidState(format!(
                "Cannot update '{}' from incomplete data",
                self.object_type()
            )));
        }
        let key = match self.type_info().id_column.clone() {
            Some(id_column) => match self.object_id()? {
                Some(id) => WhereCondition::eq(&id_column, id),
                None => {
                    return Err(InfoError::InvalidState(format!(
                        "Cannot update unsaved '{}'",
                        self.object_type()
                    )));
                }
            },
            None => self.stored_row_condition()?,
        };
        self.execute_save(session, LifecycleOperation::Update, Some(key))
    }

    /// Updates the row sharing this object's natural key, or inserts one.
    pub fn upsert(&mut self, session: &InfoSession) -> Result<LifecycleOutcome> {
        let key = self.natural_key_condition()?;
        if matches!(key, WhereCondition::All) {
            return self.insert(session);
        }
        self.execute_save(session, LifecycleOperation::Upsert, Some(key))
    }

    /// Deletes the object with its children, bindings, meta files, settings
    /// and external files.
    ///
    /// Fails with [`InfoError::DependencyBlocked`] without modifying anything
    /// when required dependents exist.
    pub fn delete(&mut self, session: &InfoSession) -> Result<LifecycleOutcome> {
        let span = info_span!(
            "info.object.delete",
            object_type = %self.object_type(),
            object_id = ?self.object_id().ok().flatten()
        );
        let _enter = span.enter();

        if self.type_info().has_id_column() && self.object_id()?.is_none() {
            return Err(InfoError::InvalidState(format!(
                "Cannot delete unsaved '{}'",
                self.object_type()
            )));
        }
        self.check_permissions(session, Permission::Delete)?;

        let previous_status = self.status;
        let scope = session.transaction()?;
        match self.delete_steps(session) {
            Ok(LifecycleOutcome::Cancelled) => {
                scope.commit()?;
                event!(Level::DEBUG, "delete cancelled by handler");
                Ok(LifecycleOutcome::Cancelled)
            }
            Ok(LifecycleOutcome::Completed) => {
                scope.commit()?;
                session.touch_keys(&self.cache_keys(None)?)?;
                event!(Level::DEBUG, "object deleted");
                Ok(LifecycleOutcome::Completed)
            }
            Err(err) => {
                self.status = previous_status;
                event!(Level::ERROR, error = %err, "object delete failed");
                self.log_failure(session, LifecycleOperation::Delete, &err);
                if let Err(rollback) = scope.rollback() {
                    warn!("Rollback after failed delete of '{}' failed: {}", self.object_type(), rollback);
                }
                Err(err)
            }
        }
    }

    /// Fails with [`InfoError::PermissionDenied`] unless the permission
    /// service grants `permission` for this object's site and the current user.
    pub fn check_permissions(&self, session: &InfoSession, permission: Permission) -> Result<()> {
        let context = ActionContext::current();
        let granted = session.check_permission(
            self.object_type(),
            permission,
            self.site_id()?,
            context.user.as_deref(),
        )?;
        if granted {
            Ok(())
        } else {
            Err(InfoError::PermissionDenied {
                object_type: self.object_type().to_string(),
                permission: format!("{:?}", permission),
            })
        }
    }

    /// Runs one insert/update/upsert inside a transaction scope.
    pub(crate) fn execute_save(
        &mut self,
        session: &InfoSession,
        operation: LifecycleOperation,
        key: Option<WhereCondition>,
    ) -> Result<LifecycleOutcome> {
        let span = info_span!(
            "info.object.save",
            object_type = %self.object_type(),
            operation = operation.code()
        );
        let _enter = span.enter();

        let creating = operation.is_insert() || operation == LifecycleOperation::Upsert;
        self.check_permissions(
            session,
            if creating { Permission::Create } else { Permission::Modify },
        )?;
        if creating && let Some(feature) = self.type_info().license_feature.clone() {
            session.check_license(&feature)?;
        }

        let previous_code_name = self.original_code_name()?;
        let scope = session.transaction()?;
        match self.save_steps(session, operation, key) {
            Ok(LifecycleOutcome::Cancelled) => {
                scope.commit()?;
                event!(Level::DEBUG, "save cancelled by handler");
                Ok(LifecycleOutcome::Cancelled)
            }
            Ok(LifecycleOutcome::Completed) => {
                scope.commit()?;
                session.touch_keys(&self.cache_keys(previous_code_name.as_deref())?)?;
                let object_id = self.object_id()?;
                event!(Level::DEBUG, object_id = ?object_id, "object saved");
                Ok(LifecycleOutcome::Completed)
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "object save failed");
                self.log_failure(session, operation, &err);
                if operation.is_insert() {
                    self.cleanup_failed_insert(session);
                }
                if let Err(rollback) = scope.rollback() {
                    warn!("Rollback after failed save of '{}' failed: {}", self.object_type(), rollback);
                }
                Err(err)
            }
        }
    }

    fn save_steps(
        &mut self,
        session: &InfoSession,
        operation: LifecycleOperation,
        key: Option<WhereCondition>,
    ) -> Result<LifecycleOutcome> {
        if self.run_before_handlers(session, operation)? == EventOutcome::Cancel {
            return Ok(LifecycleOutcome::Cancelled);
        }

        self.ensure_system_fields(session, operation)?;
        self.validate_required_columns()?;
        let record = self.persist_external_columns(operation.is_insert())?;

        let created = self.write_row(session, operation, key.as_ref(), record)?;
        self.update_hierarchy(session, created)?;
        if created {
            self.assign_insert_order(session)?;
        }

        if let Some(id) = self.object_id()? {
            session.object_cache().remove(self.object_type(), id)?;
        }

        let data = self.data_mut()?;
        data.reset_changes();
        data.set_complete(true);
        self.status = ObjectStatus::Unchanged;
        self.is_clone = false;
        self.modified_externally = false;

        let action = if created { ChangeAction::Created } else { ChangeAction::Updated };
        session.notify(Notification::new(self.object_type(), self.object_id()?, action).with_site(self.site_id()?))?;

        self.run_after_handlers(session, operation)?;
        Ok(LifecycleOutcome::Completed)
    }

    /// Performs the storage operation; `true` when a new row was created.
    fn write_row(
        &mut self,
        session: &InfoSession,
        operation: LifecycleOperation,
        key: Option<&WhereCondition>,
        record: Record,
    ) -> Result<bool> {
        let provider = session.provider();
        let object_type = self.object_type().to_string();
        let id_column = self.type_info().id_column.clone();

        match (operation, key) {
            (LifecycleOperation::Insert | LifecycleOperation::InsertAsClone, _) => {
                let id = provider.insert(&object_type, id_column.as_deref(), record)?;
                self.assign_id(id_column.as_deref(), id)?;
                Ok(true)
            }
            (LifecycleOperation::Upsert, Some(key)) => {
                let existed = provider.exists(&object_type, key)?;
                let id = provider.upsert(&object_type, id_column.as_deref(), key, record)?;
                self.assign_id(id_column.as_deref(), id)?;
                Ok(!existed)
            }
            (LifecycleOperation::Update, Some(key)) => {
                if !record.is_empty() && provider.update(&object_type, key, &record)? == 0 {
                    return Err(InfoError::Storage(format!(
                        "No stored row of '{}' matched the update",
                        object_type
                    )));
                }
                Ok(false)
            }
            (operation, _) => Err(InfoError::InvalidState(format!(
                "{} of '{}' has no row key",
                operation, object_type
            ))),
        }
    }

    fn assign_id(&mut self, id_column: Option<&str>, id: Option<i64>) -> Result<()> {
        if let (Some(column), Some(id)) = (id_column, id) {
            self.set_raw_value(column, Value::Integer(id))?;
        }
        Ok(())
    }

    fn run_before_handlers(&mut self, session: &InfoSession, operation: LifecycleOperation) -> Result<EventOutcome> {
        let registry = session.registry().clone();
        if registry.events().run_before(self, session, operation)? == EventOutcome::Cancel {
            return Ok(EventOutcome::Cancel);
        }
        session.events().run_before(self, session, operation)
    }

    fn run_after_handlers(&self, session: &InfoSession, operation: LifecycleOperation) -> Result<()> {
        session.registry().events().run_after(self, session, operation)?;
        session.events().run_after(self, session, operation)
    }

    /// GUID, version GUID, last-modified timestamp and code name.
    fn ensure_system_fields(&mut self, session: &InfoSession, operation: LifecycleOperation) -> Result<()> {
        let type_info = self.type_info().clone();

        if let Some(column) = &type_info.guid_column
            && self.get_stored_value(column)?.is_null()
        {
            self.set_value(column, Uuid::new_v4())?;
        }
        if let Some(column) = &type_info.version_guid_column {
            self.set_value(column, Uuid::new_v4())?;
        }
        if let Some(column) = &type_info.last_modified_column
            && (ActionContext::current().update_timestamp || self.get_stored_value(column)?.is_null())
        {
            self.set_value(column, Utc::now())?;
        }

        if let Some(column) = &type_info.code_name_column {
            if self.code_name()?.is_none() {
                if type_info.flags.generate_code_name {
                    let name = self.generate_code_name(session)?;
                    self.set_value(column, name)?;
                }
            } else if operation != LifecycleOperation::Upsert
                && (operation.is_insert() || self.item_changed(column)?)
            {
                self.check_unique_code_name(session)?;
            }
        }
        Ok(())
    }

    fn validate_required_columns(&self) -> Result<()> {
        let type_info = self.type_info();
        for column in type_info.schema.columns() {
            if column.nullable
                || type_info
                    .id_column
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(&column.name))
            {
                continue;
            }
            if self.get_stored_value(&column.name)?.is_null() {
                return Err(InfoError::Validation(format!(
                    "Column '{}' of '{}' requires a value",
                    column.name, type_info.object_type
                )));
            }
        }
        Ok(())
    }

    /// Writes external columns to file storage and returns the row values to
    /// store: every column on insert, changed columns otherwise.
    fn persist_external_columns(&self, inserting: bool) -> Result<Record> {
        let data = self.data()?;
        let mut record = if inserting {
            data.to_record()
        } else {
            let current = data.to_record();
            data.changed_columns()
                .into_iter()
                .filter_map(|column| current.get(&column).cloned().map(|value| (column, value)))
                .collect()
        };

        let (true, Some(binding)) = (self.type_info().has_external_columns(), &self.external) else {
            return Ok(record);
        };
        let store = binding.store();
        let columns = self.type_info().external_columns()?;
        let (current, original) = (data.view(false), data.view(true));

        for setting in columns.iter() {
            let Some(idx) = data.index_of(&setting.column) else {
                continue;
            };
            let moved = setting.path_for(&current) != setting.path_for(&original);
            if !inserting && !data.is_changed_at(idx) && !moved {
                continue;
            }

            let value = if data.is_changed_at(idx) || inserting {
                data.value_at(idx).clone()
            } else {
                store
                    .read(setting, &original)?
                    .unwrap_or_else(|| data.value_at(idx).clone())
            };
            if store.write(setting, &current, &original, &value)? {
                let name = data.schema().columns()[idx].name.clone();
                record.insert(name, Value::Null);
            }
        }
        Ok(record)
    }

    /// Compares every external column with its file and flags the object as
    /// modified externally when any differ.
    pub fn check_external_consistency(&mut self) -> Result<bool> {
        let (true, Some(binding)) = (self.type_info().has_external_columns(), self.external.clone()) else {
            return Ok(true);
        };
        let store = binding.store();
        let columns = self.type_info().external_columns()?;
        let data = self.data()?;
        let values = data.view(true);

        let mut consistent = true;
        for setting in columns.iter() {
            let Some(idx) = data.index_of(&setting.column) else {
                continue;
            };
            if !store.is_consistent(setting, &values, data.original_at(idx))? {
                event!(Level::DEBUG, column = %setting.column, "external column differs from database");
                consistent = false;
            }
        }
        if !consistent {
            self.modified_externally = true;
        }
        Ok(consistent)
    }

    /// Pulls external file contents into the database copy and resaves when
    /// the object was modified externally.
    pub fn synchronize_external_columns(&mut self, session: &InfoSession) -> Result<LifecycleOutcome> {
        if self.check_external_consistency()? {
            return Ok(LifecycleOutcome::Completed);
        }
        let columns = self.type_info().external_columns()?;
        for setting in columns.iter() {
            let value = self.get_value(&setting.column)?;
            if value != self.get_stored_value(&setting.column)? {
                self.set_value(&setting.column, value)?;
            }
        }
        self.update(session)
    }

    fn cleanup_failed_insert(&mut self, session: &InfoSession) {
        let Some(id_column) = self.type_info().id_column.clone() else {
            return;
        };
        let Ok(Some(id)) = self.object_id() else {
            return;
        };
        if let Err(err) = session
            .provider()
            .delete(self.object_type(), &WhereCondition::eq(&id_column, id))
        {
            warn!("Cleanup of partially inserted '{}' ({}) failed: {}", self.object_type(), id, err);
        }
        if let Err(err) = self.set_raw_value(&id_column, Value::Null) {
            warn!("Resetting the id of '{}' failed: {}", self.object_type(), err);
        }
    }

    fn delete_steps(&mut self, session: &InfoSession) -> Result<LifecycleOutcome> {
        if self.run_before_handlers(session, LifecycleOperation::Delete)? == EventOutcome::Cancel {
            return Ok(LifecycleOutcome::Cancelled);
        }

        if self.type_info().flags.check_dependencies_on_delete {
            let blocking = self.blocking_dependencies(session)?;
            if !blocking.is_empty() {
                return Err(InfoError::DependencyBlocked {
                    object_type: self.object_type().to_string(),
                    object_id: self.object_id()?.unwrap_or(0),
                    dependents: blocking.iter().map(|d| d.to_string()).collect(),
                });
            }
        }

        self.status = ObjectStatus::ToBeDeleted;
        self.remove_object_dependencies(session)?;
        self.delete_owned_objects(session)?;
        self.delete_external_files()?;

        let condition = self.stored_row_condition()?;
        session.provider().delete(self.object_type(), &condition)?;
        if let Some(id) = self.object_id()? {
            session.object_cache().remove(self.object_type(), id)?;
        }
        self.status = ObjectStatus::WasDeleted;

        session.notify(
            Notification::new(self.object_type(), self.object_id()?, ChangeAction::Deleted).with_site(self.site_id()?),
        )?;
        self.run_after_handlers(session, LifecycleOperation::Delete)?;
        Ok(LifecycleOutcome::Completed)
    }

    /// Children, owned bindings, site bindings, meta files and settings.
    fn delete_owned_objects(&mut self, session: &InfoSession) -> Result<()> {
        let registry = session.registry().clone();
        let object_type = self.object_type().to_string();

        let mut owned = Vec::new();
        for child_type in registry.child_types(&object_type) {
            owned.extend(self.children(session, &child_type.object_type)?);
        }
        for binding_type in registry
            .binding_types(&object_type)
            .into_iter()
            .chain(registry.site_binding_types(&object_type))
        {
            owned.extend(self.bindings(session, &binding_type.object_type)?);
        }
        if self.type_info().flags.has_metafiles {
            owned.extend(self.metafiles(session)?);
        }

        for mut object in owned {
            if object.delete(session)? == LifecycleOutcome::Cancelled {
                return Err(InfoError::Validation(format!(
                    "Deleting '{}' requires deleting '{}', which was cancelled",
                    object_type,
                    object.object_type()
                )));
            }
        }

        self.delete_object_settings(session)
    }

    fn delete_external_files(&self) -> Result<()> {
        let (true, Some(binding)) = (self.type_info().has_external_columns(), &self.external) else {
            return Ok(());
        };
        let store = binding.store();
        let values = self.data()?.view(true);
        for setting in self.type_info().external_columns()?.iter() {
            store.delete(setting, &values)?;
        }
        Ok(())
    }

    /// Lookup used by the save policy of types without an identifier column.
    fn existing_row_condition(&self, session: &InfoSession) -> Result<Option<WhereCondition>> {
        let type_info = self.type_info().clone();
        let mut candidates = Vec::new();
        if let (Some(column), Some(guid)) = (&type_info.guid_column, self.guid()?) {
            candidates.push(WhereCondition::eq(column, guid));
        }
        if let (Some(column), Some(name)) = (&type_info.code_name_column, self.code_name()?) {
            candidates.push(WhereCondition::eq(column, name));
        }
        let natural_key = self.natural_key_condition()?;
        if !matches!(natural_key, WhereCondition::All) {
            candidates.push(natural_key);
        }

        for candidate in candidates {
            if session.provider().exists(self.object_type(), &candidate)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Natural key columns matched against the current values.
    fn natural_key_condition(&self) -> Result<WhereCondition> {
        let mut condition = WhereCondition::All;
        for column in self.type_info().natural_key() {
            condition = condition.and(WhereCondition::Eq(column.to_string(), self.get_stored_value(column)?));
        }
        Ok(condition)
    }

    fn original_code_name(&self) -> Result<Option<String>> {
        Ok(match &self.type_info().code_name_column {
            Some(column) => self
                .data()?
                .get_original_value(column)
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            None => None,
        })
    }

    fn cache_keys(&self, previous_code_name: Option<&str>) -> Result<Vec<String>> {
        let code_name = self.code_name()?;
        let mut keys = object_cache_keys(self.object_type(), self.object_id()?, code_name.as_deref());
        if let Some(previous) = previous_code_name
            && code_name.as_deref() != Some(previous)
        {
            keys.extend(object_cache_keys(self.object_type(), None, Some(previous)).into_iter().skip(1));
        }
        Ok(keys)
    }

    fn log_failure(&self, session: &InfoSession, operation: LifecycleOperation, error: &InfoError) {
        let message = format!(
            "{} of '{}' ({}) failed",
            operation,
            self.object_type(),
            self.object_name().unwrap_or_default()
        );
        session.log_exception(
            self.object_type(),
            operation.code(),
            error,
            self.site_id().ok().flatten(),
            &message,
        );
    }
}
