use std::sync::Arc;

use chrono::Utc;
use log::warn;
use tracing::{Level, event, info_span};
use uuid::Uuid;

use super::batch::CloneBatchScope;
use super::settings::{CloneResult, CloneSettings};
use crate::core::{InfoError, Result, Value};
use crate::info::{InfoObject, LifecycleOperation, LifecycleOutcome, METAFILE_OBJECT_TYPE, row_condition};
use crate::metadata::TypeInfo;
use crate::services::{ActionContext, ChangeAction, Notification, Severity, is_localization_macro};
use crate::session::InfoSession;
use crate::storage::Query;

/// Recursive deep copy of objects with their children, bindings and meta
/// files.
///
/// References among the cloned objects are rewritten through the settings'
/// translation table; references leaving the cloned set keep their value
/// unless the clone moves to another site.
pub struct CloneEngine<'s> {
    session: &'s InfoSession,
}

/// Column values forced on a nested clone, e.g. the new parent id.
type Overrides = Vec<(String, Value)>;

impl<'s> CloneEngine<'s> {
    pub fn new(session: &'s InfoSession) -> Self {
        Self { session }
    }

    /// Clones `source` and, per `settings`, its related objects.
    ///
    /// Runs in one transaction; change notifications and cache touches raised
    /// meanwhile are batched and applied once after the outermost clone
    /// commits. On failure nothing is stored, touched or sent.
    pub fn insert_as_clone(
        &self,
        source: &InfoObject,
        settings: &mut CloneSettings,
        result: &mut CloneResult,
    ) -> Result<InfoObject> {
        let span = info_span!("info.object.clone", object_type = %source.object_type());
        let _enter = span.enter();

        let outermost = CloneBatchScope::depth() == 0;
        let batch = CloneBatchScope::enter(self.session.notifier().clone(), self.session.cache().clone());
        let scope = self.session.transaction()?;

        let run_key = format!(
            "{}|{}|Cloned",
            source.object_type().to_ascii_lowercase(),
            source.object_id()?.unwrap_or(0)
        );
        match self.clone_object(source, settings, result, Vec::new(), &run_key, true) {
            Ok(clone) => {
                scope.commit()?;
                batch.finish()?;
                if outermost && self.session.config().audit_clones {
                    self.audit(source, &clone, result)?;
                }
                event!(Level::DEBUG, cloned = result.cloned_count(), "clone finished");
                Ok(clone)
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "clone failed");
                self.session.log_exception(
                    source.object_type(),
                    LifecycleOperation::InsertAsClone.code(),
                    &err,
                    source.site_id().ok().flatten(),
                    &format!("Cloning '{}' failed", source.object_name().unwrap_or_default()),
                );
                if let Err(rollback) = scope.rollback() {
                    warn!("Rollback after failed clone of '{}' failed: {}", source.object_type(), rollback);
                }
                Err(err)
            }
        }
    }

    fn clone_object(
        &self,
        source: &InfoObject,
        settings: &mut CloneSettings,
        result: &mut CloneResult,
        overrides: Overrides,
        run_key: &str,
        top_level: bool,
    ) -> Result<InfoObject> {
        let type_info = source.type_info().clone();
        if !type_info.flags.supports_cloning {
            return Err(InfoError::InvalidState(format!(
                "Objects of type '{}' cannot be cloned",
                type_info.object_type
            )));
        }

        let source = self.loaded_source(source)?;
        let source_id = source.object_id()?;
        let mut clone = source.structural_copy()?;

        self.reset_identity(&mut clone, &type_info)?;
        self.translate_references(&mut clone, &type_info, settings)?;
        if top_level && let Some(parent_id) = settings.parent_id {
            clone.set_parent_id(Some(parent_id))?;
        }
        if type_info.site_id_column.is_some() && let Some(site_id) = settings.site_id {
            clone.set_site_id(Some(site_id))?;
        }
        for (column, value) in overrides {
            clone.set_value(&column, value)?;
        }
        self.assign_names(&mut clone, &source, settings, top_level)?;
        self.copy_external_values(&mut clone, &source, &type_info)?;
        if !settings.keep_translated {
            self.resolve_macros(&mut clone, &type_info)?;
        }
        if let Some(site_id) = settings.site_id
            && source.site_id()? != Some(site_id)
        {
            self.resolve_cross_site_references(&mut clone, &type_info, site_id)?;
        }

        if clone.execute_save(self.session, LifecycleOperation::InsertAsClone, None)? == LifecycleOutcome::Cancelled {
            return Err(InfoError::Validation(format!(
                "Clone of '{}' ({}) was cancelled",
                type_info.object_type,
                source.object_name()?
            )));
        }

        let clone_id = clone.object_id()?;
        if let (Some(old), Some(new)) = (source_id, clone_id) {
            settings.translations.register(&type_info.object_type, old, new);
        }
        result.record(&type_info.object_type, source_id, clone_id);
        self.session.notify(
            Notification::new(&type_info.object_type, clone_id, ChangeAction::Cloned)
                .with_key(run_key)
                .with_site(clone.site_id()?),
        )?;

        if let Some(new_id) = clone_id {
            self.clone_related(&source, new_id, settings, result, run_key)?;
        }
        Ok(clone)
    }

    /// Complete source data, reloaded when only partially present.
    fn loaded_source(&self, source: &InfoObject) -> Result<InfoObject> {
        if source.is_complete()? {
            return Ok(source.clone());
        }
        let type_info = source.type_info().clone();
        let condition = row_condition(&type_info, &source.to_record()?);
        let rows = self
            .session
            .provider()
            .select(&type_info.object_type, &Query::filter(condition).top(Some(1)))?;
        match rows.first() {
            Some(record) => Ok(self.session.object_from_record(type_info, record)),
            None => Err(InfoError::InvalidState(format!(
                "Clone source of type '{}' is not stored",
                type_info.object_type
            ))),
        }
    }

    fn reset_identity(&self, clone: &mut InfoObject, type_info: &TypeInfo) -> Result<()> {
        if let Some(column) = &type_info.id_column {
            clone.set_value(column, Value::Null)?;
        }
        if let Some(column) = &type_info.guid_column {
            clone.set_value(column, Uuid::new_v4())?;
        }
        if let Some(column) = &type_info.version_guid_column {
            clone.set_value(column, Value::Null)?;
        }
        if let Some(column) = &type_info.last_modified_column {
            clone.set_value(column, Utc::now())?;
        }
        for column in [
            &type_info.id_path_column,
            &type_info.name_path_column,
            &type_info.level_column,
            &type_info.order_column,
        ]
        .into_iter()
        .flatten()
        {
            clone.set_value(column, Value::Null)?;
        }
        Ok(())
    }

    /// Points references at objects cloned earlier in this run.
    fn translate_references(
        &self,
        clone: &mut InfoObject,
        type_info: &TypeInfo,
        settings: &CloneSettings,
    ) -> Result<()> {
        let mut columns: Vec<(String, String)> = type_info
            .dependencies
            .iter()
            .map(|d| (d.column.clone(), d.target_type.clone()))
            .collect();
        if let (Some(column), Some(parent_type)) = (&type_info.parent_id_column, &type_info.parent_object_type) {
            columns.push((column.clone(), parent_type.clone()));
        }

        for (column, target_type) in columns {
            let Some(old_id) = clone.get_stored_value(&column)?.as_id() else {
                continue;
            };
            if let Some(new_id) = settings.translations.translate(&target_type, old_id) {
                clone.set_value(&column, new_id)?;
            }
        }
        Ok(())
    }

    fn assign_names(
        &self,
        clone: &mut InfoObject,
        source: &InfoObject,
        settings: &CloneSettings,
        top_level: bool,
    ) -> Result<()> {
        let code_name = if top_level { settings.code_name.clone() } else { None };
        match (code_name, source.code_name()?) {
            (Some(explicit), _) => {
                clone.set_code_name(&explicit)?;
            }
            (None, Some(current)) => {
                let unique = clone.get_unique_code_name(self.session, &current)?;
                clone.set_code_name(&unique)?;
            }
            (None, None) => {}
        }

        // Nested clones keep their display names.
        if !top_level {
            return Ok(());
        }
        match (settings.display_name.clone(), source.display_name()?) {
            (Some(explicit), _) => {
                clone.set_display_name(&explicit)?;
            }
            (None, Some(current)) if source.type_info().code_name_column != source.type_info().display_name_column => {
                let unique = clone.get_unique_display_name(self.session, &current)?;
                clone.set_display_name(&unique)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// External values are read from the source's files and written anew.
    fn copy_external_values(&self, clone: &mut InfoObject, source: &InfoObject, type_info: &TypeInfo) -> Result<()> {
        if !type_info.has_external_columns() {
            return Ok(());
        }
        for setting in type_info.external_columns()?.iter() {
            let value = source.get_value(&setting.column)?;
            clone.set_value(&setting.column, value)?;
        }
        Ok(())
    }

    fn resolve_macros(&self, clone: &mut InfoObject, type_info: &TypeInfo) -> Result<()> {
        let culture = ActionContext::current().culture;
        for column in type_info.schema.column_names() {
            let value = clone.get_stored_value(column)?;
            let Some(text) = value.as_str() else {
                continue;
            };
            if is_localization_macro(text) {
                let resolved = self.session.localizer().resolve(text, culture.as_deref())?;
                clone.set_value(column, resolved)?;
            }
        }
        Ok(())
    }

    /// Re-targets references to site-scoped objects onto the target site,
    /// matching by code name.
    fn resolve_cross_site_references(
        &self,
        clone: &mut InfoObject,
        type_info: &TypeInfo,
        target_site_id: i64,
    ) -> Result<()> {
        for dependency in &type_info.dependencies {
            if type_info.is_parent_column(&dependency.column)
                || type_info.site_id_column.as_deref() == Some(dependency.column.as_str())
            {
                continue;
            }
            let Some(target_info) = self.session.registry().find(&dependency.target_type) else {
                continue;
            };
            if target_info.site_id_column.is_none() {
                continue;
            }
            let Some(referenced_id) = clone.get_value(&dependency.column)?.as_id() else {
                continue;
            };
            let Some(referenced) = self.session.get_object(&target_info.object_type, referenced_id)? else {
                continue;
            };
            let referenced_site = referenced.site_id()?;
            if referenced_site.is_none() || referenced_site == Some(target_site_id) {
                continue;
            }

            let equivalent = match referenced.code_name()? {
                Some(code_name) => self.session.get_object_by_code_name(
                    &target_info.object_type,
                    &code_name,
                    Some(target_site_id),
                )?,
                None => None,
            };
            let replacement = match (equivalent, &dependency.default_value) {
                (Some(found), _) => Value::from(found.object_id()?),
                (None, Some(default)) => default.clone(),
                (None, None) if !dependency.is_required() => Value::Null,
                (None, None) => {
                    return Err(InfoError::CrossSiteCloneIncompatible {
                        object_type: type_info.object_type.clone(),
                        column: dependency.column.clone(),
                        target_site_id,
                    });
                }
            };
            clone.set_value(&dependency.column, replacement)?;
        }
        Ok(())
    }

    fn clone_related(
        &self,
        source: &InfoObject,
        new_id: i64,
        settings: &mut CloneSettings,
        result: &mut CloneResult,
        run_key: &str,
    ) -> Result<()> {
        let registry = self.session.registry().clone();
        let object_type = source.object_type().to_string();

        if settings.include_children && settings.depth_limit != 0 {
            let saved_depth = settings.depth_limit;
            if saved_depth > 0 {
                settings.depth_limit -= 1;
            }
            let children = self.clone_owned(
                source,
                &registry.child_types(&object_type),
                new_id,
                settings,
                result,
                run_key,
            );
            settings.depth_limit = saved_depth;
            children?;
        }
        if settings.include_bindings {
            self.clone_owned(source, &registry.binding_types(&object_type), new_id, settings, result, run_key)?;
        }
        if settings.include_site_bindings {
            self.clone_owned(
                source,
                &registry.site_binding_types(&object_type),
                new_id,
                settings,
                result,
                run_key,
            )?;
        }
        if settings.include_other_bindings {
            for binding_type in registry.other_binding_types(&object_type) {
                if !self.may_clone_type(&binding_type, settings, result)? {
                    continue;
                }
                let overrides: Overrides = binding_type
                    .dependencies
                    .iter()
                    .filter(|d| d.targets(&object_type))
                    .map(|d| (d.column.clone(), Value::Integer(new_id)))
                    .collect();
                for binding in source.other_bindings(self.session, &binding_type.object_type)? {
                    self.clone_object(&binding, settings, result, overrides.clone(), run_key, false)?;
                }
            }
        }
        if settings.include_metafiles && source.type_info().flags.has_metafiles {
            let metafile_info = self.session.type_info(METAFILE_OBJECT_TYPE)?;
            if self.may_clone_type(&metafile_info, settings, result)? {
                for metafile in source.metafiles(self.session)? {
                    let overrides = vec![("MetaFileObjectID".to_string(), Value::Integer(new_id))];
                    self.clone_object(&metafile, settings, result, overrides, run_key, false)?;
                }
            }
        }
        Ok(())
    }

    /// Clones the rows of `types` owned by `source` under the new owner id.
    fn clone_owned(
        &self,
        source: &InfoObject,
        types: &[Arc<TypeInfo>],
        new_id: i64,
        settings: &mut CloneSettings,
        result: &mut CloneResult,
        run_key: &str,
    ) -> Result<()> {
        for owned_type in types {
            if !self.may_clone_type(owned_type, settings, result)? {
                continue;
            }
            let Some(parent_column) = owned_type.parent_id_column.clone() else {
                continue;
            };
            for child in source.children(self.session, &owned_type.object_type)? {
                // A clone placed under its own source shows up among the children.
                if let Some(child_id) = child.object_id()?
                    && settings.translations.is_translated_target(&owned_type.object_type, child_id)
                {
                    continue;
                }
                let overrides = vec![(parent_column.clone(), Value::Integer(new_id))];
                self.clone_object(&child, settings, result, overrides, run_key, false)?;
            }
        }
        Ok(())
    }

    /// Excluded, non-clonable and unlicensed types are skipped; the latter
    /// leave a message in the result.
    fn may_clone_type(&self, type_info: &TypeInfo, settings: &CloneSettings, result: &mut CloneResult) -> Result<bool> {
        if settings.is_excluded(&type_info.object_type) || !type_info.flags.supports_cloning {
            return Ok(false);
        }
        if let Some(feature) = &type_info.license_feature {
            match self.session.check_license(feature) {
                Ok(()) => {}
                Err(err) if err.is_license_denied() => {
                    result.messages.push(format!(
                        "Objects of type '{}' were not cloned: {}",
                        type_info.object_type, err
                    ));
                    return Ok(false);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    }

    fn audit(&self, source: &InfoObject, clone: &InfoObject, result: &CloneResult) -> Result<()> {
        let message = format!(
            "Object '{}' ({}) of type '{}' was cloned as '{}' ({}); {} objects created",
            source.object_name()?,
            source.object_id()?.unwrap_or(0),
            source.object_type(),
            clone.object_name()?,
            clone.object_id()?.unwrap_or(0),
            result.cloned_count()
        );
        self.session
            .log_event(Severity::Information, source.object_type(), "CLONEOBJ", &message);
        Ok(())
    }
}

impl InfoObject {
    /// Shorthand for [`CloneEngine::insert_as_clone`].
    pub fn insert_as_clone(
        &self,
        session: &InfoSession,
        settings: &mut CloneSettings,
        result: &mut CloneResult,
    ) -> Result<InfoObject> {
        CloneEngine::new(session).insert_as_clone(self, settings, result)
    }
}
