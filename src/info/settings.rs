use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use super::object::CachedSettings;
use super::InfoObject;
use crate::core::{Column, DataType, InfoError, Result, Value};
use crate::metadata::TypeInfo;
use crate::session::InfoSession;
use crate::storage::{Query, WhereCondition};

pub const OBJECT_SETTINGS_TYPE: &str = "cms.objectsettings";

static SETTINGS_STAMP: AtomicU64 = AtomicU64::new(1);

/// Built-in side table of per-object state keyed by (object type, object id).
pub fn object_settings_type_info() -> TypeInfo {
    TypeInfo::new(
        OBJECT_SETTINGS_TYPE,
        vec![
            Column::new("ObjectSettingsID", DataType::Integer),
            Column::new("ObjectSettingsObjectType", DataType::Text).not_null(),
            Column::new("ObjectSettingsObjectID", DataType::Integer).not_null(),
            Column::new("ObjectCheckedOutByUserID", DataType::Integer),
            Column::new("ObjectCheckedOutWhen", DataType::Timestamp),
            Column::new("ObjectTags", DataType::Text),
        ],
    )
    .id_column("ObjectSettingsID")
    .configure_flags(|flags| {
        flags.supports_cloning = false;
        flags.check_dependencies_on_delete = false;
        flags.generate_code_name = false;
    })
}

/// Invalidates every object settings instance cached on any object.
pub fn invalidate_object_settings() {
    SETTINGS_STAMP.fetch_add(1, Ordering::SeqCst);
}

fn settings_condition(object_type: &str, object_id: i64) -> WhereCondition {
    WhereCondition::eq("ObjectSettingsObjectType", object_type)
        .and(WhereCondition::eq("ObjectSettingsObjectID", object_id))
}

impl InfoObject {
    /// The object's settings row, created in memory when none is stored yet.
    ///
    /// The instance is cached until the global settings stamp moves or the
    /// object's identifier changes.
    pub fn object_settings(&mut self, session: &InfoSession) -> Result<InfoObject> {
        let Some(id) = self.object_id()? else {
            return Err(InfoError::InvalidState(format!(
                "Object settings of '{}' need a saved object",
                self.object_type()
            )));
        };
        let stamp = SETTINGS_STAMP.load(Ordering::SeqCst);
        if let Some(cached) = &self.settings
            && cached.stamp == stamp
            && cached.object_id == id
        {
            return Ok(cached.settings.clone());
        }

        let query = Query::filter(settings_condition(self.object_type(), id)).top(Some(1));
        let settings = match session
            .get_objects(OBJECT_SETTINGS_TYPE, &query)?
            .into_iter()
            .next()
        {
            Some(existing) => existing,
            None => {
                let mut created = session.new_object(OBJECT_SETTINGS_TYPE)?;
                created.set_value("ObjectSettingsObjectType", self.object_type())?;
                created.set_value("ObjectSettingsObjectID", id)?;
                created
            }
        };

        self.settings = Some(Box::new(CachedSettings {
            stamp,
            object_id: id,
            settings: settings.clone(),
        }));
        Ok(settings)
    }

    fn save_settings(&mut self, session: &InfoSession, mut settings: InfoObject) -> Result<()> {
        settings.save(session)?;
        let id = self.object_id()?.unwrap_or(0);
        self.settings = Some(Box::new(CachedSettings {
            stamp: SETTINGS_STAMP.load(Ordering::SeqCst),
            object_id: id,
            settings,
        }));
        Ok(())
    }

    pub fn checked_out_by(&mut self, session: &InfoSession) -> Result<Option<i64>> {
        Ok(self
            .object_settings(session)?
            .get_value("ObjectCheckedOutByUserID")?
            .as_id())
    }

    /// Takes the checkout lock for `user_id`.
    pub fn check_out(&mut self, session: &InfoSession, user_id: i64) -> Result<()> {
        if !self.type_info().flags.supports_locking {
            return Err(InfoError::InvalidState(format!(
                "Type '{}' does not support locking",
                self.object_type()
            )));
        }
        let mut settings = self.object_settings(session)?;
        match settings.get_value("ObjectCheckedOutByUserID")?.as_id() {
            Some(owner) if owner != user_id => {
                return Err(InfoError::Validation(format!(
                    "Object is checked out by user {}",
                    owner
                )));
            }
            Some(_) => return Ok(()),
            None => {}
        }
        settings.set_value("ObjectCheckedOutByUserID", user_id)?;
        settings.set_value("ObjectCheckedOutWhen", Utc::now())?;
        self.save_settings(session, settings)
    }

    /// Releases the checkout lock.
    pub fn check_in(&mut self, session: &InfoSession) -> Result<()> {
        let mut settings = self.object_settings(session)?;
        if settings.get_value("ObjectCheckedOutByUserID")?.is_null() {
            return Ok(());
        }
        settings.set_value("ObjectCheckedOutByUserID", Value::Null)?;
        settings.set_value("ObjectCheckedOutWhen", Value::Null)?;
        self.save_settings(session, settings)
    }

    /// Comma-separated tags.
    pub fn tags(&mut self, session: &InfoSession) -> Result<Vec<String>> {
        let tags = self.object_settings(session)?.get_value("ObjectTags")?;
        Ok(tags
            .as_str()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn set_tags(&mut self, session: &InfoSession, tags: &[&str]) -> Result<()> {
        let mut settings = self.object_settings(session)?;
        settings.set_value("ObjectTags", tags.join(","))?;
        self.save_settings(session, settings)
    }

    /// Removes the stored settings row of this object.
    pub(crate) fn delete_object_settings(&mut self, session: &InfoSession) -> Result<()> {
        if let Some(id) = self.object_id()? {
            session
                .provider()
                .delete(OBJECT_SETTINGS_TYPE, &settings_condition(self.object_type(), id))?;
        }
        self.clear_settings_cache();
        Ok(())
    }
}
