use std::marker::PhantomData;

use uuid::Uuid;

use super::status::LifecycleOutcome;
use super::InfoObject;
use crate::core::{InfoError, Result};
use crate::metadata::TypeInfo;
use crate::session::InfoSession;
use crate::storage::Query;

/// A strongly typed wrapper around an [`InfoObject`] of one object type.
pub trait InfoClass: Sized {
    const OBJECT_TYPE: &'static str;

    fn from_object(object: InfoObject) -> Self;

    fn object(&self) -> &InfoObject;

    fn object_mut(&mut self) -> &mut InfoObject;

    fn into_object(self) -> InfoObject;

    /// Descriptor used to register the type.
    fn type_info() -> TypeInfo;
}

/// Typed data access for one [`InfoClass`].
pub struct InfoProvider<'s, T: InfoClass> {
    session: &'s InfoSession,
    _marker: PhantomData<T>,
}

impl<'s, T: InfoClass> InfoProvider<'s, T> {
    pub fn new(session: &'s InfoSession) -> Self {
        Self {
            session,
            _marker: PhantomData,
        }
    }

    /// Empty unsaved instance.
    pub fn create(&self) -> Result<T> {
        Ok(T::from_object(self.session.new_object(T::OBJECT_TYPE)?))
    }

    pub fn get(&self, id: i64) -> Result<Option<T>> {
        Ok(self.session.get_object(T::OBJECT_TYPE, id)?.map(T::from_object))
    }

    pub fn get_by_code_name(&self, code_name: &str, site_id: Option<i64>) -> Result<Option<T>> {
        Ok(self
            .session
            .get_object_by_code_name(T::OBJECT_TYPE, code_name, site_id)?
            .map(T::from_object))
    }

    pub fn get_by_guid(&self, guid: Uuid) -> Result<Option<T>> {
        Ok(self
            .session
            .get_object_by_guid(T::OBJECT_TYPE, guid)?
            .map(T::from_object))
    }

    pub fn list(&self, query: &Query) -> Result<Vec<T>> {
        Ok(self
            .session
            .get_objects(T::OBJECT_TYPE, query)?
            .into_iter()
            .map(T::from_object)
            .collect())
    }

    /// Inserts or updates, failing when a handler cancels.
    pub fn set(&self, item: &mut T) -> Result<()> {
        match item.object_mut().save(self.session)? {
            LifecycleOutcome::Completed => Ok(()),
            LifecycleOutcome::Cancelled => Err(cancelled(T::OBJECT_TYPE, "save")),
        }
    }

    pub fn delete(&self, item: &mut T) -> Result<()> {
        match item.object_mut().delete(self.session)? {
            LifecycleOutcome::Completed => Ok(()),
            LifecycleOutcome::Cancelled => Err(cancelled(T::OBJECT_TYPE, "delete")),
        }
    }
}

fn cancelled(object_type: &str, operation: &str) -> InfoError {
    InfoError::Validation(format!(
        "The {} of '{}' was cancelled by a handler",
        operation, object_type
    ))
}
