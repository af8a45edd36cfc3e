use super::InfoObject;
use crate::core::{Record, Result, Value};
use crate::metadata::TypeInfo;
use crate::session::InfoSession;
use crate::storage::{Query, WhereCondition};

/// Condition selecting exactly the stored row of `record`: by id, or by natural key.
pub fn row_condition(type_info: &TypeInfo, record: &Record) -> WhereCondition {
    let value = |column: &str| record.get(column).cloned().unwrap_or(Value::Null);
    match &type_info.id_column {
        Some(id) => WhereCondition::Eq(id.clone(), value(id)),
        None => type_info
            .natural_key()
            .into_iter()
            .fold(WhereCondition::All, |condition, column| {
                condition.and(WhereCondition::Eq(column.to_string(), value(column)))
            }),
    }
}

impl InfoObject {
    /// Row condition built from the original (stored) key values.
    pub(crate) fn stored_row_condition(&self) -> Result<WhereCondition> {
        Ok(row_condition(self.type_info(), &self.original_record()?))
    }

    /// Parent object, cached on the instance until the parent column changes.
    pub fn parent(&mut self, session: &InfoSession) -> Result<Option<InfoObject>> {
        if let Some(parent) = self.cached_related("Parent") {
            return Ok(Some(parent.clone()));
        }
        let parent = self.load_parent(session)?;
        if let Some(parent) = &parent {
            self.cache_related("Parent", parent.clone());
        }
        Ok(parent)
    }

    pub(crate) fn load_parent(&self, session: &InfoSession) -> Result<Option<InfoObject>> {
        let (Some(parent_type), Some(parent_id)) =
            (self.type_info().parent_object_type.clone(), self.parent_id()?)
        else {
            return Ok(None);
        };
        session.get_object(&parent_type, parent_id)
    }

    /// Object referenced by a dependency column.
    pub fn referenced_object(&self, session: &InfoSession, column: &str) -> Result<Option<InfoObject>> {
        let Some(target) = self.type_info().foreign_key_target(column).map(str::to_string) else {
            return Ok(None);
        };
        match self.get_stored_value(column)?.as_id() {
            Some(id) => session.get_object(&target, id),
            None => Ok(None),
        }
    }

    /// Rows of `child_type` whose parent column points at this object.
    pub fn children(&self, session: &InfoSession, child_type: &str) -> Result<Vec<InfoObject>> {
        let child_info = session.type_info(child_type)?;
        let (Some(parent_column), Some(id)) = (&child_info.parent_id_column, self.object_id()?) else {
            return Ok(Vec::new());
        };
        let mut query = Query::filter(WhereCondition::eq(parent_column, id));
        if let Some(order) = &child_info.order_column {
            query = query.order_by(order);
        }
        if let Some(id_column) = &child_info.id_column {
            query = query.order_by(id_column);
        }
        session.get_objects(child_type, &query)
    }

    /// Children of every registered child type.
    pub fn all_children(&self, session: &InfoSession) -> Result<Vec<InfoObject>> {
        let mut children = Vec::new();
        for child_type in session.registry().child_types(self.object_type()) {
            children.extend(self.children(session, &child_type.object_type)?);
        }
        Ok(children)
    }

    /// Binding rows owned by this object (through the binding's parent column).
    pub fn bindings(&self, session: &InfoSession, binding_type: &str) -> Result<Vec<InfoObject>> {
        self.children(session, binding_type)
    }

    /// Binding rows referencing this object from their non-owning side.
    pub fn other_bindings(&self, session: &InfoSession, binding_type: &str) -> Result<Vec<InfoObject>> {
        let binding_info = session.type_info(binding_type)?;
        let Some(id) = self.object_id()? else {
            return Ok(Vec::new());
        };
        let condition = binding_info
            .dependencies
            .iter()
            .filter(|d| d.targets(self.object_type()))
            .map(|d| WhereCondition::eq(&d.column, id))
            .collect::<Vec<_>>();
        if condition.is_empty() {
            return Ok(Vec::new());
        }
        session.get_objects(binding_type, &Query::filter(WhereCondition::Or(condition)))
    }
}
