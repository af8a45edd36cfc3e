use std::collections::HashSet;
use std::fmt;

use tracing::{Level, event};

use super::hierarchy::ROOT_PATH;
use super::related::row_condition;
use super::InfoObject;
use crate::core::{InfoError, Record, Result, Value};
use crate::metadata::{DependencyKind, TypeInfo};
use crate::services::{ChangeAction, Notification};
use crate::session::InfoSession;
use crate::storage::{Query, WhereCondition};

/// A stored row of another type that references the current object.
#[derive(Debug, Clone)]
pub struct Dependent {
    pub object_type: String,
    pub column: String,
    pub kind: DependencyKind,
    pub default_value: Option<Value>,
    pub id: Option<i64>,
    pub record: Record,
}

impl Dependent {
    /// Required references without a default cannot be cleared.
    pub fn blocks_removal(&self) -> bool {
        self.kind == DependencyKind::Required && self.default_value.is_none()
    }
}

impl fmt::Display for Dependent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} ({}) via {}", self.object_type, id, self.column),
            None => write!(f, "{} via {}", self.object_type, self.column),
        }
    }
}

/// References handled by the delete cascade rather than dependency removal.
fn cascades_from(referencing: &TypeInfo, column: &str, object_type: &str) -> bool {
    let owned_by = referencing
        .parent_object_type
        .as_deref()
        .is_some_and(|parent| parent.eq_ignore_ascii_case(object_type));
    (owned_by && referencing.is_parent_column(column)) || (owned_by && referencing.flags.is_binding)
}

impl InfoObject {
    /// Rows of every registered type whose dependency columns reference this
    /// object, limited to `kinds` and capped at `top` rows.
    ///
    /// Children, owned and site bindings and hierarchy descendants are
    /// skipped: they are removed by the delete cascade.
    pub fn get_dependencies(
        &self,
        session: &InfoSession,
        kinds: Option<&[DependencyKind]>,
        top: Option<usize>,
    ) -> Result<Vec<Dependent>> {
        let Some(id) = self.object_id()? else {
            return Ok(Vec::new());
        };
        let own_type = self.object_type().to_string();
        let descendant_prefix = self
            .id_path()?
            .filter(|path| path != ROOT_PATH)
            .map(|path| format!("{}/", path));
        // Roots and path-less objects have no usable prefix; walk the parent column.
        let self_parented = self
            .type_info()
            .parent_object_type
            .as_deref()
            .is_some_and(|parent| parent.eq_ignore_ascii_case(&own_type));
        let walked_descendants: HashSet<i64> = match (&descendant_prefix, &self.type_info().id_column) {
            (None, Some(id_column)) if self_parented => self
                .descendant_rows(session, None)?
                .iter()
                .filter_map(|row| row.get(id_column).and_then(Value::as_id))
                .collect(),
            _ => HashSet::new(),
        };

        let mut dependents = Vec::new();
        for type_info in session.registry().types() {
            for dependency in &type_info.dependencies {
                if !dependency.targets(&own_type)
                    || kinds.is_some_and(|kinds| !kinds.contains(&dependency.kind))
                    || cascades_from(&type_info, &dependency.column, &own_type)
                {
                    continue;
                }

                let remaining = top.map(|top| top.saturating_sub(dependents.len()));
                if remaining == Some(0) {
                    return Ok(dependents);
                }
                let query = Query::filter(WhereCondition::eq(&dependency.column, id));
                for record in session.provider().select(&type_info.object_type, &query)? {
                    let row_id = type_info
                        .id_column
                        .as_ref()
                        .and_then(|c| record.get(c))
                        .and_then(Value::as_id);
                    if type_info.is(&own_type) {
                        if row_id == Some(id) || row_id.is_some_and(|r| walked_descendants.contains(&r)) {
                            continue;
                        }
                        let row_path = type_info
                            .id_path_column
                            .as_ref()
                            .and_then(|c| record.get(c))
                            .and_then(Value::as_str);
                        if let (Some(prefix), Some(path)) = (&descendant_prefix, row_path)
                            && path.starts_with(prefix.as_str())
                        {
                            continue;
                        }
                    }

                    dependents.push(Dependent {
                        object_type: type_info.object_type.clone(),
                        column: dependency.column.clone(),
                        kind: dependency.kind,
                        default_value: dependency.default_value.clone(),
                        id: row_id,
                        record,
                    });
                    if top.is_some_and(|top| dependents.len() >= top) {
                        return Ok(dependents);
                    }
                }
            }
        }
        Ok(dependents)
    }

    /// `true` when required or binding dependents exist, or any dependent at
    /// all with `report_all`.
    pub fn check_dependencies(&self, session: &InfoSession, report_all: bool) -> Result<bool> {
        let kinds: Option<&[DependencyKind]> = if report_all {
            None
        } else {
            Some(&[DependencyKind::Required, DependencyKind::Binding])
        };
        Ok(!self
            .get_dependencies(session, kinds, Some(1))?
            .is_empty())
    }

    /// Required dependents without a default, up to the configured cap.
    pub fn blocking_dependencies(&self, session: &InfoSession) -> Result<Vec<Dependent>> {
        let top = session.config().dependency_check_top;
        let mut blocking = Vec::new();
        for dependent in self.get_dependencies(session, Some(&[DependencyKind::Required]), None)? {
            if dependent.blocks_removal() {
                blocking.push(dependent);
                if top.is_some_and(|top| blocking.len() >= top) {
                    break;
                }
            }
        }
        Ok(blocking)
    }

    /// Clears every reference to this object: optional references become
    /// `Null` or their default, required ones with a default take it, and
    /// binding rows are deleted.
    ///
    /// Fails with [`InfoError::DependencyBlocked`] before touching anything
    /// when a required reference has no default.
    pub fn remove_object_dependencies(&self, session: &InfoSession) -> Result<()> {
        let dependents = self.get_dependencies(session, None, None)?;
        let blocking: Vec<String> = dependents
            .iter()
            .filter(|d| d.blocks_removal())
            .map(|d| d.to_string())
            .collect();
        if !blocking.is_empty() {
            return Err(InfoError::DependencyBlocked {
                object_type: self.object_type().to_string(),
                object_id: self.object_id()?.unwrap_or(0),
                dependents: blocking,
            });
        }

        for dependent in &dependents {
            let type_info = session.type_info(&dependent.object_type)?;
            let condition = row_condition(&type_info, &dependent.record);
            let action = match dependent.kind {
                DependencyKind::Binding => {
                    session.provider().delete(&type_info.object_type, &condition)?;
                    ChangeAction::Deleted
                }
                DependencyKind::Required | DependencyKind::NotRequired => {
                    let mut values = Record::new();
                    values.insert(
                        dependent.column.clone(),
                        dependent.default_value.clone().unwrap_or(Value::Null),
                    );
                    session
                        .provider()
                        .update(&type_info.object_type, &condition, &values)?;
                    ChangeAction::Updated
                }
            };
            if let Some(id) = dependent.id {
                session.object_cache().remove(&type_info.object_type, id)?;
            }
            session.notify(Notification::new(&type_info.object_type, dependent.id, action))?;
        }

        event!(Level::DEBUG, removed = dependents.len(), "object dependencies removed");
        Ok(())
    }
}
