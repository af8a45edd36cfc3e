use std::cmp::Ordering;

use tracing::{Level, event};

use super::InfoObject;
use crate::core::{InfoError, Record, Result, Value};
use crate::services::{ChangeAction, Notification, object_cache_keys};
use crate::session::InfoSession;
use crate::storage::{Query, WhereCondition};

/// Case-insensitive comparison with a case-sensitive tie break.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

struct Sibling {
    id: i64,
    order: Option<i64>,
    name: String,
}

struct OrderColumns {
    id: String,
    order: String,
    name: Option<String>,
}

impl InfoObject {
    fn order_columns(&self) -> Result<OrderColumns> {
        let type_info = self.type_info();
        match (&type_info.id_column, &type_info.order_column) {
            (Some(id), Some(order)) => Ok(OrderColumns {
                id: id.clone(),
                order: order.clone(),
                name: type_info
                    .display_name_column
                    .clone()
                    .or_else(|| type_info.code_name_column.clone()),
            }),
            _ => Err(InfoError::InvalidState(format!(
                "Type '{}' does not support ordering",
                type_info.object_type
            ))),
        }
    }

    fn siblings(&self, session: &InfoSession, columns: &OrderColumns) -> Result<Vec<Sibling>> {
        let rows = session
            .provider()
            .select(self.object_type(), &Query::filter(self.sibling_scope()?))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let id = row.get(&columns.id).and_then(Value::as_id)?;
                Some(Sibling {
                    id,
                    order: row.get(&columns.order).and_then(Value::as_i64),
                    name: columns
                        .name
                        .as_ref()
                        .and_then(|c| row.get(c))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect())
    }

    /// Assigns dense order values 1..N to the sibling group.
    ///
    /// Safe to re-run; it heals gaps and duplicates.
    pub fn initialize_order(&mut self, session: &InfoSession, alphabetical: bool) -> Result<()> {
        let columns = self.order_columns()?;
        let mut siblings = self.siblings(session, &columns)?;
        sort_siblings(&mut siblings, alphabetical);
        let changed = self.apply_order(session, &columns, &siblings)?;
        self.post_process_order(session, &changed)
    }

    /// Moves the object to `position` (1-based), or by `position` slots when
    /// `relative` is set. Out-of-range targets are clamped.
    pub fn set_order(&mut self, session: &InfoSession, position: i64, relative: bool) -> Result<()> {
        let columns = self.order_columns()?;
        let Some(id) = self.object_id()? else {
            return Err(InfoError::InvalidState(format!(
                "Cannot order unsaved '{}'",
                self.object_type()
            )));
        };

        let mut siblings = self.siblings(session, &columns)?;
        sort_siblings(&mut siblings, false);
        let Some(current) = siblings.iter().position(|s| s.id == id) else {
            return Err(InfoError::InvalidState(format!(
                "'{}' ({}) is not stored in its sibling group",
                self.object_type(),
                id
            )));
        };

        let requested = if relative {
            (current as i64 + 1).saturating_add(position)
        } else {
            position
        };
        let target = requested.clamp(1, siblings.len() as i64) as usize;
        let moved = siblings.remove(current);
        siblings.insert(target - 1, moved);

        let changed = self.apply_order(session, &columns, &siblings)?;
        self.post_process_order(session, &changed)
    }

    /// Moves the object to the slot its name sorts into among the siblings.
    pub fn set_alphabetical_order(&mut self, session: &InfoSession) -> Result<()> {
        let columns = self.order_columns()?;
        let id = self.object_id()?;
        let name = match &columns.name {
            Some(column) => self.get_stored_value(column)?.as_str().unwrap_or_default().to_string(),
            None => String::new(),
        };

        let mut others: Vec<Sibling> = self
            .siblings(session, &columns)?
            .into_iter()
            .filter(|s| Some(s.id) != id)
            .collect();
        sort_siblings(&mut others, false);
        let position = others
            .iter()
            .position(|s| compare_names(&name, &s.name) == Ordering::Less)
            .unwrap_or(others.len());
        self.set_order(session, position as i64 + 1, false)
    }

    /// Order of a freshly inserted row: alphabetical placement, or after the
    /// last sibling when no positive order was given.
    pub(crate) fn assign_insert_order(&mut self, session: &InfoSession) -> Result<()> {
        if self.type_info().order_column.is_none() || self.type_info().id_column.is_none() {
            return Ok(());
        }
        if self.type_info().flags.order_alphabetically {
            return self.set_alphabetical_order(session);
        }
        if self.order()?.is_some_and(|order| order > 0) {
            return Ok(());
        }

        let columns = self.order_columns()?;
        let id = self.object_id()?;
        let next = self
            .siblings(session, &columns)?
            .iter()
            .filter(|s| Some(s.id) != id)
            .filter_map(|s| s.order)
            .max()
            .unwrap_or(0)
            + 1;
        if let Some(id) = id {
            let mut values = Record::new();
            values.insert(columns.order.clone(), Value::Integer(next));
            session
                .provider()
                .update(self.object_type(), &WhereCondition::eq(&columns.id, id), &values)?;
        }
        self.set_persisted_value(&columns.order, Value::Integer(next))
    }

    /// Writes 1..N in the given sequence; returns the ids whose value changed.
    fn apply_order(&mut self, session: &InfoSession, columns: &OrderColumns, siblings: &[Sibling]) -> Result<Vec<i64>> {
        let own_id = self.object_id()?;
        let mut changed = Vec::new();
        for (idx, sibling) in siblings.iter().enumerate() {
            let order = idx as i64 + 1;
            if Some(sibling.id) == own_id {
                self.set_persisted_value(&columns.order, Value::Integer(order))?;
            }
            if sibling.order == Some(order) {
                continue;
            }
            let mut values = Record::new();
            values.insert(columns.order.clone(), Value::Integer(order));
            session.provider().update(
                self.object_type(),
                &WhereCondition::eq(&columns.id, sibling.id),
                &values,
            )?;
            changed.push(sibling.id);
        }
        event!(Level::DEBUG, siblings = siblings.len(), changed = changed.len(), "sibling order applied");
        Ok(changed)
    }

    /// Notifies and invalidates every sibling whose order changed.
    fn post_process_order(&self, session: &InfoSession, changed: &[i64]) -> Result<()> {
        if changed.is_empty() {
            return Ok(());
        }
        let mut keys = object_cache_keys(self.object_type(), None, None);
        for id in changed {
            session.object_cache().remove(self.object_type(), *id)?;
            session.notify(
                Notification::new(self.object_type(), Some(*id), ChangeAction::Updated).with_site(self.site_id()?),
            )?;
            keys.extend(object_cache_keys(self.object_type(), Some(*id), None).into_iter().skip(1));
        }
        session.touch_keys(&keys)
    }
}

fn sort_siblings(siblings: &mut [Sibling], alphabetical: bool) {
    if alphabetical {
        siblings.sort_by(|a, b| compare_names(&a.name, &b.name).then(a.id.cmp(&b.id)));
    } else {
        siblings.sort_by(|a, b| match (a.order, b.order) {
            (Some(x), Some(y)) => x.cmp(&y).then(a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
    }
}
