use std::collections::{HashSet, VecDeque};

use tracing::{Level, event};

use super::related::row_condition;
use super::InfoObject;
use crate::core::{Record, Result, Value};
use crate::session::InfoSession;
use crate::storage::{Query, WhereCondition};

pub const ROOT_PATH: &str = "/";

/// `/parent/segment`; children of the root get `/segment`.
pub fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() || parent == ROOT_PATH {
        format!("/{}", segment)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), segment)
    }
}

/// Zero-padded identifier segment of an ID path.
pub fn id_segment(id: i64, padding: usize) -> String {
    format!("{:0width$}", id, width = padding)
}

/// Moves `path` from under `old_prefix` to under `new_prefix`.
pub fn replace_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    let rest = if old_prefix == ROOT_PATH {
        path
    } else {
        path.strip_prefix(old_prefix).unwrap_or(path)
    };
    if new_prefix == ROOT_PATH {
        rest.to_string()
    } else {
        format!("{}{}", new_prefix, rest)
    }
}

fn segment_count(path: &str) -> i64 {
    path.split('/').filter(|s| !s.is_empty()).count() as i64
}

fn text_of(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Path columns of the parent, or `None` when the object is a root.
struct ParentPaths {
    id_path: Option<String>,
    name_path: Option<String>,
    level: i64,
}

struct PathChange {
    old_id_path: Option<String>,
    new_id_path: Option<String>,
    old_name_path: Option<String>,
    new_name_path: Option<String>,
    level_delta: i64,
}

impl PathChange {
    fn moved(&self) -> bool {
        let differs = |old: &Option<String>, new: &Option<String>| old.is_some() && new.is_some() && old != new;
        differs(&self.old_id_path, &self.new_id_path)
            || differs(&self.old_name_path, &self.new_name_path)
            || self.level_delta != 0
    }
}

impl InfoObject {
    pub fn id_path(&self) -> Result<Option<String>> {
        self.path_value(self.type_info().id_path_column.clone())
    }

    pub fn name_path(&self) -> Result<Option<String>> {
        self.path_value(self.type_info().name_path_column.clone())
    }

    pub fn level(&self) -> Result<Option<i64>> {
        match &self.type_info().level_column {
            Some(column) => Ok(self.get_stored_value(column)?.as_i64()),
            None => Ok(None),
        }
    }

    fn path_value(&self, column: Option<String>) -> Result<Option<String>> {
        match column {
            Some(column) => Ok(text_of(Some(&self.get_stored_value(&column)?))),
            None => Ok(None),
        }
    }

    /// Recomputes the ID path, name path and level after the row was written
    /// and rewrites the subtree when the object moved.
    pub(crate) fn update_hierarchy(&mut self, session: &InfoSession, inserted: bool) -> Result<()> {
        let type_info = self.type_info().clone();
        if !type_info.has_hierarchy_paths() {
            return Ok(());
        }

        let changed = |object: &InfoObject, column: &Option<String>| -> Result<bool> {
            match column {
                Some(column) => object.item_changed(column),
                None => Ok(false),
            }
        };
        let parent_changed = changed(self, &type_info.parent_id_column)?;
        let name_changed = if type_info.code_name_column.is_some() {
            changed(self, &type_info.code_name_column)?
        } else {
            changed(self, &type_info.display_name_column)?
        };

        let data = self.data()?;
        let original = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|c| text_of(data.get_original_value(c)))
        };
        let old_id_path = original(&type_info.id_path_column);
        let old_name_path = original(&type_info.name_path_column);
        let old_level = type_info
            .level_column
            .as_deref()
            .and_then(|c| data.get_original_value(c))
            .and_then(Value::as_i64);

        let id = self.object_id()?;
        let recompute_id = type_info.id_path_column.is_some()
            && id.is_some()
            && (inserted || parent_changed || self.id_path()?.is_none());
        let recompute_name = type_info.name_path_column.is_some()
            && (inserted || parent_changed || name_changed || self.name_path()?.is_none());
        if !recompute_id && !recompute_name {
            return Ok(());
        }

        let parent = self.parent_paths(session)?;
        let level = parent.as_ref().map(|p| p.level + 1).unwrap_or(0);

        let mut updates = Record::new();
        let mut change = PathChange {
            old_id_path: old_id_path.clone(),
            new_id_path: old_id_path,
            old_name_path: old_name_path.clone(),
            new_name_path: old_name_path,
            level_delta: old_level.map(|old| level - old).unwrap_or(0),
        };

        if let (true, Some(column), Some(id)) = (recompute_id, &type_info.id_path_column, id) {
            let path = match parent.as_ref().and_then(|p| p.id_path.as_deref()) {
                Some(parent_path) => join_path(parent_path, &id_segment(id, session.config().id_path_padding)),
                None if parent.is_some() => join_path(ROOT_PATH, &id_segment(id, session.config().id_path_padding)),
                None => ROOT_PATH.to_string(),
            };
            updates.insert(column.clone(), Value::Text(path.clone()));
            change.new_id_path = Some(path);
        }
        if let (true, Some(column)) = (recompute_name, &type_info.name_path_column) {
            let segment = self.code_name()?.or(self.display_name()?).unwrap_or_default();
            let path = match parent.as_ref().and_then(|p| p.name_path.as_deref()) {
                Some(parent_path) => join_path(parent_path, &segment),
                None if parent.is_some() => join_path(ROOT_PATH, &segment),
                None => ROOT_PATH.to_string(),
            };
            updates.insert(column.clone(), Value::Text(path.clone()));
            change.new_name_path = Some(path);
        }
        if let Some(column) = &type_info.level_column {
            updates.insert(column.clone(), Value::Integer(level));
        }

        for (column, value) in &updates {
            self.set_raw_value(column, value.clone())?;
        }
        let condition = row_condition(&type_info, &self.to_record()?);
        session.provider().update(self.object_type(), &condition, &updates)?;
        event!(
            Level::TRACE,
            id_path = ?change.new_id_path,
            name_path = ?change.new_name_path,
            level,
            "hierarchy paths updated"
        );

        if !inserted && type_info.is_self_hierarchical() && change.moved() {
            self.rewrite_descendants(session, &change)?;
        }
        Ok(())
    }

    fn parent_paths(&self, session: &InfoSession) -> Result<Option<ParentPaths>> {
        let Some(parent) = self.load_parent(session)? else {
            return Ok(None);
        };
        let parent_info = parent.type_info().clone();
        if !parent_info.has_hierarchy_paths() {
            return Ok(None);
        }
        let id_path = parent.id_path()?;
        let name_path = parent.name_path()?;
        let level = match parent.level()? {
            Some(level) => level,
            None => segment_count(id_path.as_deref().or(name_path.as_deref()).unwrap_or(ROOT_PATH)),
        };
        Ok(Some(ParentPaths {
            id_path,
            name_path,
            level,
        }))
    }

    /// Rows of the subtree below this object, found by ID-path prefix or, for
    /// a former root, by walking the parent column.
    pub(crate) fn descendant_rows(&self, session: &InfoSession, old_id_path: Option<&str>) -> Result<Vec<Record>> {
        let type_info = self.type_info().clone();
        let provider = session.provider();

        if let (Some(column), Some(old_path)) = (&type_info.id_path_column, old_id_path)
            && old_path != ROOT_PATH
        {
            let prefix = format!("{}/", old_path);
            return provider.select(
                self.object_type(),
                &Query::filter(WhereCondition::starts_with(column, &prefix)),
            );
        }

        let (Some(id_column), Some(parent_column), Some(root_id)) = (
            type_info.id_column.clone(),
            type_info.parent_id_column.clone(),
            self.object_id()?,
        ) else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        let mut seen = HashSet::from([root_id]);
        let mut queue = VecDeque::from([root_id]);
        while let Some(parent_id) = queue.pop_front() {
            for row in provider.select(
                self.object_type(),
                &Query::filter(WhereCondition::eq(&parent_column, parent_id)),
            )? {
                if let Some(id) = row.get(&id_column).and_then(Value::as_id)
                    && seen.insert(id)
                {
                    queue.push_back(id);
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    fn rewrite_descendants(&self, session: &InfoSession, change: &PathChange) -> Result<()> {
        let type_info = self.type_info().clone();
        let Some(id_column) = type_info.id_column.clone() else {
            return Ok(());
        };
        let rows = self.descendant_rows(session, change.old_id_path.as_deref())?;

        for row in &rows {
            let Some(id) = row.get(&id_column).and_then(Value::as_id) else {
                continue;
            };
            let mut values = Record::new();
            let rewrite = |column: &Option<String>, old: &Option<String>, new: &Option<String>| {
                let (Some(column), Some(old), Some(new)) = (column, old, new) else {
                    return None;
                };
                let current = text_of(row.get(column))?;
                Some((column.clone(), Value::Text(replace_prefix(&current, old, new))))
            };
            values.extend(rewrite(&type_info.id_path_column, &change.old_id_path, &change.new_id_path));
            values.extend(rewrite(&type_info.name_path_column, &change.old_name_path, &change.new_name_path));
            if let Some(column) = &type_info.level_column
                && let Some(level) = row.get(column).and_then(Value::as_i64)
            {
                values.insert(column.clone(), Value::Integer(level + change.level_delta));
            }

            if !values.is_empty() {
                session
                    .provider()
                    .update(self.object_type(), &WhereCondition::eq(&id_column, id), &values)?;
                session.object_cache().remove(self.object_type(), id)?;
            }
        }
        event!(Level::DEBUG, descendants = rows.len(), "subtree paths rewritten");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "000001"), "/000001");
        assert_eq!(join_path("/000001", "000002"), "/000001/000002");
        assert_eq!(join_path("", "Home"), "/Home");
    }

    #[test]
    fn test_id_segment_padding() {
        assert_eq!(id_segment(2, 6), "000002");
        assert_eq!(id_segment(1234567, 6), "1234567");
    }

    #[test]
    fn test_replace_prefix() {
        assert_eq!(replace_prefix("/000001/000002/000005", "/000001/000002", "/000003/000002"), "/000003/000002/000005");
        assert_eq!(replace_prefix("/000002", "/", "/000003/000001"), "/000003/000001/000002");
        assert_eq!(replace_prefix("/000003/000001/000002", "/000003/000001", "/"), "/000002");
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count("/"), 0);
        assert_eq!(segment_count("/a/b"), 2);
    }
}
