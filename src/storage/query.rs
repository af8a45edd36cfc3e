use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::{Record, Value};

/// Row filter understood by every [`DataProvider`](super::DataProvider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WhereCondition {
    All,
    /// Column equals value; `Null` matches missing or null columns.
    Eq(String, Value),
    NotEq(String, Value),
    IsNull(String),
    In(String, Vec<Value>),
    /// Text column starts with the prefix.
    StartsWith(String, String),
    And(Vec<WhereCondition>),
    Or(Vec<WhereCondition>),
    Not(Box<WhereCondition>),
}

impl WhereCondition {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn not_eq(column: &str, value: impl Into<Value>) -> Self {
        Self::NotEq(column.to_string(), value.into())
    }

    pub fn starts_with(column: &str, prefix: &str) -> Self {
        Self::StartsWith(column.to_string(), prefix.to_string())
    }

    pub fn is_null(column: &str) -> Self {
        Self::IsNull(column.to_string())
    }

    /// Conjunction that drops `All` terms and flattens nested `And`s.
    pub fn and(self, other: WhereCondition) -> Self {
        match (self, other) {
            (Self::All, other) | (other, Self::All) => other,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (first, second) => Self::And(vec![first, second]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Eq(column, value) => values_equal(column_value(record, column), value),
            Self::NotEq(column, value) => !values_equal(column_value(record, column), value),
            Self::IsNull(column) => column_value(record, column).is_null(),
            Self::In(column, values) => {
                let actual = column_value(record, column);
                values.iter().any(|v| values_equal(actual, v))
            }
            Self::StartsWith(column, prefix) => column_value(record, column)
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Self::And(conditions) => conditions.iter().all(|c| c.matches(record)),
            Self::Or(conditions) => conditions.iter().any(|c| c.matches(record)),
            Self::Not(condition) => !condition.matches(record),
        }
    }
}

const NULL: Value = Value::Null;

fn column_value<'a>(record: &'a Record, column: &str) -> &'a Value {
    record
        .get(column)
        .or_else(|| {
            record
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, v)| v)
        })
        .unwrap_or(&NULL)
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Text(a), Value::Text(b)) => a.eq_ignore_ascii_case(b),
        _ => actual == expected,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Filter, ordering, row cap and projection for a select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub condition: WhereCondition,
    pub order_by: Vec<OrderBy>,
    pub top: Option<usize>,
    pub columns: Option<Vec<String>>,
}

impl Query {
    pub fn all() -> Self {
        Self::filter(WhereCondition::All)
    }

    pub fn filter(condition: WhereCondition) -> Self {
        Self {
            condition,
            order_by: Vec::new(),
            top: None,
            columns: None,
        }
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy {
            column: column.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy {
            column: column.to_string(),
            descending: true,
        });
        self
    }

    pub fn top(mut self, top: Option<usize>) -> Self {
        self.top = top;
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Orders records in place by the query's sort keys.
    pub fn sort(&self, records: &mut [Record]) {
        if self.order_by.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for key in &self.order_by {
                let ordering = column_value(a, &key.column)
                    .compare(column_value(b, &key.column))
                    .unwrap_or(Ordering::Equal);
                let ordering = if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    pub fn project(&self, record: Record) -> Record {
        match &self.columns {
            None => record,
            Some(columns) => record
                .into_iter()
                .filter(|(name, _)| columns.iter().any(|c| c.eq_ignore_ascii_case(name)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, path: &str) -> Record {
        let mut record = Record::new();
        record.insert("ID".into(), Value::Integer(id));
        record.insert("Path".into(), Value::from(path));
        record
    }

    #[test]
    fn test_conditions() {
        let r = record(2, "/000001/000002");
        assert!(WhereCondition::eq("ID", 2i64).matches(&r));
        assert!(WhereCondition::starts_with("Path", "/000001/").matches(&r));
        assert!(WhereCondition::is_null("Missing").matches(&r));
        assert!(
            WhereCondition::eq("ID", 2i64)
                .and(WhereCondition::not_eq("Path", "/"))
                .matches(&r)
        );
        assert!(!WhereCondition::eq("ID", 2i64).negate().matches(&r));
    }

    #[test]
    fn test_and_flattens_and_skips_all() {
        let c = WhereCondition::All
            .and(WhereCondition::eq("A", 1i64))
            .and(WhereCondition::eq("B", 2i64));
        assert!(matches!(c, WhereCondition::And(ref terms) if terms.len() == 2));
    }

    #[test]
    fn test_sort_and_project() {
        let mut rows = vec![record(3, "c"), record(1, "a"), record(2, "b")];
        let query = Query::all().order_by_desc("ID").columns(&["ID"]);
        query.sort(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r["ID"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        let projected = query.project(rows.remove(0));
        assert_eq!(projected.len(), 1);
    }
}
