use serde::{Deserialize, Serialize};

use crate::core::Value;

/// How a referencing object reacts when the referenced object is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// The reference must stay valid: blocks removal unless a default exists.
    Required,
    /// The reference is nulled out on removal.
    NotRequired,
    /// The referencing row is an association that is deleted with the target.
    Binding,
}

/// A foreign-key column of the declaring type pointing at `target_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDependency {
    pub column: String,
    pub target_type: String,
    pub kind: DependencyKind,
    pub default_value: Option<Value>,
}

impl ObjectDependency {
    pub fn new(column: impl Into<String>, target_type: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            column: column.into(),
            target_type: target_type.into(),
            kind,
            default_value: None,
        }
    }

    pub fn required(column: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::new(column, target_type, DependencyKind::Required)
    }

    pub fn optional(column: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::new(column, target_type, DependencyKind::NotRequired)
    }

    pub fn binding(column: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::new(column, target_type, DependencyKind::Binding)
    }

    /// Value written into the referencing column when the target goes away.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.kind == DependencyKind::Required
    }

    /// Required without a fallback value: removal of the target must be refused.
    pub fn blocks_removal(&self) -> bool {
        self.kind == DependencyKind::Required && self.default_value.is_none()
    }

    pub fn targets(&self, object_type: &str) -> bool {
        self.target_type.eq_ignore_ascii_case(object_type)
    }
}
