use std::fmt;

use serde::{Deserialize, Serialize};

/// Persistence state of an [`InfoObject`](super::InfoObject).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectStatus {
    #[default]
    New,
    Changed,
    Unchanged,
    ToBeDeleted,
    WasDeleted,
}

impl ObjectStatus {
    pub fn is_deleting(&self) -> bool {
        matches!(self, Self::ToBeDeleted | Self::WasDeleted)
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "New",
            Self::Changed => "Changed",
            Self::Unchanged => "Unchanged",
            Self::ToBeDeleted => "ToBeDeleted",
            Self::WasDeleted => "WasDeleted",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleOperation {
    Insert,
    Update,
    Upsert,
    Delete,
    InsertAsClone,
}

impl LifecycleOperation {
    /// Upper-case code used in event log entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Upsert => "UPSERT",
            Self::Delete => "DELETE",
            Self::InsertAsClone => "INSERTASCLONE",
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert | Self::InsertAsClone)
    }
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result of a lifecycle operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Completed,
    /// A "before" handler vetoed the operation; nothing was written.
    Cancelled,
}

impl LifecycleOutcome {
    pub fn is_completed(&self) -> bool {
        *self == Self::Completed
    }
}
