// ============================================================================
// Transaction Change Journal
// ============================================================================
//
// Every mutation made inside a transaction is recorded as a reversible
// Change. Rollback replays the journal backwards.
//
// ============================================================================

use crate::core::Record;

/// A single reversible row mutation
#[derive(Debug, Clone)]
pub enum Change {
    /// A row was inserted; undo removes it
    Insert { table: String, row_id: u64 },

    /// A row was overwritten; undo restores `old`
    Update {
        table: String,
        row_id: u64,
        old: Record,
    },

    /// A row was removed; undo puts `old` back under the same row id
    Delete {
        table: String,
        row_id: u64,
        old: Record,
    },
}

impl Change {
    pub fn table_name(&self) -> &str {
        match self {
            Change::Insert { table, .. } => table,
            Change::Update { table, .. } => table,
            Change::Delete { table, .. } => table,
        }
    }

    pub fn row_id(&self) -> u64 {
        match self {
            Change::Insert { row_id, .. }
            | Change::Update { row_id, .. }
            | Change::Delete { row_id, .. } => *row_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_accessors() {
        let change = Change::Delete {
            table: "cms.page".into(),
            row_id: 7,
            old: Record::new(),
        };
        assert_eq!(change.table_name(), "cms.page");
        assert_eq!(change.row_id(), 7);
    }
}
