use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::ObjectStatus;
use super::InfoObject;
use crate::core::{Record, Result};
use crate::data::DataContainer;
use crate::metadata::TypeRegistry;

/// Transferable state of one object.
///
/// Both sides must agree on the type registry; columns unknown to the
/// receiving descriptor are dropped on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoSnapshot {
    pub object_type: String,
    pub status: ObjectStatus,
    pub is_clone: bool,
    pub is_complete: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub values: Record,
    pub original: Record,
}

impl InfoSnapshot {
    /// MessagePack encoding with named fields.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl InfoObject {
    pub fn snapshot(&self) -> Result<InfoSnapshot> {
        let data = self.data()?;
        Ok(InfoSnapshot {
            object_type: self.object_type().to_string(),
            status: self.status(),
            is_clone: self.is_clone,
            is_complete: data.is_complete(),
            last_modified: self.last_modified()?,
            values: data.to_record(),
            original: data.original_record(),
        })
    }

    /// Rebuilds an instance; values differing from the originals come back dirty.
    ///
    /// The instance is not bound to any file storage, so external columns
    /// read their database copy. [`InfoSession::restore_snapshot`] returns a
    /// bound instance.
    ///
    /// [`InfoSession::restore_snapshot`]: crate::session::InfoSession::restore_snapshot
    pub fn from_snapshot(registry: &TypeRegistry, snapshot: &InfoSnapshot) -> Result<InfoObject> {
        let type_info = registry.get_type_info(&snapshot.object_type)?;
        let mut data = DataContainer::from_record(type_info.schema.clone(), &snapshot.original);
        for (column, value) in &snapshot.values {
            data.set_value(column, value.clone());
        }
        data.set_complete(snapshot.is_complete);

        let mut object = InfoObject::lazy(type_info, move || Ok(data));
        object.status = snapshot.status;
        object.is_clone = snapshot.is_clone;
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, Value};
    use crate::metadata::TypeInfo;

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::empty();
        registry
            .register(
                TypeInfo::new(
                    "test.note",
                    vec![
                        Column::new("NoteID", DataType::Integer),
                        Column::new("NoteText", DataType::Text),
                    ],
                )
                .id_column("NoteID"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_snapshot_restores_dirty_state() {
        let registry = registry();
        let mut record = Record::new();
        record.insert("NoteID".into(), Value::Integer(5));
        record.insert("NoteText".into(), Value::from("draft"));
        let mut note = InfoObject::from_record(registry.get_type_info("test.note").unwrap(), &record);
        note.set_value("NoteText", "final").unwrap();

        let bytes = note.snapshot().unwrap().to_bytes().unwrap();
        let restored = InfoObject::from_snapshot(&registry, &InfoSnapshot::from_bytes(&bytes).unwrap()).unwrap();

        assert_eq!(restored.status(), ObjectStatus::Changed);
        assert_eq!(restored.changed_columns().unwrap(), vec!["NoteText".to_string()]);
        assert_eq!(restored.get_value("NoteText").unwrap(), Value::from("final"));
        assert_eq!(
            restored.original_record().unwrap().get("NoteText"),
            Some(&Value::from("draft"))
        );
        assert!(restored.is_complete().unwrap());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let snapshot = InfoSnapshot {
            object_type: "test.missing".into(),
            status: ObjectStatus::New,
            is_clone: false,
            is_complete: false,
            last_modified: None,
            values: Record::new(),
            original: Record::new(),
        };
        assert!(InfoObject::from_snapshot(&registry(), &snapshot).is_err());
    }
}
