use super::class::{InfoClass, InfoProvider};
use super::InfoObject;
use crate::core::{Column, DataType, Result, Value};
use crate::external::ExternalColumnSetting;
use crate::metadata::TypeInfo;
use crate::session::InfoSession;
use crate::storage::{Query, WhereCondition};

pub const METAFILE_OBJECT_TYPE: &str = "cms.metafile";

/// Built-in descriptor of file attachments owned by (object type, object id).
///
/// The binary content is an external column stored under the file's GUID.
pub fn metafile_type_info() -> TypeInfo {
    TypeInfo::new(
        METAFILE_OBJECT_TYPE,
        vec![
            Column::new("MetaFileID", DataType::Integer),
            Column::new("MetaFileGUID", DataType::Guid),
            Column::new("MetaFileObjectType", DataType::Text).not_null(),
            Column::new("MetaFileObjectID", DataType::Integer).not_null(),
            Column::new("MetaFileName", DataType::Text),
            Column::new("MetaFileMimeType", DataType::Text),
            Column::new("MetaFileSize", DataType::Integer),
            Column::new("MetaFileBinary", DataType::Binary),
            Column::new("MetaFileLastModified", DataType::Timestamp),
        ],
    )
    .id_column("MetaFileID")
    .guid_column("MetaFileGUID")
    .display_name_column("MetaFileName")
    .last_modified_column("MetaFileLastModified")
    .configure_flags(|flags| {
        flags.check_dependencies_on_delete = false;
        flags.generate_code_name = false;
    })
    .with_external_columns(|| {
        vec![
            ExternalColumnSetting::new("MetaFileBinary", |values| {
                let guid = values.get("MetaFileGUID").as_guid()?;
                Some(format!(
                    "metafiles/{}/{}",
                    values.get_string("MetaFileObjectType").replace('.', "_"),
                    guid
                ))
            })
            .binary(),
        ]
    })
}

/// A file attached to another object.
#[derive(Debug, Clone)]
pub struct MetaFile {
    object: InfoObject,
}

impl MetaFile {
    /// Attaches `data` to `owner`; saved with [`InfoProvider::set`].
    pub fn attach(session: &InfoSession, owner: &InfoObject, name: &str, data: Vec<u8>) -> Result<Self> {
        let mut file = InfoProvider::<MetaFile>::new(session).create()?;
        let size = data.len() as i64;
        let object = file.object_mut();
        object.set_value("MetaFileObjectType", owner.object_type())?;
        object.set_value("MetaFileObjectID", owner.object_id()?)?;
        object.set_value("MetaFileName", name)?;
        object.set_value("MetaFileSize", size)?;
        object.set_value("MetaFileBinary", data)?;
        Ok(file)
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.object.get_value("MetaFileName")?.to_string())
    }

    pub fn owner_id(&self) -> Result<Option<i64>> {
        Ok(self.object.get_value("MetaFileObjectID")?.as_id())
    }

    /// File content, read from external storage when stored there.
    pub fn binary(&self) -> Result<Vec<u8>> {
        Ok(match self.object.get_value("MetaFileBinary")? {
            Value::Binary(bytes) => bytes,
            _ => Vec::new(),
        })
    }
}

impl InfoClass for MetaFile {
    const OBJECT_TYPE: &'static str = METAFILE_OBJECT_TYPE;

    fn from_object(object: InfoObject) -> Self {
        Self { object }
    }

    fn object(&self) -> &InfoObject {
        &self.object
    }

    fn object_mut(&mut self) -> &mut InfoObject {
        &mut self.object
    }

    fn into_object(self) -> InfoObject {
        self.object
    }

    fn type_info() -> TypeInfo {
        metafile_type_info()
    }
}

impl InfoObject {
    /// Meta files attached to this object.
    pub fn metafiles(&self, session: &InfoSession) -> Result<Vec<InfoObject>> {
        let Some(id) = self.object_id()? else {
            return Ok(Vec::new());
        };
        let condition = WhereCondition::eq("MetaFileObjectType", self.object_type())
            .and(WhereCondition::eq("MetaFileObjectID", id));
        session.get_objects(
            METAFILE_OBJECT_TYPE,
            &Query::filter(condition).order_by("MetaFileID"),
        )
    }
}
