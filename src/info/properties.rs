use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::InfoObject;
use crate::core::{InfoError, Result, Value};
use crate::metadata::TypeInfo;
use crate::session::InfoSession;

/// Value of a registered property: a column value, one object or a collection.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Value(Value),
    Object(Option<InfoObject>),
    Objects(Vec<InfoObject>),
}

impl PropertyValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&InfoObject> {
        match self {
            Self::Object(o) => o.as_ref(),
            _ => None,
        }
    }

    pub fn as_objects(&self) -> &[InfoObject] {
        match self {
            Self::Objects(o) => o,
            _ => &[],
        }
    }
}

pub type PropertyAccessor =
    Arc<dyn Fn(&InfoObject, &InfoSession) -> Result<PropertyValue> + Send + Sync>;

#[derive(Clone)]
pub struct PropertyDefinition {
    pub name: String,
    accessor: PropertyAccessor,
}

impl PropertyDefinition {
    pub fn new(name: &str, accessor: PropertyAccessor) -> Self {
        Self {
            name: name.to_string(),
            accessor,
        }
    }

    pub fn get(&self, object: &InfoObject, session: &InfoSession) -> Result<PropertyValue> {
        (self.accessor)(object, session)
    }
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Named accessors of one type: raw columns plus derived relations.
///
/// Built once per type from the descriptor; custom definitions override
/// generated ones of the same name.
#[derive(Debug, Default)]
pub struct PropertyTable {
    properties: HashMap<String, PropertyDefinition>,
    order: Vec<String>,
}

impl PropertyTable {
    pub fn build(type_info: &TypeInfo, custom: &[PropertyDefinition]) -> Self {
        let mut table = Self::default();

        for name in type_info.schema.column_names() {
            let column = name.to_string();
            table.add(PropertyDefinition::new(
                name,
                Arc::new(move |obj: &InfoObject, _: &InfoSession| Ok(PropertyValue::Value(obj.get_value(&column)?))),
            ));
        }

        if type_info.parent_id_column.is_some() {
            table.add(PropertyDefinition::new(
                "Parent",
                Arc::new(|obj: &InfoObject, session: &InfoSession| Ok(PropertyValue::Object(obj.load_parent(session)?))),
            ));
        }

        for dependency in &type_info.dependencies {
            let column = dependency.column.clone();
            table.add(PropertyDefinition::new(
                &format!("{}Object", dependency.column),
                Arc::new(move |obj: &InfoObject, session: &InfoSession| {
                    Ok(PropertyValue::Object(obj.referenced_object(session, &column)?))
                }),
            ));
        }

        table.add(PropertyDefinition::new(
            "Children",
            Arc::new(|obj: &InfoObject, session: &InfoSession| Ok(PropertyValue::Objects(obj.all_children(session)?))),
        ));

        table.add(PropertyDefinition::new(
            "Bindings",
            Arc::new(|obj: &InfoObject, session: &InfoSession| {
                let mut bindings = Vec::new();
                for binding in session.registry().binding_types(obj.object_type()) {
                    bindings.extend(obj.bindings(session, &binding.object_type)?);
                }
                Ok(PropertyValue::Objects(bindings))
            }),
        ));

        table.add(PropertyDefinition::new(
            "ReferringObjects",
            Arc::new(|obj: &InfoObject, session: &InfoSession| {
                let mut referring = Vec::new();
                for dependent in obj.get_dependencies(session, None, None)? {
                    let type_info = session.type_info(&dependent.object_type)?;
                    referring.push(session.object_from_record(type_info, &dependent.record));
                }
                Ok(PropertyValue::Objects(referring))
            }),
        ));

        if type_info.flags.has_metafiles {
            table.add(PropertyDefinition::new(
                "MetaFiles",
                Arc::new(|obj: &InfoObject, session: &InfoSession| Ok(PropertyValue::Objects(obj.metafiles(session)?))),
            ));
        }

        for definition in custom {
            table.add(definition.clone());
        }
        table
    }

    fn add(&mut self, definition: PropertyDefinition) {
        let key = definition.name.to_ascii_lowercase();
        if self.properties.insert(key.clone(), definition).is_none() {
            self.order.push(key);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.get(&name.to_ascii_lowercase())
    }

    /// Property names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|key| self.properties.get(key))
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl InfoObject {
    /// Reads a column or derived property by name.
    pub fn get_property(&self, name: &str, session: &InfoSession) -> Result<PropertyValue> {
        let table = self.type_info().property_table()?;
        match table.get(name) {
            Some(definition) => definition.get(self, session),
            None => Err(InfoError::ColumnNotFound(
                name.to_string(),
                self.object_type().to_string(),
            )),
        }
    }

    pub fn property_names(&self) -> Result<Vec<String>> {
        Ok(self.type_info().property_table()?.names())
    }
}
