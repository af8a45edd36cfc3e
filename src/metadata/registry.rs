use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use super::TypeInfo;
use crate::core::{InfoError, Result};
use crate::info::events::EventRegistry;
use crate::info::metafile::metafile_type_info;
use crate::info::settings::object_settings_type_info;
use crate::info::InfoObject;

// Global singleton registry
lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<TypeRegistry> = Arc::new(TypeRegistry::new());
}

/// Registered object types plus their lifecycle handlers.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeInfo>>>,
    events: EventRegistry,
}

impl TypeRegistry {
    /// Get the global registry instance
    ///
    /// Sessions built without an explicit registry share this one.
    pub fn global() -> &'static Arc<TypeRegistry> {
        &GLOBAL_REGISTRY
    }

    /// Creates a registry holding the built-in meta file and object settings types.
    pub fn new() -> Self {
        let registry = Self::empty();
        let builtins = [metafile_type_info(), object_settings_type_info()];
        if let Ok(mut types) = registry.types.write() {
            for info in builtins {
                types.insert(info.object_type.to_ascii_lowercase(), Arc::new(info));
            }
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            events: EventRegistry::default(),
        }
    }

    pub fn register(&self, type_info: TypeInfo) -> Result<Arc<TypeInfo>> {
        type_info.validate()?;
        let key = type_info.object_type.to_ascii_lowercase();

        let mut types = self.types.write()?;
        if types.contains_key(&key) {
            return Err(InfoError::Validation(format!(
                "Object type '{}' is already registered",
                type_info.object_type
            )));
        }

        let type_info = Arc::new(type_info);
        types.insert(key, type_info.clone());
        Ok(type_info)
    }

    pub fn get_type_info(&self, object_type: &str) -> Result<Arc<TypeInfo>> {
        self.find(object_type)
            .ok_or_else(|| InfoError::TypeNotRegistered(object_type.to_string()))
    }

    pub fn find(&self, object_type: &str) -> Option<Arc<TypeInfo>> {
        self.types
            .read()
            .ok()
            .and_then(|types| types.get(&object_type.to_ascii_lowercase()).cloned())
    }

    pub fn contains(&self, object_type: &str) -> bool {
        self.find(object_type).is_some()
    }

    /// All registered types, sorted by name.
    pub fn types(&self) -> Vec<Arc<TypeInfo>> {
        let mut types: Vec<_> = self
            .types
            .read()
            .map(|types| types.values().cloned().collect())
            .unwrap_or_default();
        types.sort_by(|a, b| a.object_type.cmp(&b.object_type));
        types
    }

    /// Empty instance that rejects writes; used for metadata-level calls.
    pub fn read_only_instance(&self, object_type: &str) -> Result<InfoObject> {
        let type_info = self.get_type_info(object_type)?;
        Ok(InfoObject::read_only(type_info))
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Non-binding types whose parent is `object_type`.
    pub fn child_types(&self, object_type: &str) -> Vec<Arc<TypeInfo>> {
        self.types()
            .into_iter()
            .filter(|t| !t.flags.is_binding && parent_is(t, object_type))
            .collect()
    }

    /// Binding types owned by `object_type`, excluding site bindings.
    pub fn binding_types(&self, object_type: &str) -> Vec<Arc<TypeInfo>> {
        self.types()
            .into_iter()
            .filter(|t| t.flags.is_binding && !t.flags.is_site_binding && parent_is(t, object_type))
            .collect()
    }

    pub fn site_binding_types(&self, object_type: &str) -> Vec<Arc<TypeInfo>> {
        self.types()
            .into_iter()
            .filter(|t| t.flags.is_binding && t.flags.is_site_binding && parent_is(t, object_type))
            .collect()
    }

    /// Binding types that reference `object_type` from their non-owning side.
    pub fn other_binding_types(&self, object_type: &str) -> Vec<Arc<TypeInfo>> {
        self.types()
            .into_iter()
            .filter(|t| {
                t.flags.is_binding
                    && !parent_is(t, object_type)
                    && t.dependencies.iter().any(|d| d.targets(object_type))
            })
            .collect()
    }
}

fn parent_is(type_info: &TypeInfo, object_type: &str) -> bool {
    type_info
        .parent_object_type
        .as_deref()
        .is_some_and(|p| p.eq_ignore_ascii_case(object_type))
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
