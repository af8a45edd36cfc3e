use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;

use super::clear_cache::{ClearCacheCallback, ClearCacheTable};
use super::{ObjectDependency, PerTypeCache};
use crate::core::{Column, DataType, InfoError, Result, Schema};
use crate::external::{ExternalColumnSetting, ExternalColumns};
use crate::info::properties::{PropertyAccessor, PropertyDefinition, PropertyTable};

lazy_static! {
    static ref EXTERNAL_COLUMNS: PerTypeCache<ExternalColumns> = PerTypeCache::new();
    static ref PROPERTY_TABLES: PerTypeCache<PropertyTable> = PerTypeCache::new();
    static ref CLEAR_CACHE_TABLES: PerTypeCache<ClearCacheTable> = PerTypeCache::new();
}

static NEXT_TYPE_KEY: AtomicU64 = AtomicU64::new(1);

pub type ExternalColumnsFactory = Arc<dyn Fn() -> Vec<ExternalColumnSetting> + Send + Sync>;

/// Behavioral switches of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFlags {
    pub supports_cloning: bool,
    pub supports_locking: bool,
    pub check_dependencies_on_delete: bool,
    pub supports_upsert: bool,
    /// Association type identified by its foreign keys.
    pub is_binding: bool,
    /// Binding between an object and a site.
    pub is_site_binding: bool,
    pub order_alphabetically: bool,
    pub has_metafiles: bool,
    pub generate_code_name: bool,
}

impl Default for TypeFlags {
    fn default() -> Self {
        Self {
            supports_cloning: true,
            supports_locking: false,
            check_dependencies_on_delete: true,
            supports_upsert: false,
            is_binding: false,
            is_site_binding: false,
            order_alphabetically: false,
            has_metafiles: false,
            generate_code_name: true,
        }
    }
}

/// Per-type descriptor: which columns play which role and how the type behaves.
///
/// Built once with the consuming setters below, then shared as `Arc<TypeInfo>`
/// through the [`TypeRegistry`](super::TypeRegistry).
pub struct TypeInfo {
    key: u64,
    pub object_type: String,
    pub schema: Arc<Schema>,
    pub id_column: Option<String>,
    pub guid_column: Option<String>,
    pub version_guid_column: Option<String>,
    pub code_name_column: Option<String>,
    pub display_name_column: Option<String>,
    pub parent_id_column: Option<String>,
    pub parent_object_type: Option<String>,
    pub site_id_column: Option<String>,
    pub group_id_column: Option<String>,
    pub last_modified_column: Option<String>,
    pub order_column: Option<String>,
    pub id_path_column: Option<String>,
    pub name_path_column: Option<String>,
    pub level_column: Option<String>,
    pub dependencies: Vec<ObjectDependency>,
    pub flags: TypeFlags,
    pub license_feature: Option<String>,
    pub localizable_columns: Vec<String>,
    pub natural_key_columns: Vec<String>,
    external_columns_factory: Option<ExternalColumnsFactory>,
    custom_properties: Vec<PropertyDefinition>,
    custom_clear_cache: Vec<(String, ClearCacheCallback)>,
}

impl TypeInfo {
    pub fn new(object_type: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            key: NEXT_TYPE_KEY.fetch_add(1, Ordering::Relaxed),
            object_type: object_type.into(),
            schema: Arc::new(Schema::new(columns)),
            id_column: None,
            guid_column: None,
            version_guid_column: None,
            code_name_column: None,
            display_name_column: None,
            parent_id_column: None,
            parent_object_type: None,
            site_id_column: None,
            group_id_column: None,
            last_modified_column: None,
            order_column: None,
            id_path_column: None,
            name_path_column: None,
            level_column: None,
            dependencies: Vec::new(),
            flags: TypeFlags::default(),
            license_feature: None,
            localizable_columns: Vec::new(),
            natural_key_columns: Vec::new(),
            external_columns_factory: None,
            custom_properties: Vec::new(),
            custom_clear_cache: Vec::new(),
        }
    }

    /// Identity of this descriptor for the process-global per-type tables.
    pub fn type_key(&self) -> u64 {
        self.key
    }

    pub fn id_column(mut self, column: &str) -> Self {
        self.id_column = Some(column.to_string());
        self
    }

    pub fn guid_column(mut self, column: &str) -> Self {
        self.guid_column = Some(column.to_string());
        self
    }

    pub fn version_guid_column(mut self, column: &str) -> Self {
        self.version_guid_column = Some(column.to_string());
        self
    }

    pub fn code_name_column(mut self, column: &str) -> Self {
        self.code_name_column = Some(column.to_string());
        self
    }

    pub fn display_name_column(mut self, column: &str) -> Self {
        self.display_name_column = Some(column.to_string());
        self
    }

    /// Parent foreign key and the type it points at.
    pub fn parent(mut self, column: &str, parent_object_type: &str) -> Self {
        self.parent_id_column = Some(column.to_string());
        self.parent_object_type = Some(parent_object_type.to_string());
        self
    }

    pub fn site_id_column(mut self, column: &str) -> Self {
        self.site_id_column = Some(column.to_string());
        self
    }

    pub fn group_id_column(mut self, column: &str) -> Self {
        self.group_id_column = Some(column.to_string());
        self
    }

    pub fn last_modified_column(mut self, column: &str) -> Self {
        self.last_modified_column = Some(column.to_string());
        self
    }

    pub fn order_column(mut self, column: &str) -> Self {
        self.order_column = Some(column.to_string());
        self
    }

    pub fn id_path_column(mut self, column: &str) -> Self {
        self.id_path_column = Some(column.to_string());
        self
    }

    pub fn name_path_column(mut self, column: &str) -> Self {
        self.name_path_column = Some(column.to_string());
        self
    }

    pub fn level_column(mut self, column: &str) -> Self {
        self.level_column = Some(column.to_string());
        self
    }

    pub fn dependency(mut self, dependency: ObjectDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn license_feature(mut self, feature: &str) -> Self {
        self.license_feature = Some(feature.to_string());
        self
    }

    pub fn localizable_column(mut self, column: &str) -> Self {
        self.localizable_columns.push(column.to_string());
        self
    }

    /// Columns identifying a row of a type without an identifier column.
    pub fn with_natural_key(mut self, columns: &[&str]) -> Self {
        self.natural_key_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn configure_flags(mut self, configure: impl FnOnce(&mut TypeFlags)) -> Self {
        configure(&mut self.flags);
        self
    }

    /// Mark as an association type; `parent_column` is the owning side.
    pub fn binding(mut self, parent_column: &str, parent_object_type: &str) -> Self {
        self.flags.is_binding = true;
        self.parent(parent_column, parent_object_type)
    }

    pub fn site_binding(mut self) -> Self {
        self.flags.is_site_binding = true;
        self
    }

    pub fn supports_upsert(mut self) -> Self {
        self.flags.supports_upsert = true;
        self
    }

    pub fn supports_locking(mut self) -> Self {
        self.flags.supports_locking = true;
        self
    }

    pub fn order_alphabetically(mut self) -> Self {
        self.flags.order_alphabetically = true;
        self
    }

    pub fn with_metafiles(mut self) -> Self {
        self.flags.has_metafiles = true;
        self
    }

    pub fn with_external_columns<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Vec<ExternalColumnSetting> + Send + Sync + 'static,
    {
        self.external_columns_factory = Some(Arc::new(factory));
        self
    }

    pub fn with_property(mut self, name: &str, accessor: PropertyAccessor) -> Self {
        self.custom_properties.push(PropertyDefinition::new(name, accessor));
        self
    }

    /// Extra callback run after `column` is written.
    pub fn clear_cache_on<F>(mut self, column: &str, callback: F) -> Self
    where
        F: Fn(&mut crate::info::InfoObject) + Send + Sync + 'static,
    {
        self.custom_clear_cache
            .push((column.to_string(), Arc::new(callback)));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.object_type.trim().is_empty() {
            return Err(InfoError::Validation("Object type name is empty".to_string()));
        }

        for column in self.role_columns() {
            if !self.schema.contains(column) {
                return Err(InfoError::ColumnNotFound(
                    column.to_string(),
                    self.object_type.clone(),
                ));
            }
        }

        if let Some(id) = &self.id_column
            && self.schema.get_column(id).map(|c| &c.data_type) != Some(&DataType::Integer)
        {
            return Err(InfoError::Validation(format!(
                "Identifier column '{}' of '{}' must be INTEGER",
                id, self.object_type
            )));
        }

        if self.flags.is_binding && self.id_column.is_some() {
            return Err(InfoError::Validation(format!(
                "Binding type '{}' must not declare an identifier column",
                self.object_type
            )));
        }

        if self.id_column.is_none() && self.natural_key().is_empty() {
            return Err(InfoError::Validation(format!(
                "Type '{}' has neither an identifier column nor a natural key",
                self.object_type
            )));
        }

        Ok(())
    }

    fn role_columns(&self) -> Vec<&str> {
        let roles = [
            &self.id_column,
            &self.guid_column,
            &self.version_guid_column,
            &self.code_name_column,
            &self.display_name_column,
            &self.parent_id_column,
            &self.site_id_column,
            &self.group_id_column,
            &self.last_modified_column,
            &self.order_column,
            &self.id_path_column,
            &self.name_path_column,
            &self.level_column,
        ];
        roles
            .into_iter()
            .flatten()
            .map(String::as_str)
            .chain(self.dependencies.iter().map(|d| d.column.as_str()))
            .chain(self.localizable_columns.iter().map(String::as_str))
            .chain(self.natural_key_columns.iter().map(String::as_str))
            .collect()
    }

    pub fn has_id_column(&self) -> bool {
        self.id_column.is_some()
    }

    pub fn is(&self, object_type: &str) -> bool {
        self.object_type.eq_ignore_ascii_case(object_type)
    }

    /// Parent, site, group and declared dependency columns.
    pub fn is_foreign_key(&self, column: &str) -> bool {
        let is_column = |c: &Option<String>| c.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(column));
        is_column(&self.parent_id_column)
            || is_column(&self.site_id_column)
            || is_column(&self.group_id_column)
            || self
                .dependencies
                .iter()
                .any(|d| d.column.eq_ignore_ascii_case(column))
    }

    /// Object type referenced by a foreign-key column, when known.
    pub fn foreign_key_target(&self, column: &str) -> Option<&str> {
        if self
            .parent_id_column
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(column))
        {
            return self.parent_object_type.as_deref();
        }
        self.dependencies
            .iter()
            .find(|d| d.column.eq_ignore_ascii_case(column))
            .map(|d| d.target_type.as_str())
    }

    pub fn is_parent_column(&self, column: &str) -> bool {
        self.parent_id_column
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(column))
    }

    /// Parent points back at this same type (tree of one type).
    pub fn is_self_hierarchical(&self) -> bool {
        self.parent_object_type
            .as_deref()
            .is_some_and(|p| self.is(p))
    }

    pub fn has_hierarchy_paths(&self) -> bool {
        self.id_path_column.is_some() || self.name_path_column.is_some()
    }

    /// Columns scoping a sibling group: parent, site and group.
    pub fn sibling_scope_columns(&self) -> Vec<&str> {
        [&self.parent_id_column, &self.site_id_column, &self.group_id_column]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Explicit natural key, or parent + site + group + dependency columns.
    pub fn natural_key(&self) -> Vec<&str> {
        if !self.natural_key_columns.is_empty() {
            return self.natural_key_columns.iter().map(String::as_str).collect();
        }
        let mut columns = self.sibling_scope_columns();
        for dependency in &self.dependencies {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(&dependency.column)) {
                columns.push(dependency.column.as_str());
            }
        }
        columns
    }

    pub fn external_columns(&self) -> Result<Arc<ExternalColumns>> {
        EXTERNAL_COLUMNS.get_or_build(self.key, || match &self.external_columns_factory {
            Some(factory) => ExternalColumns::new(factory()),
            None => ExternalColumns::default(),
        })
    }

    pub fn has_external_columns(&self) -> bool {
        self.external_columns_factory.is_some()
    }

    pub fn property_table(&self) -> Result<Arc<PropertyTable>> {
        PROPERTY_TABLES.get_or_build(self.key, || PropertyTable::build(self, &self.custom_properties))
    }

    pub fn clear_cache_table(&self) -> Result<Arc<ClearCacheTable>> {
        CLEAR_CACHE_TABLES.get_or_build(self.key, || ClearCacheTable::build(self, &self.custom_clear_cache))
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("object_type", &self.object_type)
            .field("columns", &self.schema.column_count())
            .field("id_column", &self.id_column)
            .field("parent_object_type", &self.parent_object_type)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
