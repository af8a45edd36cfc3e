use std::collections::HashMap;
use std::sync::Arc;

use super::TypeInfo;
use crate::info::InfoObject;

pub type ClearCacheCallback = Arc<dyn Fn(&mut InfoObject) + Send + Sync>;

/// Callbacks run after a column write, keyed by lowercase column name.
#[derive(Default)]
pub struct ClearCacheTable {
    callbacks: HashMap<String, Vec<ClearCacheCallback>>,
}

impl ClearCacheTable {
    pub fn build(type_info: &TypeInfo, custom: &[(String, ClearCacheCallback)]) -> Self {
        let mut table = Self::default();

        if let Some(column) = &type_info.parent_id_column {
            table.add(column, Arc::new(|obj: &mut InfoObject| obj.clear_related("Parent")));
        }
        if let Some(column) = &type_info.site_id_column {
            table.add(column, Arc::new(|obj: &mut InfoObject| obj.clear_related("Site")));
        }
        if let Some(column) = &type_info.group_id_column {
            table.add(column, Arc::new(|obj: &mut InfoObject| obj.clear_related("Group")));
        }
        for dependency in &type_info.dependencies {
            let key = dependency.column.clone();
            table.add(
                &dependency.column,
                Arc::new(move |obj: &mut InfoObject| obj.clear_related(&key)),
            );
        }
        // Cached object settings are keyed by identity.
        if let Some(column) = &type_info.id_column {
            table.add(column, Arc::new(|obj: &mut InfoObject| obj.clear_settings_cache()));
        }

        for (column, callback) in custom {
            table.add(column, callback.clone());
        }

        table
    }

    fn add(&mut self, column: &str, callback: ClearCacheCallback) {
        self.callbacks
            .entry(column.to_ascii_lowercase())
            .or_default()
            .push(callback);
    }

    pub fn callbacks_for(&self, column: &str) -> Vec<ClearCacheCallback> {
        self.callbacks
            .get(&column.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.callbacks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
