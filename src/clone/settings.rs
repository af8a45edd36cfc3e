use std::collections::HashMap;

/// Old id → clone id per object type, accumulated over one recursive clone.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    ids: HashMap<(String, i64), i64>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, object_type: &str, old_id: i64, new_id: i64) {
        self.ids.insert((object_type.to_ascii_lowercase(), old_id), new_id);
    }

    pub fn translate(&self, object_type: &str, old_id: i64) -> Option<i64> {
        self.ids.get(&(object_type.to_ascii_lowercase(), old_id)).copied()
    }

    /// `true` when `id` is a clone created during this run.
    pub fn is_translated_target(&self, object_type: &str, id: i64) -> bool {
        let object_type = object_type.to_ascii_lowercase();
        self.ids
            .iter()
            .any(|((t, _), new_id)| *t == object_type && *new_id == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Options of one clone run. Child clones reuse the same instance.
#[derive(Debug, Clone)]
pub struct CloneSettings {
    /// New parent of the top-level clone.
    pub parent_id: Option<i64>,
    /// Target site for the clone and every descendant.
    pub site_id: Option<i64>,
    /// Child levels to clone: 0 none, negative unbounded.
    pub depth_limit: i32,
    pub include_children: bool,
    pub include_bindings: bool,
    pub include_site_bindings: bool,
    pub include_other_bindings: bool,
    pub include_metafiles: bool,
    /// Keep localization macros instead of resolving them.
    pub keep_translated: bool,
    /// Explicit code name of the top-level clone.
    pub code_name: Option<String>,
    /// Explicit display name of the top-level clone.
    pub display_name: Option<String>,
    pub exclude_types: Vec<String>,
    pub translations: TranslationTable,
}

impl Default for CloneSettings {
    fn default() -> Self {
        Self {
            parent_id: None,
            site_id: None,
            depth_limit: -1,
            include_children: true,
            include_bindings: true,
            include_site_bindings: true,
            include_other_bindings: true,
            include_metafiles: true,
            keep_translated: false,
            code_name: None,
            display_name: None,
            exclude_types: Vec::new(),
            translations: TranslationTable::new(),
        }
    }
}

impl CloneSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent_id(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn site_id(mut self, site_id: i64) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn depth_limit(mut self, depth_limit: i32) -> Self {
        self.depth_limit = depth_limit;
        self
    }

    pub fn include_children(mut self, include: bool) -> Self {
        self.include_children = include;
        self
    }

    pub fn include_bindings(mut self, include: bool) -> Self {
        self.include_bindings = include;
        self
    }

    pub fn include_site_bindings(mut self, include: bool) -> Self {
        self.include_site_bindings = include;
        self
    }

    pub fn include_other_bindings(mut self, include: bool) -> Self {
        self.include_other_bindings = include;
        self
    }

    pub fn include_metafiles(mut self, include: bool) -> Self {
        self.include_metafiles = include;
        self
    }

    pub fn keep_translated(mut self, keep: bool) -> Self {
        self.keep_translated = keep;
        self
    }

    pub fn code_name(mut self, code_name: &str) -> Self {
        self.code_name = Some(code_name.to_string());
        self
    }

    pub fn display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }

    pub fn exclude_type(mut self, object_type: &str) -> Self {
        self.exclude_types.push(object_type.to_string());
        self
    }

    pub fn is_excluded(&self, object_type: &str) -> bool {
        self.exclude_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(object_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonedObject {
    pub object_type: String,
    pub source_id: Option<i64>,
    pub clone_id: Option<i64>,
}

/// What a clone run produced.
#[derive(Debug, Clone, Default)]
pub struct CloneResult {
    /// Skipped child types and other notes.
    pub messages: Vec<String>,
    pub cloned: Vec<ClonedObject>,
}

impl CloneResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cloned_count(&self) -> usize {
        self.cloned.len()
    }

    pub fn clones_of_type(&self, object_type: &str) -> Vec<&ClonedObject> {
        self.cloned
            .iter()
            .filter(|c| c.object_type.eq_ignore_ascii_case(object_type))
            .collect()
    }

    pub(crate) fn record(&mut self, object_type: &str, source_id: Option<i64>, clone_id: Option<i64>) {
        self.cloned.push(ClonedObject {
            object_type: object_type.to_string(),
            source_id,
            clone_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_table_is_case_insensitive() {
        let mut table = TranslationTable::new();
        table.register("CMS.Page", 4, 9);
        assert_eq!(table.translate("cms.page", 4), Some(9));
        assert_eq!(table.translate("cms.page", 5), None);
        assert!(table.is_translated_target("cms.PAGE", 9));
        assert!(!table.is_translated_target("cms.page", 4));
    }

    #[test]
    fn test_default_settings() {
        let settings = CloneSettings::new().exclude_type("cms.tag");
        assert_eq!(settings.depth_limit, -1);
        assert!(settings.include_children && settings.include_metafiles);
        assert!(settings.is_excluded("CMS.Tag"));
        assert!(!settings.keep_translated);
    }
}
