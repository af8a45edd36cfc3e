use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::Result;

lazy_static! {
    static ref MACRO_PATTERN: Regex = Regex::new(r"^\{\$\s*([^{}$]+?)\s*\$\}$").expect("valid macro pattern");
}

/// Whole-value localization macro such as `{$general.ok$}`.
pub fn is_localization_macro(text: &str) -> bool {
    MACRO_PATTERN.is_match(text.trim())
}

/// Resource key of a localization macro.
pub fn macro_key(text: &str) -> Option<&str> {
    MACRO_PATTERN
        .captures(text.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Resolves localization macros to text.
pub trait Localizer: Send + Sync {
    fn localize(&self, key: &str, culture: Option<&str>) -> Result<Option<String>>;

    /// Replaces a whole-value macro by its resolved text; other values pass through.
    fn resolve(&self, text: &str, culture: Option<&str>) -> Result<String> {
        match macro_key(text) {
            Some(key) => Ok(self.localize(key, culture)?.unwrap_or_else(|| key.to_string())),
            None => Ok(text.to_string()),
        }
    }
}

/// Resource strings held in a map, keyed case-insensitively.
#[derive(Debug, Default)]
pub struct MapLocalizer {
    strings: RwLock<HashMap<String, String>>,
}

impl MapLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, text: &str) -> Result<()> {
        self.strings
            .write()?
            .insert(key.to_ascii_lowercase(), text.to_string());
        Ok(())
    }
}

impl Localizer for MapLocalizer {
    fn localize(&self, key: &str, _culture: Option<&str>) -> Result<Option<String>> {
        Ok(self.strings.read()?.get(&key.to_ascii_lowercase()).cloned())
    }
}
