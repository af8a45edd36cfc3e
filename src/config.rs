use serde::{Deserialize, Serialize};

use crate::core::{InfoError, Result};

/// Line ending that externally stored text is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }

    /// Rewrites every `\r\n`, lone `\r` and `\n` to this line ending.
    pub fn normalize(&self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        match self {
            Self::Lf => unified,
            Self::CrLf => unified.replace('\n', "\r\n"),
        }
    }
}

/// Engine configuration
///
/// Every field has a default, so a partial JSON document is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of zero-padded identifier segments in ID paths.
    pub id_path_padding: usize,

    /// Maximum length of generated code names.
    pub code_name_max_length: usize,

    /// How many numeric suffixes the unique name generators try.
    pub unique_name_attempts: usize,

    /// Line ending used for text written to external storage.
    pub line_ending: LineEnding,

    /// Whether external column settings are honored at all.
    pub external_storage_enabled: bool,

    /// Remove the previous backing file when an external column's path changes.
    pub delete_unused_external_files: bool,

    /// Capacity of the object lookup cache.
    pub object_cache_capacity: usize,

    /// Default cap for dependency lookups.
    pub dependency_check_top: Option<usize>,

    /// Write a single audit entry per clone operation.
    pub audit_clones: bool,

    /// Domain name passed to license checks.
    pub license_domain: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_path_padding: 6,
            code_name_max_length: 100,
            unique_name_attempts: 10_000,
            line_ending: LineEnding::Lf,
            external_storage_enabled: true,
            delete_unused_external_files: true,
            object_cache_capacity: 1_000,
            dependency_check_top: Some(10),
            audit_clones: true,
            license_domain: "localhost".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| InfoError::Serialization(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_path_padding == 0 {
            return Err(InfoError::Validation(
                "id_path_padding must be at least 1".to_string(),
            ));
        }
        if self.code_name_max_length < 2 {
            return Err(InfoError::Validation(
                "code_name_max_length must be at least 2".to_string(),
            ));
        }
        if self.object_cache_capacity == 0 {
            return Err(InfoError::Validation(
                "object_cache_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the ID path segment width
    pub fn id_path_padding(mut self, width: usize) -> Self {
        self.id_path_padding = width;
        self
    }

    /// Set the maximum code name length
    pub fn code_name_max_length(mut self, length: usize) -> Self {
        self.code_name_max_length = length;
        self
    }

    /// Set the line ending for external text
    pub fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Enable or disable external column storage
    pub fn external_storage_enabled(mut self, enabled: bool) -> Self {
        self.external_storage_enabled = enabled;
        self
    }

    /// Delete stale external files when their path changes
    pub fn delete_unused_external_files(mut self, enabled: bool) -> Self {
        self.delete_unused_external_files = enabled;
        self
    }

    /// Set the object cache capacity
    pub fn object_cache_capacity(mut self, capacity: usize) -> Self {
        self.object_cache_capacity = capacity;
        self
    }

    /// Set the default dependency lookup cap
    pub fn dependency_check_top(mut self, top: Option<usize>) -> Self {
        self.dependency_check_top = top;
        self
    }

    /// Enable or disable clone audit entries
    pub fn audit_clones(mut self, enabled: bool) -> Self {
        self.audit_clones = enabled;
        self
    }

    /// Set the license domain
    pub fn license_domain(mut self, domain: &str) -> Self {
        self.license_domain = domain.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "id_path_padding": 8 }"#).unwrap();
        assert_eq!(config.id_path_padding, 8);
        assert_eq!(config.code_name_max_length, 100);
        assert_eq!(config.line_ending, LineEnding::Lf);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(EngineConfig::from_json_str(r#"{ "id_path_padding": 0 }"#).is_err());
        assert!(EngineConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_line_ending_normalization() {
        assert_eq!(LineEnding::Lf.normalize("a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(LineEnding::CrLf.normalize("a\nb\r\n"), "a\r\nb\r\n");
    }
}
