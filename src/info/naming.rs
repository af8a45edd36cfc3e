use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::InfoObject;
use crate::core::{InfoError, Result, Value};
use crate::session::InfoSession;
use crate::storage::{Query, WhereCondition};

lazy_static! {
    static ref CODE_NAME_INVALID: Regex = Regex::new(r"[^A-Za-z0-9_.\-]+").expect("valid code name pattern");
    static ref REPEATED_UNDERSCORE: Regex = Regex::new(r"_{2,}").expect("valid underscore pattern");
    static ref CODE_NAME_SUFFIX: Regex = Regex::new(r"^(.*)_(\d+)$").expect("valid suffix pattern");
    static ref DISPLAY_NAME_SUFFIX: Regex = Regex::new(r"^(.*) \((\d+)\)$").expect("valid suffix pattern");
}

/// Turns free text into a code name: invalid characters become `_`.
pub fn sanitize_code_name(text: &str, max_length: usize) -> String {
    let replaced = CODE_NAME_INVALID.replace_all(text.trim(), "_");
    let collapsed = REPEATED_UNDERSCORE.replace_all(&replaced, "_");
    truncate(collapsed.trim_matches('_'), max_length)
}

fn truncate(text: &str, max_length: usize) -> String {
    text.chars().take(max_length).collect()
}

/// `Page_3` → `Page`; names without a numeric suffix are returned as is.
fn strip_suffix<'a>(name: &'a str, pattern: &Regex) -> &'a str {
    pattern
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(name)
}

/// First candidate from `base` not contained in `taken` (lowercase).
fn first_free<F>(base: &str, taken: &HashSet<String>, attempts: usize, max_length: Option<usize>, pattern: &Regex, format: F) -> Result<String>
where
    F: Fn(&str, usize) -> String,
{
    let base = match max_length {
        Some(max) => truncate(base, max),
        None => base.to_string(),
    };
    if !taken.contains(&base.to_lowercase()) {
        return Ok(base);
    }

    let stem = strip_suffix(&base, pattern);
    for n in 1..=attempts {
        let suffix_len = format("", n).chars().count();
        let stem = match max_length {
            Some(max) => truncate(stem, max.saturating_sub(suffix_len)),
            None => stem.to_string(),
        };
        let candidate = format(&stem, n);
        if !taken.contains(&candidate.to_lowercase()) {
            return Ok(candidate);
        }
    }

    Err(InfoError::Validation(format!(
        "No unique name found for '{}' after {} attempts",
        base, attempts
    )))
}

impl InfoObject {
    /// Rows sharing this object's parent, site and group.
    pub(crate) fn sibling_scope(&self) -> Result<WhereCondition> {
        let mut condition = WhereCondition::All;
        for column in self.type_info().sibling_scope_columns() {
            let value = self.get_stored_value(column)?;
            condition = condition.and(match value.as_id() {
                Some(_) => WhereCondition::Eq(column.to_string(), value),
                None => WhereCondition::is_null(column),
            });
        }
        Ok(condition)
    }

    /// Sibling scope excluding this object.
    pub(crate) fn sibling_condition(&self) -> Result<WhereCondition> {
        let mut condition = self.sibling_scope()?;
        if let (Some(id_column), Some(id)) = (&self.type_info().id_column, self.object_id()?) {
            condition = condition.and(WhereCondition::NotEq(id_column.clone(), Value::Integer(id)));
        }
        Ok(condition)
    }

    fn taken_names(&self, session: &InfoSession, column: &str) -> Result<HashSet<String>> {
        let query = Query::filter(self.sibling_condition()?).columns(&[column]);
        Ok(session
            .provider()
            .select(self.object_type(), &query)?
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_str).map(str::to_lowercase))
            .collect())
    }

    /// `base`, or `base_N` with the first free N among the siblings.
    pub fn get_unique_code_name(&self, session: &InfoSession, base: &str) -> Result<String> {
        let Some(column) = self.type_info().code_name_column.clone() else {
            return Ok(base.to_string());
        };
        let config = session.config();
        let taken = self.taken_names(session, &column)?;
        first_free(
            base,
            &taken,
            config.unique_name_attempts,
            Some(config.code_name_max_length),
            &CODE_NAME_SUFFIX,
            |stem, n| format!("{}_{}", stem, n),
        )
    }

    /// `base`, or `base (N)` with the first free N among the siblings.
    pub fn get_unique_display_name(&self, session: &InfoSession, base: &str) -> Result<String> {
        let Some(column) = self.type_info().display_name_column.clone() else {
            return Ok(base.to_string());
        };
        let taken = self.taken_names(session, &column)?;
        first_free(
            base,
            &taken,
            session.config().unique_name_attempts,
            None,
            &DISPLAY_NAME_SUFFIX,
            |stem, n| format!("{} ({})", stem, n),
        )
    }

    /// Code name derived from the display name, unique among the siblings.
    pub fn generate_code_name(&self, session: &InfoSession) -> Result<String> {
        let source = self.display_name()?.unwrap_or_default();
        let mut base = sanitize_code_name(&source, session.config().code_name_max_length);
        if base.is_empty() {
            base = self
                .object_type()
                .rsplit('.')
                .next()
                .unwrap_or("object")
                .to_string();
        }
        self.get_unique_code_name(session, &base)
    }

    /// Fails when another sibling already uses this object's code name.
    pub(crate) fn check_unique_code_name(&self, session: &InfoSession) -> Result<()> {
        let (Some(column), Some(name)) = (self.type_info().code_name_column.clone(), self.code_name()?) else {
            return Ok(());
        };
        if self.taken_names(session, &column)?.contains(&name.to_lowercase()) {
            return Err(InfoError::Validation(format!(
                "Code name '{}' is already used by another '{}'",
                name,
                self.object_type()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_lowercase()).collect()
    }

    fn code(base: &str, names: &[&str]) -> String {
        first_free(base, &taken(names), 100, Some(20), &CODE_NAME_SUFFIX, |s, n| format!("{}_{}", s, n)).unwrap()
    }

    #[test]
    fn test_first_unused_suffix() {
        assert_eq!(code("Page", &["Page", "Page_1"]), "Page_2");
        assert_eq!(code("Page_1", &["Page", "Page_1"]), "Page_2");
        assert_eq!(code("About", &["Page", "Page_1"]), "About");
        assert_eq!(code("page", &["PAGE"]), "page_1");
    }

    #[test]
    fn test_suffix_respects_max_length() {
        let name = code("ABCDEFGHIJKLMNOPQRST", &["ABCDEFGHIJKLMNOPQRST"]);
        assert_eq!(name, "ABCDEFGHIJKLMNOPQR_1");
        assert_eq!(name.len(), 20);
    }

    #[test]
    fn test_display_name_suffix() {
        let name = first_free(
            "Home (1)",
            &taken(&["Home", "Home (1)"]),
            10,
            None,
            &DISPLAY_NAME_SUFFIX,
            |s, n| format!("{} ({})", s, n),
        )
        .unwrap();
        assert_eq!(name, "Home (2)");
    }

    #[test]
    fn test_exhausted_attempts_fail() {
        assert!(first_free("A", &taken(&["a", "a_1"]), 1, None, &CODE_NAME_SUFFIX, |s, n| format!("{}_{}", s, n)).is_err());
    }

    #[test]
    fn test_sanitize_code_name() {
        assert_eq!(sanitize_code_name("  My New Page! ", 100), "My_New_Page");
        assert_eq!(sanitize_code_name("a--b.c", 100), "a--b.c");
        assert_eq!(sanitize_code_name("***", 100), "");
        assert_eq!(sanitize_code_name("abcdef", 3), "abc");
    }
}
