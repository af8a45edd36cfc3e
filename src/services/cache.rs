use std::sync::Mutex;

use crate::core::Result;

/// Invalidates cached reads depending on the given keys.
pub trait CacheService: Send + Sync {
    fn touch_keys(&self, keys: &[String]) -> Result<()>;
}

/// Discards every touch.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl CacheService for NullCache {
    fn touch_keys(&self, _keys: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Records touched keys in order.
#[derive(Debug, Default)]
pub struct MemoryCache {
    touched: Mutex<Vec<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touched(&self) -> Vec<String> {
        self.touched.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn was_touched(&self, key: &str) -> bool {
        self.touched().iter().any(|k| k.eq_ignore_ascii_case(key))
    }
}

impl CacheService for MemoryCache {
    fn touch_keys(&self, keys: &[String]) -> Result<()> {
        self.touched.lock()?.extend(keys.iter().cloned());
        Ok(())
    }
}

/// Cache keys depending on a single object and on its type.
pub fn object_cache_keys(object_type: &str, id: Option<i64>, code_name: Option<&str>) -> Vec<String> {
    let object_type = object_type.to_ascii_lowercase();
    let mut keys = vec![format!("{}|all", object_type)];
    if let Some(id) = id {
        keys.push(format!("{}|byid|{}", object_type, id));
    }
    if let Some(name) = code_name.filter(|n| !n.is_empty()) {
        keys.push(format!("{}|byname|{}", object_type, name.to_ascii_lowercase()));
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_cache_keys() {
        assert_eq!(
            object_cache_keys("CMS.Page", Some(4), Some("Home")),
            vec!["cms.page|all", "cms.page|byid|4", "cms.page|byname|home"]
        );
    }
}
