use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::core::{Record, Result};

/// LRU cache of stored rows keyed by (lowercase type, id).
pub struct ObjectCache {
    entries: Mutex<LruCache<(String, i64), Record>>,
}

impl ObjectCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, object_type: &str, id: i64) -> Result<Option<Record>> {
        Ok(self
            .entries
            .lock()?
            .get(&(object_type.to_ascii_lowercase(), id))
            .cloned())
    }

    pub fn put(&self, object_type: &str, id: i64, record: Record) -> Result<()> {
        self.entries
            .lock()?
            .put((object_type.to_ascii_lowercase(), id), record);
        Ok(())
    }

    pub fn remove(&self, object_type: &str, id: i64) -> Result<()> {
        self.entries
            .lock()?
            .pop(&(object_type.to_ascii_lowercase(), id));
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.entries.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
