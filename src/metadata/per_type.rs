use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::core::Result;

/// Lazily built, process-lifetime table per object type.
///
/// Lookups take the read lock only. A missing slot is inserted under the
/// write lock (checked again there), and the table itself is built outside
/// the map lock inside the slot's `OnceCell`, so concurrent first accesses of
/// one type build once while different types never wait on each other.
pub struct PerTypeCache<T> {
    slots: RwLock<HashMap<u64, Arc<OnceCell<Arc<T>>>>>,
}

impl<T> PerTypeCache<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_build<F>(&self, type_key: u64, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> T,
    {
        let existing = self.slots.read()?.get(&type_key).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut slots = self.slots.write()?;
                slots
                    .entry(type_key)
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            }
        };

        Ok(slot.get_or_init(|| Arc::new(build())).clone())
    }

    pub fn is_built(&self, type_key: u64) -> bool {
        self.slots
            .read()
            .map(|slots| slots.get(&type_key).is_some_and(|slot| slot.get().is_some()))
            .unwrap_or(false)
    }

    pub fn invalidate(&self, type_key: u64) -> Result<()> {
        self.slots.write()?.remove(&type_key);
        Ok(())
    }
}

impl<T> Default for PerTypeCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_concurrent_first_access_builds_once() {
        let cache: Arc<PerTypeCache<Vec<u32>>> = Arc::new(PerTypeCache::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let builds = builds.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_build(42, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            vec![1, 2, 3]
                        })
                        .unwrap()
                })
            })
            .collect();

        let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
    }

    #[test]
    fn test_types_are_built_independently() {
        let cache: PerTypeCache<&'static str> = PerTypeCache::new();
        let a = cache.get_or_build(1, || "first").unwrap();
        let b = cache.get_or_build(2, || "second").unwrap();
        assert_eq!(*a, "first");
        assert_eq!(*b, "second");
        assert!(cache.is_built(1));

        cache.invalidate(1).unwrap();
        assert!(!cache.is_built(1));
        assert_eq!(*cache.get_or_build(1, || "rebuilt").unwrap(), "rebuilt");
    }
}
