use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use log::warn;
use tracing::{Level, event};

use crate::core::Result;
use crate::services::{CacheService, ChangeNotifier, Notification};

#[derive(Default)]
struct BatchState {
    depth: usize,
    seen: HashSet<String>,
    pending: Vec<Notification>,
    touched_seen: HashSet<String>,
    touched: Vec<String>,
    sink: Option<Arc<dyn ChangeNotifier>>,
    cache: Option<Arc<dyn CacheService>>,
}

/// What the outermost scope hands over when it ends.
struct Flush {
    pending: Vec<Notification>,
    touched: Vec<String>,
    sink: Arc<dyn ChangeNotifier>,
    cache: Arc<dyn CacheService>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Re-entrant scope collecting change notifications and cache touches raised
/// on this thread.
///
/// Notifications are deduplicated by key and kept in first-seen order; so are
/// touched cache keys. The outermost scope applies the touches to its cache and
/// then delivers the notifications once each to its sink when
/// [`finish`](Self::finish) is called; dropping the outermost scope without
/// finishing discards both.
pub struct CloneBatchScope {
    finished: bool,
}

impl CloneBatchScope {
    pub fn enter(sink: Arc<dyn ChangeNotifier>, cache: Arc<dyn CacheService>) -> Self {
        BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            if batch.depth == 0 {
                batch.sink = Some(sink);
                batch.cache = Some(cache);
            }
            batch.depth += 1;
        });
        Self { finished: false }
    }

    pub fn is_active() -> bool {
        BATCH.with(|batch| batch.borrow().depth > 0)
    }

    /// Nesting depth on this thread; 0 outside any scope.
    pub fn depth() -> usize {
        BATCH.with(|batch| batch.borrow().depth)
    }

    /// Retains `notification` when a scope is active; `false` otherwise.
    pub fn enqueue(notification: &Notification) -> bool {
        BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            if batch.depth == 0 {
                return false;
            }
            if batch.seen.insert(notification.key.clone()) {
                batch.pending.push(notification.clone());
            }
            true
        })
    }

    /// Retains cache keys to touch when a scope is active; `false` otherwise.
    pub fn enqueue_touch(keys: &[String]) -> bool {
        BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            if batch.depth == 0 {
                return false;
            }
            for key in keys {
                if batch.touched_seen.insert(key.to_ascii_lowercase()) {
                    batch.touched.push(key.clone());
                }
            }
            true
        })
    }

    pub fn pending_count() -> usize {
        BATCH.with(|batch| batch.borrow().pending.len())
    }

    /// Leaves the scope; the outermost one flushes.
    ///
    /// Delivery failures are logged and dropped, except aborts.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        let Some(flush) = leave() else {
            return Ok(());
        };

        event!(
            Level::DEBUG,
            notifications = flush.pending.len(),
            touched = flush.touched.len(),
            "flushing clone batch"
        );
        if !flush.touched.is_empty() {
            match flush.cache.touch_keys(&flush.touched) {
                Err(err) if err.is_abort() => return Err(err),
                Err(err) => warn!("Touching batched cache keys failed: {}", err),
                Ok(()) => {}
            }
        }
        for notification in &flush.pending {
            match flush.sink.notify(notification) {
                Err(err) if err.is_abort() => return Err(err),
                Err(err) => warn!("Batched notification '{}' failed: {}", notification.key, err),
                Ok(()) => {}
            }
        }
        Ok(())
    }
}

/// Decrements the depth; returns the queues when the outermost scope ends.
fn leave() -> Option<Flush> {
    BATCH.with(|batch| {
        let mut batch = batch.borrow_mut();
        batch.depth = batch.depth.saturating_sub(1);
        if batch.depth > 0 {
            return None;
        }
        batch.seen.clear();
        batch.touched_seen.clear();
        let pending = std::mem::take(&mut batch.pending);
        let touched = std::mem::take(&mut batch.touched);
        match (batch.sink.take(), batch.cache.take()) {
            (Some(sink), Some(cache)) => Some(Flush {
                pending,
                touched,
                sink,
                cache,
            }),
            _ => None,
        }
    })
}

impl Drop for CloneBatchScope {
    fn drop(&mut self) {
        if !self.finished
            && let Some(flush) = leave()
            && !(flush.pending.is_empty() && flush.touched.is_empty())
        {
            event!(
                Level::DEBUG,
                notifications = flush.pending.len(),
                touched = flush.touched.len(),
                "clone batch discarded"
            );
        }
    }
}
