use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::status::LifecycleOperation;
use super::InfoObject;
use crate::core::Result;
use crate::session::InfoSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Continue,
    Cancel,
}

pub type BeforeHandler =
    Arc<dyn Fn(&mut InfoObject, &InfoSession) -> Result<EventOutcome> + Send + Sync>;
pub type AfterHandler = Arc<dyn Fn(&InfoObject, &InfoSession) -> Result<()> + Send + Sync>;

const ANY_TYPE: &str = "*";

#[derive(Default)]
struct HandlerLists {
    before: HashMap<(String, LifecycleOperation), Vec<BeforeHandler>>,
    after: HashMap<(String, LifecycleOperation), Vec<AfterHandler>>,
}

/// Ordered before/after handler lists per (object type, operation).
///
/// Handlers run synchronously in registration order; the first `Cancel`
/// stops the remaining "before" handlers and the operation itself.
#[derive(Default)]
pub struct EventRegistry {
    lists: RwLock<HandlerLists>,
}

impl EventRegistry {
    pub fn on_before<F>(&self, object_type: &str, operation: LifecycleOperation, handler: F) -> Result<()>
    where
        F: Fn(&mut InfoObject, &InfoSession) -> Result<EventOutcome> + Send + Sync + 'static,
    {
        self.lists
            .write()?
            .before
            .entry((object_type.to_ascii_lowercase(), operation))
            .or_default()
            .push(Arc::new(handler));
        Ok(())
    }

    pub fn on_after<F>(&self, object_type: &str, operation: LifecycleOperation, handler: F) -> Result<()>
    where
        F: Fn(&InfoObject, &InfoSession) -> Result<()> + Send + Sync + 'static,
    {
        self.lists
            .write()?
            .after
            .entry((object_type.to_ascii_lowercase(), operation))
            .or_default()
            .push(Arc::new(handler));
        Ok(())
    }

    /// Handler for every object type.
    pub fn on_before_any<F>(&self, operation: LifecycleOperation, handler: F) -> Result<()>
    where
        F: Fn(&mut InfoObject, &InfoSession) -> Result<EventOutcome> + Send + Sync + 'static,
    {
        self.on_before(ANY_TYPE, operation, handler)
    }

    pub fn on_after_any<F>(&self, operation: LifecycleOperation, handler: F) -> Result<()>
    where
        F: Fn(&InfoObject, &InfoSession) -> Result<()> + Send + Sync + 'static,
    {
        self.on_after(ANY_TYPE, operation, handler)
    }

    fn before_handlers(&self, object_type: &str, operation: LifecycleOperation) -> Result<Vec<BeforeHandler>> {
        let lists = self.lists.read()?;
        let mut handlers = Vec::new();
        for key in [ANY_TYPE.to_string(), object_type.to_ascii_lowercase()] {
            if let Some(list) = lists.before.get(&(key, operation)) {
                handlers.extend(list.iter().cloned());
            }
        }
        Ok(handlers)
    }

    fn after_handlers(&self, object_type: &str, operation: LifecycleOperation) -> Result<Vec<AfterHandler>> {
        let lists = self.lists.read()?;
        let mut handlers = Vec::new();
        for key in [ANY_TYPE.to_string(), object_type.to_ascii_lowercase()] {
            if let Some(list) = lists.after.get(&(key, operation)) {
                handlers.extend(list.iter().cloned());
            }
        }
        Ok(handlers)
    }

    pub fn run_before(
        &self,
        object: &mut InfoObject,
        session: &InfoSession,
        operation: LifecycleOperation,
    ) -> Result<EventOutcome> {
        let object_type = object.object_type().to_string();
        for handler in self.before_handlers(&object_type, operation)? {
            if handler(object, session)? == EventOutcome::Cancel {
                return Ok(EventOutcome::Cancel);
            }
        }
        Ok(EventOutcome::Continue)
    }

    pub fn run_after(&self, object: &InfoObject, session: &InfoSession, operation: LifecycleOperation) -> Result<()> {
        for handler in self.after_handlers(object.object_type(), operation)? {
            handler(object, session)?;
        }
        Ok(())
    }
}
