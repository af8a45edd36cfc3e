use std::cell::RefCell;

/// Ambient switches for the operations running on the current thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    /// Write failure and audit entries to the event log.
    pub log_events: bool,
    /// Touch cache dependency keys after saves.
    pub touch_cache_dependencies: bool,
    /// Refresh the last-modified column on save.
    pub update_timestamp: bool,
    /// Raise change notifications.
    pub notify_changes: bool,
    pub user: Option<String>,
    pub culture: Option<String>,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self {
            log_events: true,
            touch_cache_dependencies: true,
            update_timestamp: true,
            notify_changes: true,
            user: None,
            culture: None,
        }
    }
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ActionContext>> = const { RefCell::new(Vec::new()) };
}

impl ActionContext {
    /// Context in effect on this thread.
    pub fn current() -> ActionContext {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// Starts from the current context; apply changes, then [`enter`](Self::enter).
    pub fn derive() -> ActionContext {
        Self::current()
    }

    pub fn log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn touch_cache_dependencies(mut self, enabled: bool) -> Self {
        self.touch_cache_dependencies = enabled;
        self
    }

    pub fn update_timestamp(mut self, enabled: bool) -> Self {
        self.update_timestamp = enabled;
        self
    }

    pub fn notify_changes(mut self, enabled: bool) -> Self {
        self.notify_changes = enabled;
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn culture(mut self, culture: &str) -> Self {
        self.culture = Some(culture.to_string());
        self
    }

    /// Makes this the current context until the guard is dropped.
    #[must_use = "the context is popped when the guard is dropped"]
    pub fn enter(self) -> ActionContextGuard {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(self);
            stack.len()
        });
        ActionContextGuard { depth }
    }
}

/// Restores the previous context on drop.
pub struct ActionContextGuard {
    depth: usize,
}

impl Drop for ActionContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().truncate(self.depth - 1));
    }
}
