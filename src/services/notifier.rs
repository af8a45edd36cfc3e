use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
    Cloned,
}

/// A "this object changed" signal for staging/sync consumers.
///
/// `key` identifies duplicates: two notifications with the same key describe
/// the same change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub key: String,
    pub object_type: String,
    pub object_id: Option<i64>,
    pub site_id: Option<i64>,
    pub action: ChangeAction,
}

impl Notification {
    pub fn new(object_type: &str, object_id: Option<i64>, action: ChangeAction) -> Self {
        let key = format!(
            "{}|{}|{:?}",
            object_type.to_ascii_lowercase(),
            object_id.unwrap_or(0),
            action
        );
        Self {
            key,
            object_type: object_type.to_string(),
            object_id,
            site_id: None,
            action,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_site(mut self, site_id: Option<i64>) -> Self {
        self.site_id = site_id;
        self
    }
}

pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the debug log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ChangeNotifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        debug!(key = %notification.key, action = ?notification.action, "change notification");
        Ok(())
    }
}

/// Records delivered notifications.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn count_with_key(&self, key: &str) -> usize {
        self.delivered().iter().filter(|n| n.key == key).count()
    }

    pub fn clear(&self) -> Result<()> {
        self.delivered.lock()?.clear();
        Ok(())
    }
}

impl ChangeNotifier for MemoryNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.delivered.lock()?.push(notification.clone());
        Ok(())
    }
}
