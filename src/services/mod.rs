//! Collaborators the engine calls out to: audit log, cache, security,
//! change notification and localization.

pub mod cache;
pub mod context;
pub mod event_log;
pub mod localizer;
pub mod notifier;
pub mod object_cache;
pub mod security;

pub use cache::{CacheService, MemoryCache, NullCache, object_cache_keys};
pub use context::{ActionContext, ActionContextGuard};
pub use event_log::{EventLog, LogEntry, MemoryEventLog, Severity, TracingEventLog};
pub use localizer::{Localizer, MapLocalizer, is_localization_macro, macro_key};
pub use notifier::{ChangeAction, ChangeNotifier, MemoryNotifier, Notification, TracingNotifier};
pub use object_cache::ObjectCache;
pub use security::{AllowAll, FeatureLicense, LicenseService, Permission, PermissionService, PermissionTable};
