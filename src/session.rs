use std::sync::Arc;

use log::warn;
use uuid::Uuid;

use crate::clone::CloneBatchScope;
use crate::config::EngineConfig;
use crate::core::{InfoError, Record, Result, Value};
use crate::external::{MemoryFileStorage, StorageProvider};
use crate::info::events::EventRegistry;
use crate::info::object::ExternalBinding;
use crate::info::{InfoObject, InfoSnapshot};
use crate::metadata::{TypeInfo, TypeRegistry};
use crate::services::{
    ActionContext, AllowAll, CacheService, ChangeNotifier, EventLog, LicenseService, Localizer,
    MapLocalizer, Notification, NullCache, ObjectCache, Permission, PermissionService, Severity,
    TracingEventLog, TracingNotifier,
};
use crate::storage::{DataProvider, InMemoryProvider, Query, TransactionScope, WhereCondition};

/// Bundle of collaborators every lifecycle, hierarchy and clone operation runs against.
pub struct InfoSession {
    registry: Arc<TypeRegistry>,
    provider: Arc<dyn DataProvider>,
    files: Arc<dyn StorageProvider>,
    event_log: Arc<dyn EventLog>,
    cache: Arc<dyn CacheService>,
    permissions: Arc<dyn PermissionService>,
    license: Arc<dyn LicenseService>,
    notifier: Arc<dyn ChangeNotifier>,
    localizer: Arc<dyn Localizer>,
    object_cache: ObjectCache,
    events: EventRegistry,
    config: EngineConfig,
}

impl InfoSession {
    pub fn builder() -> InfoSessionBuilder {
        InfoSessionBuilder::default()
    }

    /// In-memory session over `registry` with default collaborators.
    pub fn in_memory(registry: Arc<TypeRegistry>) -> Self {
        let config = EngineConfig::default();
        Self {
            registry,
            provider: Arc::new(InMemoryProvider::new()),
            files: Arc::new(MemoryFileStorage::new()),
            event_log: Arc::new(TracingEventLog),
            cache: Arc::new(NullCache),
            permissions: Arc::new(AllowAll),
            license: Arc::new(AllowAll),
            notifier: Arc::new(TracingNotifier),
            localizer: Arc::new(MapLocalizer::new()),
            object_cache: ObjectCache::new(config.object_cache_capacity),
            events: EventRegistry::default(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn DataProvider> {
        &self.provider
    }

    pub fn files(&self) -> &Arc<dyn StorageProvider> {
        &self.files
    }

    pub fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.event_log
    }

    pub fn localizer(&self) -> &Arc<dyn Localizer> {
        &self.localizer
    }

    pub fn notifier(&self) -> &Arc<dyn ChangeNotifier> {
        &self.notifier
    }

    pub fn cache(&self) -> &Arc<dyn CacheService> {
        &self.cache
    }

    pub fn object_cache(&self) -> &ObjectCache {
        &self.object_cache
    }

    /// Handlers registered for this session only.
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn type_info(&self, object_type: &str) -> Result<Arc<TypeInfo>> {
        self.registry.get_type_info(object_type)
    }

    /// Begins a (possibly nested) transaction scope.
    pub fn transaction(&self) -> Result<TransactionScope> {
        TransactionScope::begin(self.provider.clone())
    }

    pub(crate) fn external_binding(&self) -> Option<ExternalBinding> {
        self.config.external_storage_enabled.then(|| ExternalBinding {
            files: self.files.clone(),
            line_ending: self.config.line_ending,
            delete_unused_files: self.config.delete_unused_external_files,
        })
    }

    pub(crate) fn attach(&self, mut object: InfoObject) -> InfoObject {
        if let Some(binding) = self.external_binding() {
            object.attach_external(binding);
        }
        object
    }

    /// New unsaved instance of `object_type`.
    pub fn new_object(&self, object_type: &str) -> Result<InfoObject> {
        let type_info = self.type_info(object_type)?;
        Ok(self.attach(InfoObject::new(type_info)))
    }

    pub fn object_from_record(&self, type_info: Arc<TypeInfo>, record: &Record) -> InfoObject {
        self.attach(InfoObject::from_record(type_info, record))
    }

    /// Rebuilds a snapshot against this session's registry, reading external
    /// columns through its file storage.
    pub fn restore_snapshot(&self, snapshot: &InfoSnapshot) -> Result<InfoObject> {
        Ok(self.attach(InfoObject::from_snapshot(&self.registry, snapshot)?))
    }

    pub fn get_object(&self, object_type: &str, id: i64) -> Result<Option<InfoObject>> {
        let type_info = self.type_info(object_type)?;
        let Some(id_column) = type_info.id_column.clone() else {
            return Err(InfoError::InvalidState(format!(
                "Type '{}' has no identifier column",
                type_info.object_type
            )));
        };
        if id <= 0 {
            return Ok(None);
        }

        if let Some(record) = self.object_cache.get(&type_info.object_type, id)? {
            return Ok(Some(self.object_from_record(type_info, &record)));
        }

        let rows = self.provider.select(
            &type_info.object_type,
            &Query::filter(WhereCondition::eq(&id_column, id)).top(Some(1)),
        )?;
        let Some(record) = rows.into_iter().next() else {
            return Ok(None);
        };
        if !self.provider.in_transaction()? {
            self.object_cache
                .put(&type_info.object_type, id, record.clone())?;
        }
        Ok(Some(self.object_from_record(type_info, &record)))
    }

    pub fn get_objects(&self, object_type: &str, query: &Query) -> Result<Vec<InfoObject>> {
        let type_info = self.type_info(object_type)?;
        let rows = self.provider.select(&type_info.object_type, query)?;
        Ok(rows
            .iter()
            .map(|record| self.object_from_record(type_info.clone(), record))
            .collect())
    }

    /// Object by code name, optionally within a site.
    pub fn get_object_by_code_name(
        &self,
        object_type: &str,
        code_name: &str,
        site_id: Option<i64>,
    ) -> Result<Option<InfoObject>> {
        let type_info = self.type_info(object_type)?;
        let Some(column) = &type_info.code_name_column else {
            return Ok(None);
        };
        let mut condition = WhereCondition::eq(column, code_name);
        if let Some(site_column) = &type_info.site_id_column {
            condition = condition.and(WhereCondition::Eq(site_column.clone(), Value::from(site_id)));
        }
        Ok(self
            .get_objects(object_type, &Query::filter(condition).top(Some(1)))?
            .into_iter()
            .next())
    }

    pub fn get_object_by_guid(&self, object_type: &str, guid: Uuid) -> Result<Option<InfoObject>> {
        let type_info = self.type_info(object_type)?;
        let Some(column) = &type_info.guid_column else {
            return Ok(None);
        };
        Ok(self
            .get_objects(
                object_type,
                &Query::filter(WhereCondition::eq(column, guid)).top(Some(1)),
            )?
            .into_iter()
            .next())
    }

    /// Sends a change notification, batched while a clone scope is active.
    ///
    /// Delivery is best-effort: failures other than aborts are logged and dropped.
    pub fn notify(&self, notification: Notification) -> Result<()> {
        if !ActionContext::current().notify_changes {
            return Ok(());
        }
        if CloneBatchScope::enqueue(&notification) {
            return Ok(());
        }
        match self.notifier.notify(&notification) {
            Err(e) if e.is_abort() => Err(e),
            Err(e) => {
                warn!("Change notification '{}' failed: {}", notification.key, e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Best-effort cache invalidation, deferred while a clone scope is active.
    pub fn touch_keys(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() || !ActionContext::current().touch_cache_dependencies {
            return Ok(());
        }
        if CloneBatchScope::enqueue_touch(keys) {
            return Ok(());
        }
        match self.cache.touch_keys(keys) {
            Err(e) if e.is_abort() => Err(e),
            Err(e) => {
                warn!("Touching cache keys failed: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Fails with `LicenseDenied` unless `feature` is licensed for the configured domain.
    pub fn check_license(&self, feature: &str) -> Result<()> {
        let domain = &self.config.license_domain;
        if self.license.check_license(feature, domain)? {
            Ok(())
        } else {
            Err(InfoError::LicenseDenied {
                feature: feature.to_string(),
                domain: domain.clone(),
            })
        }
    }

    pub fn check_permission(
        &self,
        object_type: &str,
        permission: Permission,
        site_id: Option<i64>,
        user: Option<&str>,
    ) -> Result<bool> {
        self.permissions
            .check_permission(object_type, permission, site_id, user)
    }

    /// Writes to the event log unless the action context disables it.
    pub fn log_event(&self, severity: Severity, source: &str, code: &str, message: &str) {
        if !ActionContext::current().log_events {
            return;
        }
        if let Err(e) = self.event_log.log_event(severity, source, code, message) {
            warn!("Event log write failed: {}", e);
        }
    }

    pub fn log_exception(&self, source: &str, code: &str, error: &InfoError, site_id: Option<i64>, message: &str) {
        if !ActionContext::current().log_events {
            return;
        }
        if let Err(e) = self
            .event_log
            .log_exception(source, code, error, site_id, message)
        {
            warn!("Event log write failed: {}", e);
        }
    }
}

/// Builder for [`InfoSession`]; unset collaborators fall back to in-memory defaults.
#[derive(Default)]
pub struct InfoSessionBuilder {
    registry: Option<Arc<TypeRegistry>>,
    provider: Option<Arc<dyn DataProvider>>,
    files: Option<Arc<dyn StorageProvider>>,
    event_log: Option<Arc<dyn EventLog>>,
    cache: Option<Arc<dyn CacheService>>,
    permissions: Option<Arc<dyn PermissionService>>,
    license: Option<Arc<dyn LicenseService>>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    localizer: Option<Arc<dyn Localizer>>,
    config: Option<EngineConfig>,
}

impl InfoSessionBuilder {
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn files(mut self, files: Arc<dyn StorageProvider>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionService>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn license(mut self, license: Arc<dyn LicenseService>) -> Self {
        self.license = Some(license);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<InfoSession> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(InfoSession {
            registry: self
                .registry
                .unwrap_or_else(|| TypeRegistry::global().clone()),
            provider: self
                .provider
                .unwrap_or_else(|| Arc::new(InMemoryProvider::new())),
            files: self
                .files
                .unwrap_or_else(|| Arc::new(MemoryFileStorage::new())),
            event_log: self.event_log.unwrap_or_else(|| Arc::new(TracingEventLog)),
            cache: self.cache.unwrap_or_else(|| Arc::new(NullCache)),
            permissions: self.permissions.unwrap_or_else(|| Arc::new(AllowAll)),
            license: self.license.unwrap_or_else(|| Arc::new(AllowAll)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
            localizer: self
                .localizer
                .unwrap_or_else(|| Arc::new(MapLocalizer::new())),
            object_cache: ObjectCache::new(config.object_cache_capacity),
            events: EventRegistry::default(),
            config,
        })
    }
}
