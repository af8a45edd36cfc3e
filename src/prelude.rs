//! Recommended imports grouped by abstraction level.
//!
//! `app` covers defining types and working with objects. `advanced` exposes
//! the collaborator seams for embedding the engine over other storage.

pub mod app {
    //! Everyday surface: type descriptors, sessions, objects and cloning.
    pub use crate::clone::{CloneResult, CloneSettings};
    pub use crate::core::{Column, DataType, InfoError, Record, Result, Value};
    pub use crate::info::{
        EventOutcome, InfoClass, InfoObject, InfoProvider, LifecycleOperation, LifecycleOutcome,
        ObjectStatus,
    };
    pub use crate::metadata::{DependencyKind, ObjectDependency, TypeInfo, TypeRegistry};
    pub use crate::services::{ActionContext, ChangeAction, Permission};
    pub use crate::session::InfoSession;
}

pub mod advanced {
    //! Storage, file, cache and notification seams.
    pub use crate::clone::{CloneBatchScope, CloneEngine, TranslationTable};
    pub use crate::external::{ExternalColumnSetting, ExternalStorageMode, StorageProvider};
    pub use crate::services::{
        CacheService, ChangeNotifier, EventLog, LicenseService, Localizer, Notification,
        PermissionService,
    };
    pub use crate::storage::{DataProvider, Query, TransactionScope, WhereCondition};
}
