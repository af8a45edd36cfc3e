use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum InfoError {
    #[error("Object type '{0}' is not registered")]
    TypeNotRegistered(String),

    #[error("Column '{0}' not found in object type '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid object state: {0}")]
    InvalidState(String),

    #[error("Permission '{permission}' denied for object type '{object_type}'")]
    PermissionDenied {
        object_type: String,
        permission: String,
    },

    #[error("Object '{object_type}' ({object_id}) has dependent objects: {}", dependents.join(", "))]
    DependencyBlocked {
        object_type: String,
        object_id: i64,
        dependents: Vec<String>,
    },

    #[error("Data of object type '{object_type}' failed to initialize: {origin}")]
    InitializationFailed { object_type: String, origin: String },

    #[error(
        "Cannot clone '{object_type}' to site {target_site_id}: column '{column}' has no equivalent on the target site"
    )]
    CrossSiteCloneIncompatible {
        object_type: String,
        column: String,
        target_site_id: i64,
    },

    #[error("Feature '{feature}' is not licensed for '{domain}'")]
    LicenseDenied { feature: String, domain: String },

    #[error("Operation aborted: {0}")]
    Aborted(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("External storage error: {0}")]
    ExternalStorage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl InfoError {
    /// Cooperative cancellation; never swallowed by best-effort paths.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    pub fn is_license_denied(&self) -> bool {
        matches!(self, Self::LicenseDenied { .. })
    }

    pub fn is_dependency_blocked(&self) -> bool {
        matches!(self, Self::DependencyBlocked { .. })
    }
}

pub type Result<T> = std::result::Result<T, InfoError>;

impl<T> From<std::sync::PoisonError<T>> for InfoError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for InfoError {
    fn from(err: std::io::Error) -> Self {
        Self::ExternalStorage(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for InfoError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for InfoError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
