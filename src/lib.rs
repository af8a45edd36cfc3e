// ============================================================================
// infobase Library
// ============================================================================

pub mod clone;
pub mod config;
pub mod core;
pub mod data;
pub mod external;
pub mod info;
pub mod metadata;
pub mod prelude;
pub mod services;
pub mod session;
pub mod storage;

// Re-export main types for convenience
pub use clone::{CloneBatchScope, CloneEngine, CloneResult, CloneSettings};
pub use config::{EngineConfig, LineEnding};
pub use core::{Column, DataType, InfoError, Record, Result, Schema, Value};
pub use info::{InfoClass, InfoObject, InfoProvider, InfoSnapshot, LifecycleOperation, LifecycleOutcome, ObjectStatus};
pub use metadata::{DependencyKind, ObjectDependency, TypeInfo, TypeRegistry};
pub use session::{InfoSession, InfoSessionBuilder};
