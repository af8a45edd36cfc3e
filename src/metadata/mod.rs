pub mod clear_cache;
pub mod dependency;
pub mod per_type;
pub mod registry;
pub mod type_info;

pub use clear_cache::{ClearCacheCallback, ClearCacheTable};
pub use dependency::{DependencyKind, ObjectDependency};
pub use per_type::PerTypeCache;
pub use registry::TypeRegistry;
pub use type_info::{ExternalColumnsFactory, TypeFlags, TypeInfo};
