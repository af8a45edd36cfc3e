//! Info objects: persistent records of registered types with change
//! tracking, lifecycle operations and relation helpers.

pub mod class;
pub mod dependencies;
pub mod events;
pub mod hierarchy;
pub mod lifecycle;
pub mod metafile;
pub mod naming;
pub mod object;
pub mod ordering;
pub mod properties;
pub mod related;
pub mod settings;
pub mod snapshot;
pub mod status;

pub use class::{InfoClass, InfoProvider};
pub use dependencies::Dependent;
pub use events::{AfterHandler, BeforeHandler, EventOutcome, EventRegistry};
pub use hierarchy::{ROOT_PATH, id_segment, join_path};
pub use metafile::{METAFILE_OBJECT_TYPE, MetaFile, metafile_type_info};
pub use naming::sanitize_code_name;
pub use object::InfoObject;
pub use ordering::compare_names;
pub use properties::{PropertyAccessor, PropertyDefinition, PropertyTable, PropertyValue};
pub use related::row_condition;
pub use settings::{OBJECT_SETTINGS_TYPE, invalidate_object_settings, object_settings_type_info};
pub use snapshot::InfoSnapshot;
pub use status::{LifecycleOperation, LifecycleOutcome, ObjectStatus};
