//! Columns whose values live in file storage instead of (or next to) the database.

pub mod local;
pub mod memory;
pub mod provider;
pub mod setting;
pub mod store;

pub use local::LocalFileStorage;
pub use memory::MemoryFileStorage;
pub use provider::{FileInfo, StorageProvider, normalize_path};
pub use setting::{
    ExternalColumnSetting, ExternalColumns, ExternalStorageMode, PathGenerator, ValueTransform,
};
pub use store::ExternalStore;
