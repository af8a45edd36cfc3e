//! Deep copies of object graphs and the notification batching that goes
//! with them.

pub mod batch;
pub mod engine;
pub mod settings;

pub use batch::CloneBatchScope;
pub use engine::CloneEngine;
pub use settings::{CloneResult, CloneSettings, ClonedObject, TranslationTable};
