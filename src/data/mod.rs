pub mod container;

pub use container::{ColumnValues, DataContainer};
