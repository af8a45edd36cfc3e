pub mod error;
pub mod types;
pub mod value;

pub use error::{InfoError, Result};
pub use types::{Column, Record, Schema};
pub use value::{DataType, Value};
