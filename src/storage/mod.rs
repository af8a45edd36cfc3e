pub mod change;
pub mod memory;
pub mod provider;
pub mod query;
pub mod transaction;

pub use memory::InMemoryProvider;
pub use provider::{DataProvider, StorageOperation};
pub use query::{OrderBy, Query, WhereCondition};
pub use transaction::TransactionScope;
