use std::sync::Arc;

use tracing::warn;

use crate::core::Result;

use super::DataProvider;

/// Transaction guard; rolls back on drop unless [`commit`](Self::commit) ran.
///
/// Scopes nest: the provider only applies or discards work when the
/// outermost scope finishes.
pub struct TransactionScope {
    provider: Arc<dyn DataProvider>,
    completed: bool,
}

impl TransactionScope {
    pub fn begin(provider: Arc<dyn DataProvider>) -> Result<Self> {
        provider.begin_transaction()?;
        Ok(Self {
            provider,
            completed: false,
        })
    }

    pub fn commit(mut self) -> Result<()> {
        self.completed = true;
        self.provider.commit_transaction()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.completed = true;
        self.provider.rollback_transaction()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if !self.completed {
            if let Err(e) = self.provider.rollback_transaction() {
                warn!(error = %e, "Rollback of abandoned transaction scope failed");
            }
        }
    }
}
