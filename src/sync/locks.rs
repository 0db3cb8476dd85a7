// Per-account import serialization within one process
//
// Imports for the same account run one at a time; different accounts are
// independent. Cross-process exclusion is the ledger lease's job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::QrzError;

/// What to do when another import for the account is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Block until the running import finishes
    #[default]
    Wait,
    /// Return LockContention immediately
    FailFast,
}

#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one import
pub type AccountGuard = OwnedMutexGuard<()>;

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, account: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map holds an idle lock; nobody is running or waiting on it
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(account.to_uppercase())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, account: &str, mode: LockMode) -> Result<AccountGuard, QrzError> {
        let lock = self.lock_for(account);
        match mode {
            LockMode::Wait => Ok(lock.lock_owned().await),
            LockMode::FailFast => lock
                .try_lock_owned()
                .map_err(|_| QrzError::LockContention(account.to_string())),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
