//! Per-account serialization of vault mutations.
//!
//! Every `create`, `re_key` and `remove` for one account runs while holding
//! that account's guard. Different accounts never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::config::MutationPolicy;
use crate::error::{VaultError, VaultResult};
use crate::types::PublicId;

/// Guard held for the duration of one account mutation.
pub type AccountGuard = OwnedMutexGuard<()>;

/// Table of per-account async mutexes.
///
/// Entries nobody holds or waits on are pruned on the next acquisition.
#[derive(Debug, Default)]
pub struct AccountLocks {
    entries: Mutex<HashMap<PublicId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AccountLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutation guard for `id`.
    ///
    /// With [`MutationPolicy::Queue`] the caller waits its turn. With
    /// [`MutationPolicy::Reject`] a held guard fails fast.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Busy`] under [`MutationPolicy::Reject`] if another
    /// mutation for `id` is in flight.
    pub async fn acquire(&self, id: &PublicId, policy: MutationPolicy) -> VaultResult<AccountGuard> {
        let mutex = self.entry(id);
        match policy {
            MutationPolicy::Queue => Ok(mutex.lock_owned().await),
            MutationPolicy::Reject => mutex.try_lock_owned().map_err(|_| VaultError::Busy),
        }
    }

    /// Number of accounts with a live entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no account has a live entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &PublicId) -> Arc<tokio::sync::Mutex<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        Arc::clone(entries.entry(id.clone()).or_default())
    }
}
