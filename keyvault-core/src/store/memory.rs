//! In-memory vault store.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{StoreError, StoreResult, VaultStore};
use crate::types::PublicId;

/// Mutex-guarded map of records.
///
/// Used by tests and by hosts that persist records themselves. Writes are
/// atomic by construction: the map entry is replaced in one step.
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    records: Mutex<HashMap<PublicId, Vec<u8>>>,
    fail_next_write: AtomicBool,
}

impl MemoryVaultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `write_atomic` or `create_new` fail with an I/O error
    /// without touching the stored record.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> StoreResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::io(
                "injected write failure",
                std::io::Error::other("simulated disk failure"),
            ));
        }
        Ok(())
    }

    fn records(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<PublicId, Vec<u8>>>> {
        self.records
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".to_string()))
    }
}

impl VaultStore for MemoryVaultStore {
    fn read(&self, id: &PublicId) -> StoreResult<Vec<u8>> {
        self.records()?.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn write_atomic(&self, id: &PublicId, bytes: &[u8]) -> StoreResult<()> {
        self.injected_failure()?;
        self.records()?.insert(id.clone(), bytes.to_vec());
        Ok(())
    }

    fn create_new(&self, id: &PublicId, bytes: &[u8]) -> StoreResult<()> {
        let mut records = self.records()?;
        match records.entry(id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                self.injected_failure()?;
                slot.insert(bytes.to_vec());
                Ok(())
            }
        }
    }

    fn delete(&self, id: &PublicId) -> StoreResult<()> {
        self.records()?
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn list(&self) -> StoreResult<Vec<PublicId>> {
        let mut ids: Vec<PublicId> = self.records()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
