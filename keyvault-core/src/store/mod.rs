//! Persistent mapping from account id to encoded key record.
//!
//! The store is a byte-blob map. It performs no cryptography; the vault
//! service is its only writer.

mod file;
mod lock;
mod memory;
mod paths;

use thiserror::Error;

use crate::types::PublicId;

pub use file::FileVaultStore;
pub use lock::{DirectoryLock, DirectoryLockGuard};
pub use memory::MemoryVaultStore;
pub use paths::VaultPaths;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by vault stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record is stored under the id.
    #[error("record not found")]
    NotFound,

    /// A record is already stored under the id.
    #[error("record already exists")]
    AlreadyExists,

    /// An I/O operation failed.
    #[error("{context}: {source}")]
    Io {
        /// Context describing the operation.
        context: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The cross-process storage lock failed.
    #[error("storage lock error: {0}")]
    Lock(String),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wraps an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Atomic storage for encoded key records.
///
/// # Implementation Notes
///
/// `write_atomic` MUST install the new bytes as a single indivisible step:
/// a reader or a crash observes either the complete old record or the
/// complete new one, never a mix. On the filesystem this is the
/// write-to-temp, `fsync`, rename, `fsync(dir)` sequence.
///
/// Mutations return `Err` only if nothing was installed. Once the new bytes
/// are in place the call succeeds.
pub trait VaultStore: Send + Sync {
    /// Reads the record stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent, or an I/O error.
    fn read(&self, id: &PublicId) -> StoreResult<Vec<u8>>;

    /// Atomically writes `bytes` under `id`, replacing any existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. The previous record, if any,
    /// is left intact.
    fn write_atomic(&self, id: &PublicId, bytes: &[u8]) -> StoreResult<()>;

    /// Atomically writes `bytes` under `id` only if no record exists yet.
    ///
    /// The existence check and the write form one step with respect to every
    /// other writer of the store, including other processes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if a record is present, which is
    /// left untouched, or an error if the write fails.
    fn create_new(&self, id: &PublicId, bytes: &[u8]) -> StoreResult<()>;

    /// Deletes the record stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent, or an I/O error.
    fn delete(&self, id: &PublicId) -> StoreResult<()>;

    /// Lists every id that has a record, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list(&self) -> StoreResult<Vec<PublicId>>;

    /// Checks if a record exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails for reasons other than
    /// absence.
    fn exists(&self, id: &PublicId) -> StoreResult<bool> {
        match self.read(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
