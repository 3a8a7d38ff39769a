//! Filesystem-backed vault store.
//!
//! One file per record under `<root>/keyvault/records/<sha256(id)>.akr`.
//! File names are fixed-length digests, so `list` reads each account id back
//! out of its record.
//!
//! # Atomic Write Pattern
//!
//! 1. Write the encoded record to `.<sha256(id)>.akr.tmp` in the same directory
//! 2. `fsync` the temporary file
//! 3. Rename it over the target
//! 4. `fsync` the records directory
//!
//! Readers see either the old record or the new one, never a partial write.
//! The rename is the commit point: once it succeeds the write is reported as
//! done, and a failed directory `fsync` is only logged.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::warn;

use super::paths::{record_stem, RECORD_EXTENSION};
use super::{DirectoryLock, StoreError, StoreResult, VaultPaths, VaultStore};
use crate::record::AccountKeyRecord;
use crate::types::PublicId;

fn io_error<S: Into<String>>(context: S, err: std::io::Error) -> StoreError {
    StoreError::io(context, err)
}

/// Vault store keeping each record in its own file.
#[derive(Debug, Clone)]
pub struct FileVaultStore {
    paths: VaultPaths,
    lock: DirectoryLock,
    #[cfg(test)]
    fail_directory_sync: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl FileVaultStore {
    /// Opens (creating if needed) the vault store under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the lock file cannot be created.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let paths = VaultPaths::new(root);
        let records_dir = paths.records_dir();
        fs::create_dir_all(&records_dir).map_err(|err| {
            io_error(
                format!("failed to create records directory '{}'", records_dir.display()),
                err,
            )
        })?;
        let lock = DirectoryLock::open(&paths.lock_path())?;
        Ok(Self {
            paths,
            lock,
            #[cfg(test)]
            fail_directory_sync: std::sync::Arc::default(),
        })
    }

    /// Returns the storage paths used by this store.
    #[must_use]
    pub const fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Makes the next directory `fsync` fail, after the rename has happened.
    #[cfg(test)]
    pub fn fail_next_directory_sync(&self) {
        self.fail_directory_sync
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn write_temp(path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| {
                io_error(format!("failed to create temp file '{}'", path.display()), err)
            })?;
        file.write_all(bytes)
            .map_err(|err| io_error("failed to write temp file", err))?;
        file.sync_all()
            .map_err(|err| io_error("failed to sync temp file", err))
    }

    /// Writes `bytes` to the temp path and renames it over the record for `id`.
    ///
    /// Must be called with the directory lock held. Returns `Err` only if the
    /// target was left untouched.
    fn install(&self, id: &PublicId, bytes: &[u8]) -> StoreResult<()> {
        let target = self.paths.record_path(id);
        let temp = self.paths.temp_record_path(id);

        if let Err(err) = Self::write_temp(&temp, bytes) {
            let _ = fs::remove_file(&temp);
            return Err(err);
        }

        if let Err(err) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(io_error(
                format!("failed to rename temp file to '{}'", target.display()),
                err,
            ));
        }

        self.sync_directory_after_commit();
        Ok(())
    }

    fn sync_directory_after_commit(&self) {
        if let Err(err) = self.sync_directory() {
            warn!(error = %err, "records directory sync failed after commit");
        }
    }

    #[cfg(test)]
    fn injected_sync_failure(&self) -> bool {
        self.fail_directory_sync
            .swap(false, std::sync::atomic::Ordering::SeqCst)
    }

    #[cfg(not(test))]
    #[allow(clippy::unused_self)]
    const fn injected_sync_failure(&self) -> bool {
        false
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StoreResult<()> {
        let dir = self.paths.records_dir();
        if self.injected_sync_failure() {
            return Err(io_error(
                format!("failed to sync directory '{}'", dir.display()),
                std::io::Error::other("injected directory sync failure"),
            ));
        }
        File::open(&dir)
            .and_then(|handle| handle.sync_all())
            .map_err(|err| {
                io_error(format!("failed to sync directory '{}'", dir.display()), err)
            })
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StoreResult<()> {
        if self.injected_sync_failure() {
            return Err(io_error(
                "failed to sync directory",
                std::io::Error::other("injected directory sync failure"),
            ));
        }
        Ok(())
    }

    /// Reads the account id stored in the record file at `path`.
    ///
    /// Returns `None` for files that are not decodable records or whose name
    /// does not match the id inside.
    fn listed_id(path: &Path, stem: &str) -> Option<PublicId> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable record file");
                return None;
            }
        };
        match AccountKeyRecord::decode(&bytes) {
            Ok(record) if record_stem(&record.public_id) == stem => Some(record.public_id),
            Ok(_) => {
                warn!(path = %path.display(), "skipping record stored under a foreign name");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping undecodable record file");
                None
            }
        }
    }
}

impl VaultStore for FileVaultStore {
    fn read(&self, id: &PublicId) -> StoreResult<Vec<u8>> {
        let path = self.paths.record_path(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(err) => Err(io_error(
                format!("failed to read record '{}'", path.display()),
                err,
            )),
        }
    }

    fn write_atomic(&self, id: &PublicId, bytes: &[u8]) -> StoreResult<()> {
        let _guard = self.lock.lock()?;
        self.install(id, bytes)
    }

    fn create_new(&self, id: &PublicId, bytes: &[u8]) -> StoreResult<()> {
        let _guard = self.lock.lock()?;
        let target = self.paths.record_path(id);
        match target.try_exists() {
            Ok(true) => return Err(StoreError::AlreadyExists),
            Ok(false) => {}
            Err(err) => {
                return Err(io_error(
                    format!("failed to check record '{}'", target.display()),
                    err,
                ))
            }
        }
        self.install(id, bytes)
    }

    fn delete(&self, id: &PublicId) -> StoreResult<()> {
        let _guard = self.lock.lock()?;
        let path = self.paths.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(err) => {
                return Err(io_error(
                    format!("failed to delete record '{}'", path.display()),
                    err,
                ))
            }
        }
        let _ = fs::remove_file(self.paths.temp_record_path(id));
        self.sync_directory_after_commit();
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<PublicId>> {
        let dir = self.paths.records_dir();
        let entries = fs::read_dir(&dir).map_err(|err| {
            io_error(format!("failed to list records in '{}'", dir.display()), err)
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error("failed to read directory entry", err))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Some(stem) = name
                .strip_suffix(RECORD_EXTENSION)
                .and_then(|rest| rest.strip_suffix('.'))
            else {
                continue;
            };
            if let Some(id) = Self::listed_id(&entry.path(), stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
