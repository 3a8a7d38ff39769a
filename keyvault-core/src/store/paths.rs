//! Storage path helpers.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::types::PublicId;

const VAULT_DIRNAME: &str = "keyvault";
const RECORDS_DIRNAME: &str = "records";
const LOCK_FILENAME: &str = "lock";
const CONFIG_FILENAME: &str = "config.json";

/// File extension of an encoded key record.
pub(super) const RECORD_EXTENSION: &str = "akr";

/// Paths for key vault artifacts under `<root>/keyvault`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    root: PathBuf,
    vault_dir: PathBuf,
}

impl VaultPaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let vault_dir = root.join(VAULT_DIRNAME);
        Self { root, vault_dir }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding one file per key record.
    #[must_use]
    pub fn records_dir(&self) -> PathBuf {
        self.vault_dir.join(RECORDS_DIRNAME)
    }

    /// Returns the path to the cross-process lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.vault_dir.join(LOCK_FILENAME)
    }

    /// Returns the default location of the vault configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.vault_dir.join(CONFIG_FILENAME)
    }

    /// Returns the path of the record for `id`.
    #[must_use]
    pub fn record_path(&self, id: &PublicId) -> PathBuf {
        self.records_dir()
            .join(format!("{}.{RECORD_EXTENSION}", record_stem(id)))
    }

    /// Returns the temporary path used while replacing the record for `id`.
    #[must_use]
    pub fn temp_record_path(&self, id: &PublicId) -> PathBuf {
        self.records_dir()
            .join(format!(".{}.{RECORD_EXTENSION}.tmp", record_stem(id)))
    }
}

/// File stem of the record for `id`: lowercase hex SHA-256 of the id bytes.
///
/// Fixed at 64 characters so every valid id fits the filesystem's name limit.
pub(super) fn record_stem(id: &PublicId) -> String {
    hex::encode(Sha256::digest(id.as_str().as_bytes()))
}
