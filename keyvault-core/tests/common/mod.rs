//! Common test utilities shared across integration tests.

use std::sync::{Arc, Mutex};

use keyvault_core::config::{MutationPolicy, VaultConfig};
use keyvault_core::kdf::KdfParams;
use keyvault_core::registry::AccountRegistry;
use keyvault_core::store::FileVaultStore;
use keyvault_core::{KeyVault, PublicId};
use tempfile::TempDir;

pub struct TestVault {
    // Held so the directory outlives the vault.
    _root: TempDir,
    pub vault: KeyVault,
    pub store: Arc<FileVaultStore>,
    pub registry: Arc<RecordingRegistry>,
}

pub fn test_config(policy: MutationPolicy) -> VaultConfig {
    VaultConfig {
        kdf: KdfParams::testing(),
        mutation_policy: policy,
        ..VaultConfig::default()
    }
}

pub fn file_vault(policy: MutationPolicy) -> TestVault {
    let root = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileVaultStore::open(root.path()).expect("open store"));
    let registry = Arc::new(RecordingRegistry::default());
    let vault = KeyVault::builder()
        .store(store.clone())
        .config(test_config(policy))
        .registry(registry.clone())
        .build()
        .expect("build vault");
    TestVault {
        _root: root,
        vault,
        store,
        registry,
    }
}

pub fn account(value: &str) -> PublicId {
    PublicId::new(value).expect("valid id")
}

/// `DE AD BE EF` repeated to 32 bytes.
pub fn deadbeef_key() -> Vec<u8> {
    [0xDE, 0xAD, 0xBE, 0xEF].repeat(8)
}

#[derive(Default)]
pub struct RecordingRegistry {
    events: Mutex<Vec<String>>,
}

impl RecordingRegistry {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("registry mutex").clone()
    }
}

impl AccountRegistry for RecordingRegistry {
    fn key_record_created(&self, id: &PublicId) {
        self.events
            .lock()
            .expect("registry mutex")
            .push(format!("created:{id}"));
    }

    fn key_record_removed(&self, id: &PublicId) {
        self.events
            .lock()
            .expect("registry mutex")
            .push(format!("removed:{id}"));
    }
}
