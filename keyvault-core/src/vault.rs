//! The account key vault service.
//!
//! Per account the vault moves through `NoRecord → Sealed`, and an `open`
//! hands the caller an unlocked [`KeyMaterial`] without changing what is
//! stored. `re_key` replaces the sealed record as a whole; `remove` returns
//! the account to `NoRecord`.
//!
//! Key derivation and store I/O run on the blocking pool. Mutations hold the
//! account's guard for their whole duration, and the guard moves into the
//! blocking task with everything else it needs, so dropping the caller's
//! future never interrupts a write halfway.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cipher::{self, generate_nonce, generate_salt};
use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::kdf::{self, KdfParams};
use crate::lock::AccountLocks;
use crate::passphrase::PassphraseChange;
use crate::record::{
    build_associated_data, AccountKeyRecord, CURRENT_RECORD_VERSION, MAX_KEY_MATERIAL_LEN,
};
use crate::registry::AccountRegistry;
use crate::store::VaultStore;
use crate::types::{KeyMaterial, PublicId};

/// Non-secret metadata of a stored key record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    /// Account the record belongs to.
    pub public_id: PublicId,
    /// Record format version.
    pub version: u16,
    /// KDF costs the record was sealed with.
    pub kdf_params: KdfParams,
    /// Creation time, Unix seconds.
    pub created_at: u64,
    /// Last rekey time, Unix seconds.
    pub updated_at: u64,
    /// `true` if a rekey would move the record to the current format or to
    /// stronger KDF costs.
    pub needs_upgrade: bool,
}

struct Inner {
    store: Arc<dyn VaultStore>,
    config: VaultConfig,
    locks: AccountLocks,
    registry: Option<Arc<dyn AccountRegistry>>,
}

/// Stores each account's private key encrypted under a passphrase.
///
/// Cheap to clone; clones share the store, the configuration and the
/// per-account locks.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use keyvault_core::{
///     config::VaultConfig, store::FileVaultStore, types::{KeyMaterial, PublicId},
///     vault::KeyVault,
/// };
///
/// # async fn run() -> keyvault_core::VaultResult<()> {
/// let store = FileVaultStore::open("/data/wallet")?;
/// let vault = KeyVault::new(Arc::new(store), VaultConfig::default())?;
/// let id = PublicId::new("rAcct1")?;
///
/// vault.create(&id, b"correct-horse", KeyMaterial::new(vec![0xDE; 32])).await?;
/// let key = vault.open(&id, b"correct-horse").await?;
/// assert_eq!(key.len(), 32);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KeyVault {
    inner: Arc<Inner>,
}

impl KeyVault {
    /// Creates a vault over `store` with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if the configuration is invalid.
    pub fn new(store: Arc<dyn VaultStore>, config: VaultConfig) -> VaultResult<Self> {
        Self::builder().store(store).config(config).build()
    }

    /// Starts building a vault.
    #[must_use]
    pub fn builder() -> KeyVaultBuilder {
        KeyVaultBuilder::default()
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.inner.config
    }

    /// Seals `key_material` under `passphrase` as a new record for `id`.
    ///
    /// Never overwrites: an existing record is left untouched.
    ///
    /// # Errors
    ///
    /// - [`VaultError::AlreadyExists`] if `id` already has a record.
    /// - [`VaultError::InvalidInput`] if the key material is empty or too large.
    /// - [`VaultError::Busy`] under the reject policy while `id` is being mutated.
    /// - [`VaultError::Io`] if the store fails.
    pub async fn create(
        &self,
        id: &PublicId,
        passphrase: &[u8],
        key_material: KeyMaterial,
    ) -> VaultResult<()> {
        if key_material.is_empty() {
            return Err(VaultError::InvalidInput(
                "key material must not be empty".to_string(),
            ));
        }
        if key_material.len() > MAX_KEY_MATERIAL_LEN {
            return Err(VaultError::InvalidInput(format!(
                "key material exceeds {MAX_KEY_MATERIAL_LEN} bytes"
            )));
        }

        let guard = self
            .inner
            .locks
            .acquire(id, self.inner.config.mutation_policy)
            .await?;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        let passphrase = Zeroizing::new(passphrase.to_vec());

        run_blocking(move || {
            let _guard = guard;
            if inner.store.exists(&id)? {
                debug!(public_id = %id, "create refused, record exists");
                return Err(VaultError::AlreadyExists);
            }
            let now = unix_now();
            let record = seal(
                &id,
                &passphrase,
                key_material.expose(),
                inner.config.kdf,
                now,
                now,
            )?;
            // Another process may have created the record since the check above.
            inner
                .store
                .create_new(&id, &encode(&record)?)
                .map_err(VaultError::from)
                .inspect_err(|err| {
                    if matches!(err, VaultError::AlreadyExists) {
                        debug!(public_id = %id, "create refused, record appeared concurrently");
                    }
                })?;
            info!(public_id = %id, "key record created");
            if let Some(registry) = &inner.registry {
                registry.key_record_created(&id);
            }
            Ok(())
        })
        .await
    }

    /// Unlocks the key material of `id` with `passphrase`.
    ///
    /// Has no effect on the store.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if `id` has no record.
    /// - [`VaultError::WrongPassphrase`] if the passphrase is wrong or the
    ///   record is corrupt.
    /// - [`VaultError::Io`] if the store fails.
    pub async fn open(&self, id: &PublicId, passphrase: &[u8]) -> VaultResult<KeyMaterial> {
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        let passphrase = Zeroizing::new(passphrase.to_vec());

        run_blocking(move || {
            let bytes = inner.store.read(&id)?;
            let (_, key) = unseal(&id, &bytes, &passphrase).inspect_err(|_| {
                debug!(public_id = %id, "unlock failed");
            })?;
            debug!(public_id = %id, "key record unlocked");
            Ok(key)
        })
        .await
    }

    /// Replaces the passphrase of `id`, keeping the key material.
    ///
    /// `old` is verified against the stored record every time. The new record
    /// gets a fresh salt and nonce and the configured KDF costs; its creation
    /// time is kept.
    ///
    /// # Errors
    ///
    /// - [`VaultError::WrongPassphrase`] if `old` does not unlock the record.
    ///   The record is untouched.
    /// - [`VaultError::NotFound`] if `id` has no record.
    /// - [`VaultError::Busy`] under the reject policy while `id` is being mutated.
    /// - [`VaultError::Io`] if the store fails. The old record stays valid.
    pub async fn re_key(&self, id: &PublicId, old: &[u8], new: &[u8]) -> VaultResult<()> {
        let guard = self
            .inner
            .locks
            .acquire(id, self.inner.config.mutation_policy)
            .await?;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        let old = Zeroizing::new(old.to_vec());
        let new = Zeroizing::new(new.to_vec());

        run_blocking(move || {
            let _guard = guard;
            let bytes = inner.store.read(&id)?;
            let (current, key) = unseal(&id, &bytes, &old).inspect_err(|_| {
                warn!(public_id = %id, "rekey refused, current passphrase did not unlock");
            })?;

            let updated_at = unix_now().max(current.created_at);
            let record = seal(
                &id,
                &new,
                key.expose(),
                inner.config.kdf,
                current.created_at,
                updated_at,
            )?;
            inner
                .store
                .write_atomic(&id, &encode(&record)?)
                .inspect_err(|err| {
                    warn!(public_id = %id, error = %err, "rekey write failed, old record kept");
                })?;
            info!(
                public_id = %id,
                upgraded = current.kdf_params != record.kdf_params,
                "key record rekeyed"
            );
            Ok(())
        })
        .await
    }

    /// Validates a user's change request, then rekeys `id`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidInput`] if the request breaks the configured
    ///   passphrase policy. Nothing is read or written.
    /// - Otherwise as [`KeyVault::re_key`].
    pub async fn change_passphrase(
        &self,
        id: &PublicId,
        change: &PassphraseChange,
    ) -> VaultResult<()> {
        change
            .validate(&self.inner.config.passphrase_policy)
            .map_err(|issue| VaultError::InvalidInput(issue.to_string()))?;
        self.re_key(id, change.current(), change.new_passphrase())
            .await
    }

    /// Deletes the record of `id`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if `id` has no record.
    /// - [`VaultError::Busy`] under the reject policy while `id` is being mutated.
    /// - [`VaultError::Io`] if the store fails.
    pub async fn remove(&self, id: &PublicId) -> VaultResult<()> {
        let guard = self
            .inner
            .locks
            .acquire(id, self.inner.config.mutation_policy)
            .await?;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();

        run_blocking(move || {
            let _guard = guard;
            inner.store.delete(&id)?;
            info!(public_id = %id, "key record removed");
            if let Some(registry) = &inner.registry {
                registry.key_record_removed(&id);
            }
            Ok(())
        })
        .await
    }

    /// Checks if `id` has a record.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the store fails.
    pub async fn exists(&self, id: &PublicId) -> VaultResult<bool> {
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        run_blocking(move || Ok(inner.store.exists(&id)?)).await
    }

    /// Lists every account that has a record, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the store fails.
    pub async fn list_accounts(&self) -> VaultResult<Vec<PublicId>> {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || Ok(inner.store.list()?)).await
    }

    /// Describes the stored record of `id` without unlocking it.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if `id` has no record.
    /// - [`VaultError::WrongPassphrase`] if the record is corrupt.
    /// - [`VaultError::Io`] if the store fails.
    pub async fn record_info(&self, id: &PublicId) -> VaultResult<RecordInfo> {
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        run_blocking(move || {
            let record = AccountKeyRecord::decode(&inner.store.read(&id)?)?;
            if record.public_id != id {
                return Err(VaultError::WrongPassphrase);
            }
            let needs_upgrade = record.version < CURRENT_RECORD_VERSION
                || record.kdf_params.is_weaker_than(&inner.config.kdf);
            Ok(RecordInfo {
                public_id: record.public_id,
                version: record.version,
                kdf_params: record.kdf_params,
                created_at: record.created_at,
                updated_at: record.updated_at,
                needs_upgrade,
            })
        })
        .await
    }
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`KeyVault`].
#[derive(Default)]
pub struct KeyVaultBuilder {
    store: Option<Arc<dyn VaultStore>>,
    config: VaultConfig,
    registry: Option<Arc<dyn AccountRegistry>>,
}

impl KeyVaultBuilder {
    /// Sets the record store. Required.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn VaultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the configuration. Defaults to [`VaultConfig::default`].
    #[must_use]
    pub fn config(mut self, config: VaultConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the account repository to notify on create and remove.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn AccountRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if no store was set or the
    /// configuration is invalid.
    pub fn build(self) -> VaultResult<KeyVault> {
        let store = self
            .store
            .ok_or_else(|| VaultError::Config("a vault store is required".to_string()))?;
        self.config.validate()?;
        Ok(KeyVault {
            inner: Arc::new(Inner {
                store,
                config: self.config,
                locks: AccountLocks::new(),
                registry: self.registry,
            }),
        })
    }
}

impl fmt::Debug for KeyVaultBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVaultBuilder")
            .field("store", &self.store.is_some())
            .field("config", &self.config)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

async fn run_blocking<T, F>(task: F) -> VaultResult<T>
where
    F: FnOnce() -> VaultResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await?
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Encrypts `key_material` into a fresh record with new salt and nonce.
fn seal(
    id: &PublicId,
    passphrase: &[u8],
    key_material: &[u8],
    kdf_params: KdfParams,
    created_at: u64,
    updated_at: u64,
) -> VaultResult<AccountKeyRecord> {
    let salt = generate_salt();
    let nonce = generate_nonce();
    let key = kdf::derive(passphrase, &salt, &kdf_params)?;
    let aad = build_associated_data(
        id,
        CURRENT_RECORD_VERSION,
        &kdf_params,
        &salt,
        created_at,
        updated_at,
    );
    let ciphertext = cipher::encrypt(&key, &nonce, &aad, key_material)?;
    Ok(AccountKeyRecord {
        public_id: id.clone(),
        version: CURRENT_RECORD_VERSION,
        kdf_params,
        salt,
        nonce,
        ciphertext,
        created_at,
        updated_at,
    })
}

fn encode(record: &AccountKeyRecord) -> VaultResult<Vec<u8>> {
    record
        .encode()
        .map_err(|err| VaultError::Internal(err.to_string()))
}

/// Decodes and decrypts a stored record. Every failure past the read is
/// reported as [`VaultError::WrongPassphrase`].
fn unseal(
    id: &PublicId,
    bytes: &[u8],
    passphrase: &[u8],
) -> VaultResult<(AccountKeyRecord, KeyMaterial)> {
    let record = AccountKeyRecord::decode(bytes)?;
    if record.public_id != *id {
        return Err(VaultError::WrongPassphrase);
    }
    let key = kdf::derive(passphrase, &record.salt, &record.kdf_params)
        .map_err(|_| VaultError::WrongPassphrase)?;
    let plaintext = cipher::decrypt(
        &key,
        &record.nonce,
        &record.associated_data(),
        &record.ciphertext,
    )?;
    let material = KeyMaterial::from(plaintext.as_slice());
    Ok((record, material))
}
