use thiserror::Error;

use crate::cipher::CipherError;
use crate::config::ConfigError;
use crate::kdf::KdfError;
use crate::record::FormatError;
use crate::store::StoreError;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Error outputs from the key vault.
///
/// Authentication failures and record corruption both surface as
/// [`VaultError::WrongPassphrase`]; callers cannot tell them apart.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No key record exists for the account.
    #[error("not_found")]
    NotFound,
    /// A key record already exists for the account.
    #[error("already_exists")]
    AlreadyExists,
    /// The passphrase did not unlock the record.
    #[error("wrong_passphrase")]
    WrongPassphrase,
    /// The storage medium failed. The previous record, if any, is intact.
    #[error("io_error: {0}")]
    Io(String),
    /// Another mutation is in flight for the same account.
    #[error("busy")]
    Busy,
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {0}")]
    InvalidInput(String),
    /// Malformed KDF parameters or configuration.
    #[error("config_error: {0}")]
    Config(String),
    /// A background task failed to complete.
    #[error("internal_error: {0}")]
    Internal(String),
}

impl From<StoreError> for VaultError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::NotFound,
            StoreError::AlreadyExists => Self::AlreadyExists,
            other => Self::Io(other.to_string()),
        }
    }
}

impl From<FormatError> for VaultError {
    fn from(_: FormatError) -> Self {
        Self::WrongPassphrase
    }
}

impl From<CipherError> for VaultError {
    fn from(error: CipherError) -> Self {
        match error {
            CipherError::AuthenticationFailure => Self::WrongPassphrase,
            CipherError::EncryptionFailed => Self::Internal(error.to_string()),
        }
    }
}

impl From<KdfError> for VaultError {
    fn from(error: KdfError) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<ConfigError> for VaultError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Internal(format!("vault task did not complete: {error}"))
    }
}
