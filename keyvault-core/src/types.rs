//! Shared value types: account identifiers and unlocked key material.

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Maximum byte length of a [`PublicId`].
pub const MAX_PUBLIC_ID_LEN: usize = 256;

/// Stable public identifier of an account (public key or address).
///
/// Immutable for the lifetime of the account's key record. Any non-empty
/// UTF-8 string up to [`MAX_PUBLIC_ID_LEN`] bytes without control characters
/// is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicId(String);

impl PublicId {
    /// Validates and wraps an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidInput`] if the identifier is empty, too long,
    /// or contains control characters.
    pub fn new(value: impl Into<String>) -> VaultResult<Self> {
        let value = value.into();
        validate_public_id(&value).map_err(VaultError::InvalidInput)?;
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn validate_public_id(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("public id must not be empty".to_string());
    }
    if value.len() > MAX_PUBLIC_ID_LEN {
        return Err(format!(
            "public id exceeds {MAX_PUBLIC_ID_LEN} bytes: {}",
            value.len()
        ));
    }
    if value.chars().any(char::is_control) {
        return Err("public id contains control characters".to_string());
    }
    Ok(())
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PublicId {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PublicId {
    type Error = VaultError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PublicId> for String {
    fn from(id: PublicId) -> Self {
        id.0
    }
}

impl AsRef<str> for PublicId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Plaintext private key material of an unlocked account.
///
/// Owned by the caller and zeroized on drop. The vault never persists it and
/// `Debug` never prints it.
pub struct KeyMaterial(SecretBox<Vec<u8>>);

impl KeyMaterial {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Returns the raw key bytes. Treat this as sensitive material.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }

    /// Length of the key material in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expose().len()
    }

    /// Returns `true` if the key material is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<Vec<u8>> for KeyMaterial {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for KeyMaterial {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
