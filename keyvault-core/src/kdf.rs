//! Passphrase key derivation.
//!
//! Turns a passphrase and a per-record salt into a 256-bit symmetric key with
//! Argon2id. The cost parameters travel with every record, so new records can
//! be strengthened without invalidating old ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a derived key in bytes.
pub const KEY_LEN: usize = 32;

/// Minimum accepted salt length in bytes.
pub const MIN_SALT_LEN: usize = 8;

/// Largest accepted Argon2 memory cost in KiB (256 MiB).
///
/// Applies to configuration and to records read from storage alike, so a
/// tampered record cannot demand an allocation a phone cannot serve.
pub const MAX_M_COST_KIB: u32 = 256 * 1024;

// Hard caps on the remaining cost parameters.
const MAX_T_COST: u32 = 64;
const MAX_P_COST: u32 = 16;

/// Errors raised by key derivation.
///
/// Passphrase content never causes an error; only the parameters can be wrong.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KdfError {
    /// The cost parameters are out of range.
    #[error("invalid kdf parameters: {0}")]
    InvalidParams(String),
    /// The salt is shorter than [`MIN_SALT_LEN`].
    #[error("salt must be at least {MIN_SALT_LEN} bytes, got {0}")]
    SaltTooShort(usize),
}

/// Supported password-hashing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    /// Argon2id, version 0x13.
    Argon2id,
}

impl KdfAlgorithm {
    /// Stable numeric identifier used by the record codec.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Argon2id => 1,
        }
    }

    /// Looks up an algorithm by its codec identifier.
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Argon2id),
            _ => None,
        }
    }
}

/// Cost parameters for the KDF.
///
/// # Defaults
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 19 456  | Memory usage in KiB (19 MiB) |
/// | `t_cost`  | 2       | Number of passes |
/// | `p_cost`  | 1       | Degree of parallelism |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KdfParams {
    /// Algorithm the costs apply to.
    #[serde(default = "default_algorithm")]
    pub algorithm: KdfAlgorithm,
    /// Memory cost in KiB. Must be at least `8 * p_cost`.
    pub m_cost: u32,
    /// Time cost (number of passes). Must be at least 1.
    pub t_cost: u32,
    /// Parallelism degree. Must be at least 1.
    pub p_cost: u32,
}

const fn default_algorithm() -> KdfAlgorithm {
    KdfAlgorithm::Argon2id
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

impl KdfParams {
    /// Parameters suited to unlocking on a phone (tens to hundreds of ms).
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }

    /// Smallest legal parameters. Only for tests and tooling.
    #[must_use]
    pub const fn testing() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    /// Checks that every cost field is within range.
    ///
    /// # Errors
    ///
    /// Returns [`KdfError::InvalidParams`] describing the first bad field.
    pub fn validate(&self) -> Result<(), KdfError> {
        if self.t_cost == 0 {
            return Err(KdfError::InvalidParams("t_cost must be at least 1".into()));
        }
        if self.p_cost == 0 {
            return Err(KdfError::InvalidParams("p_cost must be at least 1".into()));
        }
        if self.t_cost > MAX_T_COST {
            return Err(KdfError::InvalidParams(format!(
                "t_cost {} exceeds {MAX_T_COST}",
                self.t_cost
            )));
        }
        if self.p_cost > MAX_P_COST {
            return Err(KdfError::InvalidParams(format!(
                "p_cost {} exceeds {MAX_P_COST}",
                self.p_cost
            )));
        }
        if self.m_cost < 8 * self.p_cost {
            return Err(KdfError::InvalidParams(format!(
                "m_cost {} is below 8 * p_cost",
                self.m_cost
            )));
        }
        if self.m_cost > MAX_M_COST_KIB {
            return Err(KdfError::InvalidParams(format!(
                "m_cost {} exceeds {MAX_M_COST_KIB} KiB",
                self.m_cost
            )));
        }
        Ok(())
    }

    /// Returns `true` if any cost field is lower than in `target`.
    #[must_use]
    pub const fn is_weaker_than(&self, target: &Self) -> bool {
        self.m_cost < target.m_cost || self.t_cost < target.t_cost || self.p_cost < target.p_cost
    }
}

/// 256-bit key derived from a passphrase.
///
/// Zeroized on drop. Neither `Clone` nor `Debug`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Derives a key from `passphrase` and `salt` under `params`.
///
/// Deterministic: identical inputs always give the same key. Any byte string,
/// including the empty one, is a valid passphrase.
///
/// # Errors
///
/// - [`KdfError::SaltTooShort`] if the salt is shorter than [`MIN_SALT_LEN`].
/// - [`KdfError::InvalidParams`] if the cost parameters are out of range.
pub fn derive(passphrase: &[u8], salt: &[u8], params: &KdfParams) -> Result<DerivedKey, KdfError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(KdfError::SaltTooShort(salt.len()));
    }
    params.validate()?;

    match params.algorithm {
        KdfAlgorithm::Argon2id => {
            let argon2_params =
                argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
                    .map_err(|e| KdfError::InvalidParams(e.to_string()))?;
            let argon2 = argon2::Argon2::new(
                argon2::Algorithm::Argon2id,
                argon2::Version::V0x13,
                argon2_params,
            );

            let mut output = DerivedKey([0u8; KEY_LEN]);
            argon2
                .hash_password_into(passphrase, salt, &mut output.0)
                .map_err(|e| KdfError::InvalidParams(e.to_string()))?;
            Ok(output)
        }
    }
}
