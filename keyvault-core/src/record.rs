//! Encrypted account key record and its on-disk encoding.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ magic "AKVR"        4 bytes  │
//! │ version (u16, BE)   2 bytes  │
//! ├──────────────────────────────┤
//! │ body (CBOR)         rest     │  schema selected by version
//! └──────────────────────────────┘
//! ```
//!
//! The version comes first so a decoder can pick the body schema before it
//! touches anything else. Decoding checks structure only; it never runs the
//! KDF or the cipher.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cipher::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};
use crate::kdf::{KdfAlgorithm, KdfParams};
use crate::types::PublicId;

/// Magic bytes at the start of every encoded record.
pub const RECORD_MAGIC: &[u8; 4] = b"AKVR";

/// Version 1: Argon2id + XChaCha20-Poly1305, CBOR body.
pub const RECORD_VERSION_V1: u16 = 1;

/// Version written by this build.
pub const CURRENT_RECORD_VERSION: u16 = RECORD_VERSION_V1;

/// Largest accepted plaintext key material in bytes.
pub const MAX_KEY_MATERIAL_LEN: usize = 4096;

/// Size of the fixed prefix: magic(4) + version(2).
const PREFIX_SIZE: usize = 6;

/// Domain separation label for the associated data.
const LABEL_RECORD_AAD: &[u8] = b"keyvault:account-key-record";

/// Structural problems found while decoding a record.
///
/// Never shown to vault callers; the service reports all of these as a wrong
/// passphrase.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// Input shorter than the fixed prefix.
    #[error("record too short: {0} bytes")]
    TooShort(usize),
    /// Magic bytes do not match.
    #[error("bad record magic")]
    BadMagic,
    /// Version is not known to this build.
    #[error("unsupported record version: {0}")]
    UnsupportedVersion(u16),
    /// Body is not valid CBOR for the version's schema.
    #[error("malformed record body: {0}")]
    Malformed(String),
    /// KDF algorithm identifier is not known.
    #[error("unknown kdf algorithm: {0}")]
    UnknownKdfAlgorithm(u8),
    /// A field failed validation.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Name of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The record could not be serialized.
    #[error("record encoding failed: {0}")]
    Encoding(String),
}

/// One account's encrypted private key, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKeyRecord {
    /// Account this record belongs to.
    pub public_id: PublicId,
    /// Algorithm version tag.
    pub version: u16,
    /// KDF parameters used to derive the encryption key.
    pub kdf_params: KdfParams,
    /// Per-record KDF salt.
    pub salt: [u8; SALT_SIZE],
    /// Per-encryption nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Encrypted key material with the authentication tag appended.
    pub ciphertext: Vec<u8>,
    /// Creation time, Unix seconds.
    pub created_at: u64,
    /// Last rekey time, Unix seconds.
    pub updated_at: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KdfBodyV1 {
    alg: u8,
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordBodyV1 {
    public_id: String,
    kdf: KdfBodyV1,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    created_at: u64,
    updated_at: u64,
}

impl AccountKeyRecord {
    /// Serializes the record.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnsupportedVersion`] if the record carries a
    /// version this build cannot write, or [`FormatError::Encoding`] if
    /// serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        if self.version != RECORD_VERSION_V1 {
            return Err(FormatError::UnsupportedVersion(self.version));
        }
        let body = RecordBodyV1 {
            public_id: self.public_id.as_str().to_string(),
            kdf: KdfBodyV1 {
                alg: self.kdf_params.algorithm.id(),
                m_cost: self.kdf_params.m_cost,
                t_cost: self.kdf_params.t_cost,
                p_cost: self.kdf_params.p_cost,
            },
            salt: self.salt.to_vec(),
            nonce: self.nonce.to_vec(),
            ciphertext: self.ciphertext.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        let mut bytes = Vec::with_capacity(PREFIX_SIZE + self.ciphertext.len() * 2 + 128);
        bytes.extend_from_slice(RECORD_MAGIC);
        bytes.extend_from_slice(&self.version.to_be_bytes());
        ciborium::ser::into_writer(&body, &mut bytes)
            .map_err(|err| FormatError::Encoding(err.to_string()))?;
        Ok(bytes)
    }

    /// Parses and validates an encoded record.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] describing the first structural problem.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < PREFIX_SIZE {
            return Err(FormatError::TooShort(bytes.len()));
        }
        let (prefix, body) = bytes.split_at(PREFIX_SIZE);
        if &prefix[..4] != RECORD_MAGIC {
            return Err(FormatError::BadMagic);
        }
        let version = u16::from_be_bytes([prefix[4], prefix[5]]);
        match version {
            RECORD_VERSION_V1 => Self::decode_v1(body),
            other => Err(FormatError::UnsupportedVersion(other)),
        }
    }

    fn decode_v1(body: &[u8]) -> Result<Self, FormatError> {
        let mut reader = body;
        let body: RecordBodyV1 = ciborium::de::from_reader(&mut reader)
            .map_err(|err| FormatError::Malformed(err.to_string()))?;
        if !reader.is_empty() {
            return Err(FormatError::Malformed(format!(
                "{} trailing bytes after body",
                reader.len()
            )));
        }

        let algorithm = KdfAlgorithm::from_id(body.kdf.alg)
            .ok_or(FormatError::UnknownKdfAlgorithm(body.kdf.alg))?;
        let kdf_params = KdfParams {
            algorithm,
            m_cost: body.kdf.m_cost,
            t_cost: body.kdf.t_cost,
            p_cost: body.kdf.p_cost,
        };

        let salt = fixed::<SALT_SIZE>("salt", &body.salt)?;
        let nonce = fixed::<NONCE_SIZE>("nonce", &body.nonce)?;

        if body.ciphertext.len() <= TAG_SIZE
            || body.ciphertext.len() > TAG_SIZE + MAX_KEY_MATERIAL_LEN
        {
            return Err(FormatError::InvalidField {
                field: "ciphertext",
                reason: format!("length {} out of range", body.ciphertext.len()),
            });
        }

        kdf_params.validate().map_err(|err| FormatError::InvalidField {
            field: "kdf",
            reason: err.to_string(),
        })?;

        let public_id = PublicId::new(body.public_id).map_err(|err| FormatError::InvalidField {
            field: "public_id",
            reason: err.to_string(),
        })?;

        if body.created_at > body.updated_at {
            return Err(FormatError::InvalidField {
                field: "updated_at",
                reason: "earlier than created_at".to_string(),
            });
        }

        Ok(Self {
            public_id,
            version: RECORD_VERSION_V1,
            kdf_params,
            salt,
            nonce,
            ciphertext: body.ciphertext,
            created_at: body.created_at,
            updated_at: body.updated_at,
        })
    }

    /// Associated data bound into the ciphertext.
    ///
    /// Format: `label || len(public_id) u16 || public_id || version u16 ||
    /// alg u8 || m_cost u32 || t_cost u32 || p_cost u32 || salt ||
    /// created_at u64 || updated_at u64`, integers big-endian.
    #[must_use]
    pub fn associated_data(&self) -> Vec<u8> {
        build_associated_data(
            &self.public_id,
            self.version,
            &self.kdf_params,
            &self.salt,
            self.created_at,
            self.updated_at,
        )
    }
}

/// Builds the associated data for a record header before the ciphertext exists.
pub(crate) fn build_associated_data(
    public_id: &PublicId,
    version: u16,
    kdf_params: &KdfParams,
    salt: &[u8; SALT_SIZE],
    created_at: u64,
    updated_at: u64,
) -> Vec<u8> {
    let id = public_id.as_str().as_bytes();
    let mut aad = Vec::with_capacity(LABEL_RECORD_AAD.len() + 2 + id.len() + 2 + 13 + SALT_SIZE + 16);
    aad.extend_from_slice(LABEL_RECORD_AAD);
    // PublicId is capped well below u16::MAX.
    aad.extend_from_slice(&u16::try_from(id.len()).unwrap_or(u16::MAX).to_be_bytes());
    aad.extend_from_slice(id);
    aad.extend_from_slice(&version.to_be_bytes());
    aad.push(kdf_params.algorithm.id());
    aad.extend_from_slice(&kdf_params.m_cost.to_be_bytes());
    aad.extend_from_slice(&kdf_params.t_cost.to_be_bytes());
    aad.extend_from_slice(&kdf_params.p_cost.to_be_bytes());
    aad.extend_from_slice(salt);
    aad.extend_from_slice(&created_at.to_be_bytes());
    aad.extend_from_slice(&updated_at.to_be_bytes());
    aad
}

fn fixed<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], FormatError> {
    bytes.try_into().map_err(|_| FormatError::InvalidField {
        field,
        reason: format!("expected {N} bytes, got {}", bytes.len()),
    })
}
