//! Authenticated encryption of key material.
//!
//! XChaCha20-Poly1305 with a 24-byte random nonce. The record header is bound
//! as associated data, so tampering with any stored field fails decryption.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::kdf::DerivedKey;

/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Size of the per-record KDF salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Errors raised by the cipher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Wrong key or tampered ciphertext, tag, or associated data.
    ///
    /// The two causes are indistinguishable.
    #[error("authentication failed")]
    AuthenticationFailure,
    /// Encryption refused the input (plaintext too large).
    #[error("encryption failed")]
    EncryptionFailed,
}

/// Generates a fresh random nonce.
#[must_use]
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generates a fresh random KDF salt.
#[must_use]
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Encrypts `plaintext` under `key`, authenticating `aad`.
///
/// Returns the ciphertext with the 16-byte tag appended. The caller must never
/// reuse `nonce` with the same key.
///
/// # Errors
///
/// Returns [`CipherError::EncryptionFailed`] if the AEAD rejects the input.
pub fn encrypt(
    key: &DerivedKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CipherError::EncryptionFailed)
}

/// Decrypts `ciphertext` (with trailing tag) under `key`, verifying `aad`.
///
/// # Errors
///
/// Returns [`CipherError::AuthenticationFailure`] on any mismatch.
pub fn decrypt(
    key: &DerivedKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CipherError::AuthenticationFailure);
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CipherError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive, KdfParams};

    fn key(passphrase: &[u8]) -> DerivedKey {
        derive(passphrase, b"static-test-salt", &KdfParams::testing()).expect("derive")
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = key(b"pw");
        let nonce = generate_nonce();
        let ciphertext = encrypt(&key, &nonce, b"header", b"secret key").expect("encrypt");
        assert_eq!(ciphertext.len(), b"secret key".len() + TAG_SIZE);
        let plaintext = decrypt(&key, &nonce, b"header", &ciphertext).expect("decrypt");
        assert_eq!(plaintext.as_slice(), b"secret key");
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = generate_nonce();
        let ciphertext = encrypt(&key(b"pw"), &nonce, b"", b"secret").expect("encrypt");
        assert_eq!(
            decrypt(&key(b"other"), &nonce, b"", &ciphertext).err(),
            Some(CipherError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_any_bit_flip_fails() {
        let key = key(b"pw");
        let nonce = generate_nonce();
        let ciphertext = encrypt(&key, &nonce, b"header", b"secret").expect("encrypt");

        for index in 0..ciphertext.len() {
            let mut tampered = ciphertext.clone();
            tampered[index] ^= 0x01;
            assert_eq!(
                decrypt(&key, &nonce, b"header", &tampered).err(),
                Some(CipherError::AuthenticationFailure),
                "flip at byte {index} went undetected"
            );
        }

        assert!(decrypt(&key, &nonce, b"headex", &ciphertext).is_err());
        let mut other_nonce = nonce;
        other_nonce[0] ^= 0x80;
        assert!(decrypt(&key, &other_nonce, b"header", &ciphertext).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = key(b"pw");
        let nonce = generate_nonce();
        assert_eq!(
            decrypt(&key, &nonce, b"", &[0u8; TAG_SIZE - 1]).err(),
            Some(CipherError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_randomness_is_fresh() {
        assert_ne!(generate_nonce(), generate_nonce());
        assert_ne!(generate_salt(), generate_salt());
    }
}
