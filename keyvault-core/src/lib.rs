//! On-device account key vault.
//!
//! Keeps each wallet account's private key encrypted under a passphrase:
//! Argon2id derives the key, XChaCha20-Poly1305 seals the material, and
//! records are replaced atomically so a crash never leaves a torn record.
//! [`vault::KeyVault`] is the entry point.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod error;
pub use error::*;

pub mod cipher;
pub mod config;
pub mod kdf;
pub mod lock;
pub mod logger;
pub mod passphrase;
pub mod record;
pub mod registry;
pub mod store;
pub mod types;
pub mod vault;

pub use types::{KeyMaterial, PublicId};
pub use vault::{KeyVault, RecordInfo};
