//! Checks applied to a user's request to change an account passphrase.
//!
//! These mirror the change-passphrase form of the wallet: the current
//! passphrase must be filled in, the new one must be long enough and the
//! confirmation must match. They run before the vault is touched. The vault's
//! own `create`, `open` and `re_key` accept any byte string.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Default minimum length of a new passphrase, in characters.
pub const DEFAULT_MIN_LENGTH: usize = 8;

/// Rules a new passphrase must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PassphrasePolicy {
    /// Minimum number of characters in a new passphrase.
    pub min_length: usize,
}

impl Default for PassphrasePolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

/// Why a passphrase change request was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PassphraseIssue {
    /// The current passphrase was left empty.
    #[error("current passphrase is empty")]
    CurrentEmpty,
    /// The new passphrase is shorter than the policy allows.
    #[error("new passphrase must be at least {min} characters")]
    TooShort {
        /// Required minimum length.
        min: usize,
    },
    /// The confirmation differs from the new passphrase.
    #[error("passphrase confirmation does not match")]
    ConfirmationMismatch,
}

/// A change-passphrase request as entered by the user.
pub struct PassphraseChange {
    current: Zeroizing<String>,
    new: Zeroizing<String>,
    confirmation: Zeroizing<String>,
}

impl PassphraseChange {
    /// Captures the three form fields.
    #[must_use]
    pub fn new(
        current: impl Into<String>,
        new: impl Into<String>,
        confirmation: impl Into<String>,
    ) -> Self {
        Self {
            current: Zeroizing::new(current.into()),
            new: Zeroizing::new(new.into()),
            confirmation: Zeroizing::new(confirmation.into()),
        }
    }

    /// Checks the request against `policy`, reporting the first problem.
    ///
    /// # Errors
    ///
    /// Returns the [`PassphraseIssue`] that blocks the change.
    pub fn validate(&self, policy: &PassphrasePolicy) -> Result<(), PassphraseIssue> {
        if self.current.is_empty() {
            return Err(PassphraseIssue::CurrentEmpty);
        }
        if self.new.chars().count() < policy.min_length {
            return Err(PassphraseIssue::TooShort {
                min: policy.min_length,
            });
        }
        if *self.new != *self.confirmation {
            return Err(PassphraseIssue::ConfirmationMismatch);
        }
        Ok(())
    }

    /// The current passphrase bytes.
    #[must_use]
    pub fn current(&self) -> &[u8] {
        self.current.as_bytes()
    }

    /// The new passphrase bytes.
    #[must_use]
    pub fn new_passphrase(&self) -> &[u8] {
        self.new.as_bytes()
    }
}

impl fmt::Debug for PassphraseChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseChange")
            .field("current", &"[REDACTED]")
            .field("new", &"[REDACTED]")
            .field("confirmation", &"[REDACTED]")
            .finish()
    }
}
