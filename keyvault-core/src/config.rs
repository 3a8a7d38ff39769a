//! Vault configuration.
//!
//! Loaded from JSON. Every field is optional and falls back to its default:
//!
//! ```json
//! {
//!   "kdf": { "m_cost": 19456, "t_cost": 2, "p_cost": 1 },
//!   "mutation_policy": "queue",
//!   "passphrase_policy": { "min_length": 8 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::kdf::{KdfError, KdfParams};
use crate::passphrase::PassphrasePolicy;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// Path of the configuration file.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration is not valid JSON for [`VaultConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The KDF parameters are out of range.
    #[error(transparent)]
    Kdf(#[from] KdfError),
}

/// What a mutation does when another one is already running for the account.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MutationPolicy {
    /// Wait for the running mutation to finish.
    #[default]
    Queue,
    /// Fail immediately with `Busy`.
    Reject,
}

/// Settings for a [`crate::vault::KeyVault`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// KDF costs used for every new encryption (create and rekey).
    pub kdf: KdfParams,
    /// Behaviour of concurrent mutations on one account.
    pub mutation_policy: MutationPolicy,
    /// Rules for user-initiated passphrase changes.
    pub passphrase_policy: PassphrasePolicy,
}

impl VaultConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields and
    /// [`ConfigError::Kdf`] for out-of-range KDF costs.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`VaultConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Kdf`] if the KDF costs are out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kdf.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use test_case::test_case;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = VaultConfig::from_json_str("{}").expect("parse");
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.kdf, KdfParams::interactive());
        assert_eq!(config.mutation_policy, MutationPolicy::Queue);
        assert_eq!(config.passphrase_policy.min_length, 8);
    }

    #[test]
    fn test_full_config() {
        let config = VaultConfig::from_json_str(
            r#"{
                "kdf": { "algorithm": "argon2id", "m_cost": 65536, "t_cost": 3, "p_cost": 2 },
                "mutation_policy": "reject",
                "passphrase_policy": { "min_length": 12 }
            }"#,
        )
        .expect("parse");
        assert_eq!(config.kdf.m_cost, 65_536);
        assert_eq!(config.kdf.t_cost, 3);
        assert_eq!(config.kdf.p_cost, 2);
        assert_eq!(config.mutation_policy, MutationPolicy::Reject);
        assert_eq!(config.passphrase_policy.min_length, 12);
    }

    #[test_case(r#"{ "unknown": 1 }"# ; "unknown top level field")]
    #[test_case(r#"{ "kdf": { "m_cost": 8, "t_cost": 1, "p_cost": 1, "salt": 1 } }"# ; "unknown kdf field")]
    #[test_case(r#"{ "mutation_policy": "drop" }"# ; "unknown policy")]
    #[test_case("not json" ; "garbage")]
    fn test_parse_errors(json: &str) {
        assert!(matches!(
            VaultConfig::from_json_str(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test_case(r#"{ "kdf": { "m_cost": 8, "t_cost": 0, "p_cost": 1 } }"# ; "zero iterations")]
    #[test_case(r#"{ "kdf": { "m_cost": 262145, "t_cost": 1, "p_cost": 1 } }"# ; "memory above cap")]
    fn test_invalid_kdf_rejected(json: &str) {
        assert!(matches!(
            VaultConfig::from_json_str(json),
            Err(ConfigError::Kdf(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "mutation_policy": "reject" }"#).expect("write");
        let config = VaultConfig::from_json_file(&path).expect("load");
        assert_eq!(config.mutation_policy, MutationPolicy::Reject);

        assert!(matches!(
            VaultConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_mutation_policy_parses_from_str() {
        assert_eq!(MutationPolicy::from_str("queue").ok(), Some(MutationPolicy::Queue));
        assert_eq!(MutationPolicy::from_str("reject").ok(), Some(MutationPolicy::Reject));
        assert!(MutationPolicy::from_str("later").is_err());
        assert_eq!(MutationPolicy::Reject.to_string(), "reject");
    }
}
