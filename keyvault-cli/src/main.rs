//! Developer CLI for the account key vault.
//!
//! Passphrases come from `KEYVAULT_PASSPHRASE` / `KEYVAULT_NEW_PASSPHRASE`
//! or a hidden prompt. Unlocked keys are never printed, only their SHA-256
//! fingerprint.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use eyre::{eyre, WrapErr};
use keyvault_core::config::VaultConfig;
use keyvault_core::store::{FileVaultStore, VaultPaths};
use keyvault_core::{KeyMaterial, KeyVault, PublicId};
use sha2::{Digest, Sha256};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Debug, Parser)]
#[command(name = "keyvault", version, about = "Manage passphrase-encrypted account keys")]
struct Cli {
    /// Storage root. Records live under `<root>/keyvault/records`.
    #[arg(long, env = "KEYVAULT_ROOT", global = true)]
    root: Option<PathBuf>,

    /// JSON configuration file. Defaults to `<root>/keyvault/config.json` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct PassphraseArgs {
    /// Current passphrase. Prompted for if unset.
    #[arg(long, env = "KEYVAULT_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Seal a private key under a passphrase.
    Create {
        /// Account public id.
        id: String,
        /// Private key material, hex encoded.
        #[arg(long, env = "KEYVAULT_KEY_HEX", hide_env_values = true)]
        key_hex: String,
        #[command(flatten)]
        passphrase: PassphraseArgs,
    },
    /// Unlock a key and print its fingerprint.
    Open {
        /// Account public id.
        id: String,
        #[command(flatten)]
        passphrase: PassphraseArgs,
    },
    /// Change the passphrase of a key.
    Rekey {
        /// Account public id.
        id: String,
        #[command(flatten)]
        passphrase: PassphraseArgs,
        /// New passphrase. Prompted for if unset.
        #[arg(long, env = "KEYVAULT_NEW_PASSPHRASE", hide_env_values = true)]
        new_passphrase: Option<String>,
    },
    /// Delete a key record.
    Remove {
        /// Account public id.
        id: String,
    },
    /// List accounts with a key record.
    List,
    /// Show non-secret record metadata as JSON.
    Info {
        /// Account public id.
        id: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "keyvault=debug" } else { "keyvault=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_root() -> eyre::Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("keyvault"))
        .ok_or_else(|| eyre!("no data directory on this platform, pass --root"))
}

fn load_config(explicit: Option<&Path>, paths: &VaultPaths) -> eyre::Result<VaultConfig> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "loading config from --config");
        return VaultConfig::from_json_file(path)
            .wrap_err_with(|| format!("loading config {}", path.display()));
    }
    let fallback = paths.config_path();
    if fallback.exists() {
        debug!(path = %fallback.display(), "loading config from vault directory");
        return VaultConfig::from_json_file(&fallback)
            .wrap_err_with(|| format!("loading config {}", fallback.display()));
    }
    debug!("no config file, using defaults");
    Ok(VaultConfig::default())
}

fn passphrase(value: Option<String>, prompt: &str) -> eyre::Result<Zeroizing<String>> {
    match value {
        Some(value) => Ok(Zeroizing::new(value)),
        None => rpassword::prompt_password(prompt)
            .map(Zeroizing::new)
            .wrap_err("reading passphrase"),
    }
}

fn fingerprint(key: &KeyMaterial) -> String {
    hex::encode(Sha256::digest(key.expose()))
}

fn open_vault(cli: &Cli) -> eyre::Result<KeyVault> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => default_root()?,
    };
    debug!(root = %root.display(), "using storage root");
    let store = FileVaultStore::open(&root)
        .wrap_err_with(|| format!("opening vault store at {}", root.display()))?;
    let config = load_config(cli.config.as_deref(), store.paths())?;
    Ok(KeyVault::new(Arc::new(store), config)?)
}

async fn execute(cli: Cli) -> eyre::Result<String> {
    let vault = open_vault(&cli)?;

    let output = match cli.command {
        Command::Create {
            id,
            key_hex,
            passphrase: args,
        } => {
            let id = PublicId::new(id)?;
            let key = Zeroizing::new(hex::decode(key_hex.trim()).wrap_err("decoding --key-hex")?);
            let pass = passphrase(args.passphrase, "Passphrase: ")?;
            vault
                .create(&id, pass.as_bytes(), KeyMaterial::from(key.as_slice()))
                .await?;
            format!("created {id}")
        }
        Command::Open {
            id,
            passphrase: args,
        } => {
            let id = PublicId::new(id)?;
            let pass = passphrase(args.passphrase, "Passphrase: ")?;
            let key = vault.open(&id, pass.as_bytes()).await?;
            format!("{id} sha256:{}", fingerprint(&key))
        }
        Command::Rekey {
            id,
            passphrase: args,
            new_passphrase,
        } => {
            let id = PublicId::new(id)?;
            let old = passphrase(args.passphrase, "Current passphrase: ")?;
            let new = passphrase(new_passphrase, "New passphrase: ")?;
            vault.re_key(&id, old.as_bytes(), new.as_bytes()).await?;
            format!("rekeyed {id}")
        }
        Command::Remove { id } => {
            let id = PublicId::new(id)?;
            vault.remove(&id).await?;
            format!("removed {id}")
        }
        Command::List => vault
            .list_accounts()
            .await?
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
        Command::Info { id } => {
            let id = PublicId::new(id)?;
            let info = vault.record_info(&id).await?;
            serde_json::to_string_pretty(&serde_json::json!({
                "public_id": info.public_id,
                "version": info.version,
                "kdf": info.kdf_params,
                "created_at": info.created_at,
                "updated_at": info.updated_at,
                "needs_upgrade": info.needs_upgrade,
            }))?
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = execute(cli).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
