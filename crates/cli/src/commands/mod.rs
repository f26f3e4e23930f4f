//! CLI commands module.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use sigchain_core::{Key, PublicKey};
use sigchain_ledger::{Ledger, LedgerConfig};
use sigchain_storage::Storage;
use std::fs;
use std::path::{Path, PathBuf};

mod block;
mod demo;
mod init;
mod key;
mod tx;

#[derive(Subcommand)]
pub enum Commands {
    /// Key management
    Key(key::KeyArgs),
    /// Initialize a new ledger with a genesis block
    Init(init::InitArgs),
    /// Send an amount in a new one-transaction block
    Send(tx::SendArgs),
    /// Show the balance of a public key or named key
    Balance {
        /// Public key (hex) or key name
        target: String,
    },
    /// Block inspection
    Block(block::BlockArgs),
    /// Transaction inspection
    Tx(tx::TxArgs),
    /// Check the chain for gaps below the latest block
    Verify,
    /// Run the generator against a temporary ledger
    Demo(demo::DemoArgs),
}

pub fn run(cmd: Commands, data_dir: &Path) -> Result<()> {
    match cmd {
        Commands::Key(args) => key::run(args, data_dir),
        Commands::Init(args) => init::run(args, data_dir),
        Commands::Send(args) => tx::send(args, data_dir),
        Commands::Balance { target } => tx::balance(&target, data_dir),
        Commands::Block(args) => block::run(args, data_dir),
        Commands::Tx(args) => tx::run(args, data_dir),
        Commands::Verify => block::verify(data_dir),
        Commands::Demo(args) => demo::run(args),
    }
}

// =============================================================================
// Data directory layout
// =============================================================================

const CONFIG_FILE: &str = "config.json";
const DB_DIR: &str = "db";
const KEYS_DIR: &str = "keys";

/// Key material as stored in `<data>/keys/<name>.json`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct KeyFile {
    pub public_key: String,
    pub private_key: String,
}

pub(crate) fn key_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(KEYS_DIR).join(format!("{}.json", name))
}

pub(crate) fn save_key(data_dir: &Path, name: &str, key: &Key) -> Result<PathBuf> {
    let keys_dir = data_dir.join(KEYS_DIR);
    fs::create_dir_all(&keys_dir)
        .with_context(|| format!("Failed to create key directory: {:?}", keys_dir))?;

    let file = KeyFile {
        public_key: key.public_key_hex(),
        private_key: key.private_key_hex()?,
    };
    let path = key_path(data_dir, name);
    fs::write(&path, serde_json::to_string_pretty(&file)?)
        .with_context(|| format!("Failed to write key file: {:?}", path))?;
    Ok(path)
}

pub(crate) fn load_key(data_dir: &Path, name: &str) -> Result<Key> {
    let path = key_path(data_dir, name);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read key '{}'. Create it with 'sigchain key new'", name))?;
    let file: KeyFile = serde_json::from_str(&content)
        .with_context(|| format!("Malformed key file: {:?}", path))?;
    let key = Key::from_private_hex(&file.private_key)
        .with_context(|| format!("Invalid private key in {:?}", path))?;
    Ok(key)
}

/// A key name with a file under `keys/`, or a hex-encoded public key.
pub(crate) fn resolve_public_key(data_dir: &Path, target: &str) -> Result<PublicKey> {
    if key_path(data_dir, target).exists() {
        return Ok(load_key(data_dir, target)?.public_key());
    }
    PublicKey::from_hex(target)
        .with_context(|| format!("'{}' is neither a key name nor a hex public key", target))
}

pub(crate) fn save_config(data_dir: &Path, config: &LedgerConfig) -> Result<PathBuf> {
    let path = data_dir.join(CONFIG_FILE);
    fs::write(&path, serde_json::to_string_pretty(config)?)
        .with_context(|| format!("Failed to write config: {:?}", path))?;
    Ok(path)
}

/// The stored configuration, or the default one if none was written.
pub(crate) fn load_config(data_dir: &Path) -> Result<LedgerConfig> {
    let path = data_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(LedgerConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    serde_json::from_str(&content).with_context(|| format!("Malformed config: {:?}", path))
}

pub(crate) fn open_ledger(data_dir: &Path) -> Result<Ledger> {
    let config = load_config(data_dir)?;
    let storage = Storage::open(data_dir.join(DB_DIR))
        .with_context(|| "Failed to open storage. Did you run 'sigchain init'?")?;
    Ok(Ledger::with_config(storage, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigchain_ledger::BalanceCheck;
    use tempfile::TempDir;

    #[test]
    fn test_key_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let key = Key::generate();

        let path = save_key(dir.path(), "alice", &key).unwrap();
        assert!(path.ends_with("keys/alice.json"));

        let loaded = load_key(dir.path(), "alice").unwrap();
        assert_eq!(loaded.public_key(), key.public_key());
        assert!(loaded.has_private_key());
    }

    #[test]
    fn test_missing_key_file() {
        let dir = TempDir::new().unwrap();
        assert!(load_key(dir.path(), "nobody").is_err());
    }

    #[test]
    fn test_resolve_public_key() {
        let dir = TempDir::new().unwrap();
        let key = Key::generate();
        save_key(dir.path(), "bob", &key).unwrap();

        let by_name = resolve_public_key(dir.path(), "bob").unwrap();
        let by_hex = resolve_public_key(dir.path(), &key.public_key_hex().to_uppercase()).unwrap();
        assert_eq!(by_name, key.public_key());
        assert_eq!(by_hex, key.public_key());
        assert!(resolve_public_key(dir.path(), "not-a-key").is_err());
    }

    #[test]
    fn test_config_defaults_and_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), LedgerConfig::default());

        let config = LedgerConfig::with_balance_check(BalanceCheck::Running);
        save_config(dir.path(), &config).unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), config);
    }
}
