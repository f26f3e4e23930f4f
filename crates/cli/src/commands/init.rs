//! Initialize ledger command.

use super::{open_ledger, save_config, save_key};
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use sigchain_core::{Block, Key};
use sigchain_ledger::{BalanceCheck, GenesisOutcome, LedgerConfig, GENESIS_AMOUNT};
use std::fs;
use std::path::Path;

/// Name of the key the genesis block mints to.
pub const GENESIS_KEY_NAME: &str = "genesis";

#[derive(Clone, Copy, ValueEnum)]
enum BalancePolicy {
    /// Check each transaction against the stored balance
    Global,
    /// Debit senders as the block is walked
    Running,
}

impl From<BalancePolicy> for BalanceCheck {
    fn from(policy: BalancePolicy) -> Self {
        match policy {
            BalancePolicy::Global => BalanceCheck::Global,
            BalancePolicy::Running => BalanceCheck::Running,
        }
    }
}

#[derive(Args)]
pub struct InitArgs {
    /// Amount minted to the genesis key
    #[arg(short, long, default_value_t = GENESIS_AMOUNT)]
    amount: u64,

    /// How blocks are checked for overspending
    #[arg(short, long, value_enum, default_value = "global")]
    balance_check: BalancePolicy,
}

pub fn run(args: InitArgs, data_dir: &Path) -> Result<()> {
    println!("{}", "Initializing sigchain...".bold().cyan());
    println!();

    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    println!("{}  Created data directory", "✓".green().bold());

    let ledger = open_ledger(data_dir)?;
    if ledger.block_count()? > 0 {
        bail!("Ledger in {:?} is already initialized", data_dir);
    }

    let config = LedgerConfig::with_balance_check(args.balance_check.into());
    let config_file = save_config(data_dir, &config)?;
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        config_file.display().to_string().bright_black()
    );

    let genesis_key = Key::generate();
    let key_file = save_key(data_dir, GENESIS_KEY_NAME, &genesis_key)?;
    println!(
        "{}  Saved genesis key to: {}",
        "✓".green().bold(),
        key_file.display().to_string().bright_black()
    );

    let genesis = Block::genesis(&genesis_key, args.amount)?;
    if ledger.save_genesis_block(&genesis)? == GenesisOutcome::AlreadySet {
        bail!("Ledger in {:?} is already initialized", data_dir);
    }
    let signature = genesis.signature().map(|s| s.to_hex()).unwrap_or_default();

    println!();
    println!("{}  Created genesis block", "✓".green().bold());
    println!("    Signature: {}", signature.bright_yellow());
    println!("    Minted:    {}", args.amount.to_string().bright_cyan());

    println!();
    println!("{}", "Ledger initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!("  • Use {} to create keys", "sigchain key new".bright_cyan());
    println!("  • Use {} to send transfers", "sigchain send".bright_cyan());
    println!("  • Use {} to inspect the head", "sigchain block latest".bright_cyan());

    Ok(())
}
