//! Block inspection and chain verification commands.

use super::open_ledger;
use super::tx::{print_transaction, verified_label};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use sigchain_core::{Block, Signature};
use std::path::Path;

#[derive(Args)]
pub struct BlockArgs {
    #[command(subcommand)]
    command: BlockCommand,
}

#[derive(Subcommand)]
enum BlockCommand {
    /// Show the latest block
    Latest,
    /// Show a block by signature
    Show {
        /// Block signature (hex)
        signature: String,
    },
}

pub fn run(args: BlockArgs, data_dir: &Path) -> Result<()> {
    match args.command {
        BlockCommand::Latest => show_latest(data_dir),
        BlockCommand::Show { signature } => show_block(data_dir, &signature),
    }
}

fn show_latest(data_dir: &Path) -> Result<()> {
    let ledger = open_ledger(data_dir)?;
    let block = ledger
        .get_latest_block()
        .with_context(|| "Ledger has no blocks. Did you run 'sigchain init'?")?;

    println!();
    println!("{}", "Latest Block:".bold().cyan());
    print_block(&block);

    Ok(())
}

fn show_block(data_dir: &Path, signature_hex: &str) -> Result<()> {
    let signature = Signature::from_hex(signature_hex)
        .with_context(|| format!("Invalid signature: {}", signature_hex))?;
    let ledger = open_ledger(data_dir)?;
    let block = ledger.get_block(&signature)?;

    println!();
    print_block(&block);

    Ok(())
}

pub fn verify(data_dir: &Path) -> Result<()> {
    let ledger = open_ledger(data_dir)?;
    let intact = ledger.verify_ledger_integrity()?;

    println!();
    if intact {
        println!(
            "{}  Chain intact ({} blocks)",
            "✓".green().bold(),
            ledger.block_count()?
        );
        return Ok(());
    }

    match ledger.get_latest_block() {
        Ok(latest) => {
            println!("{}  Chain has a gap", "✗".red().bold());
            if let Some(missing) = ledger.find_missing_block_below(&latest)? {
                println!("    Missing block: {}", missing.to_hex().bright_yellow());
            }
        }
        Err(_) => println!("{}  Ledger is empty", "✗".red().bold()),
    }

    Ok(())
}

pub(crate) fn print_block(block: &Block) {
    let signature = block
        .signature()
        .map(|s| s.to_hex())
        .unwrap_or_else(|| "<unsigned>".into());

    println!();
    println!("  Signature:    {}", signature.bright_yellow());
    println!("  Created:      {}", block.creation_time());
    if block.is_genesis() {
        println!("  Link:         {}", "genesis".bright_cyan());
    } else {
        println!("  Link:         {}", block.merkle_hash().to_hex().bright_black());
    }
    println!("  Verifier:     {}", block.verifier().to_hex());
    println!("  Verified:     {}", verified_label(block.verify_signature()));
    println!("  Transactions: {}", block.transaction_count());

    for (i, tx) in block.transactions().iter().enumerate() {
        println!();
        println!("  {}", format!("Transaction {}", i).bold());
        print_transaction(tx);
    }
    println!();
}
