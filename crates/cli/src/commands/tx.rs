//! Transfer, balance and transaction inspection commands.

use super::{load_key, open_ledger, resolve_public_key};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use sigchain_core::{Block, Signature, Transaction};
use sigchain_ledger::LedgerError;
use std::path::Path;

#[derive(Args)]
pub struct SendArgs {
    /// Sender key name
    #[arg(short, long)]
    from: String,

    /// Recipient public key (hex) or key name
    #[arg(short, long)]
    to: String,

    /// Amount to send
    #[arg(short, long)]
    amount: u64,

    /// Key name that signs the block
    #[arg(short, long)]
    verifier: String,

    /// Also delegate the sender's authority to the recipient
    #[arg(long)]
    delegate: bool,
}

#[derive(Args)]
pub struct TxArgs {
    #[command(subcommand)]
    command: TxCommand,
}

#[derive(Subcommand)]
enum TxCommand {
    /// Show a stored transaction
    Show {
        /// Transaction signature (hex)
        signature: String,
    },
    /// Decode a transaction from its hex binary form
    Decode {
        /// Hex-encoded transaction bytes
        hex: String,
    },
}

pub fn run(args: TxArgs, data_dir: &Path) -> Result<()> {
    match args.command {
        TxCommand::Show { signature } => show_transaction(data_dir, &signature),
        TxCommand::Decode { hex } => decode_transaction(&hex),
    }
}

pub fn send(args: SendArgs, data_dir: &Path) -> Result<()> {
    let ledger = open_ledger(data_dir)?;
    let sender = load_key(data_dir, &args.from)?;
    let verifier = load_key(data_dir, &args.verifier)?;
    let recipient = resolve_public_key(data_dir, &args.to)?;

    let link = match ledger.get_last_transaction(&sender.public_key()) {
        Ok(previous) => previous.signature().copied().unwrap_or(Signature::ZERO),
        Err(LedgerError::NotFound(_)) => Signature::ZERO,
        Err(e) => return Err(e.into()),
    };

    println!("{}", "Signing transaction...".bold().cyan());
    let tx = Transaction::new(link, sender.public_key(), recipient, args.amount, args.delegate)
        .signed(&sender)
        .with_context(|| format!("Failed to sign with key '{}'", args.from))?;

    let head = ledger
        .get_latest_block()
        .with_context(|| "Ledger has no blocks. Did you run 'sigchain init'?")?;
    let head_signature = *head
        .signature()
        .with_context(|| "Latest block is not signed")?;
    let block = Block::new(head_signature, vec![tx.clone()], verifier.public_key())
        .signed(&verifier)
        .with_context(|| format!("Failed to sign block with key '{}'", args.verifier))?;

    ledger
        .save_new_block(&block)
        .with_context(|| "Ledger rejected the block")?;

    println!();
    println!("{}  Transaction accepted", "✓".green().bold());
    print_transaction(&tx);
    println!(
        "  Block:        {}",
        block.signature().map(|s| s.to_hex()).unwrap_or_default().bright_yellow()
    );

    Ok(())
}

pub fn balance(target: &str, data_dir: &Path) -> Result<()> {
    let public_key = resolve_public_key(data_dir, target)?;
    let ledger = open_ledger(data_dir)?;
    let balance = ledger.get_balance(&public_key)?;

    println!();
    println!("  Public Key: {}", public_key.to_hex().bright_yellow());
    println!("  Balance:    {}", balance.to_string().bright_green().bold());
    println!();

    Ok(())
}

fn show_transaction(data_dir: &Path, signature_hex: &str) -> Result<()> {
    let signature = Signature::from_hex(signature_hex)
        .with_context(|| format!("Invalid signature: {}", signature_hex))?;
    let ledger = open_ledger(data_dir)?;
    let tx = ledger.get_transaction(&signature)?;

    println!();
    print_transaction(&tx);
    println!("  Verified:     {}", verified_label(tx.verify_signature()));
    println!();

    Ok(())
}

fn decode_transaction(hex: &str) -> Result<()> {
    let tx = Transaction::from_hex(hex.trim()).with_context(|| "Failed to decode transaction")?;

    println!();
    print_transaction(&tx);
    println!("  Verified:     {}", verified_label(tx.verify_signature()));
    println!();

    Ok(())
}

pub(crate) fn print_transaction(tx: &Transaction) {
    let signature = tx.signature().map(|s| s.to_hex()).unwrap_or_else(|| "<unsigned>".into());
    println!("  Signature:    {}", signature.bright_yellow());
    println!("  Created:      {}", tx.creation_time());
    println!("  Link:         {}", tx.merkle_hash().to_hex().bright_black());
    println!("  From:         {}", tx.input().to_hex());
    println!("  To:           {}", tx.output().to_hex());
    println!("  Amount:       {}", tx.amount().to_string().bright_cyan());
    if tx.is_delegating() {
        println!("  Delegating:   {}", "yes".yellow());
    }
}

pub(crate) fn verified_label(verified: bool) -> colored::ColoredString {
    if verified {
        "yes".green()
    } else {
        "no".red()
    }
}
