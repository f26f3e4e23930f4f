//! Key management command.

use super::{key_path, load_key, save_key};
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use sigchain_core::Key;
use std::path::Path;

#[derive(Args)]
pub struct KeyArgs {
    #[command(subcommand)]
    command: KeyCommand,
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Generate a new key pair
    New {
        /// Name for the key file
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Show a stored key's public key
    Show {
        /// Key name (file under keys/ without .json extension)
        name: String,
    },
}

pub fn run(args: KeyArgs, data_dir: &Path) -> Result<()> {
    match args.command {
        KeyCommand::New { name } => new_key(data_dir, name),
        KeyCommand::Show { name } => show_key(data_dir, &name),
    }
}

fn new_key(data_dir: &Path, name: Option<String>) -> Result<()> {
    let key = Key::generate();
    let public_hex = key.public_key_hex();
    let name = name.unwrap_or_else(|| format!("key_{}", &public_hex[2..10]));

    if key_path(data_dir, &name).exists() {
        bail!("Key '{}' already exists", name);
    }

    println!("{}", "Generated new key pair:".bold().cyan());
    println!();
    println!("  Name:        {}", name.bright_yellow());
    println!("  Public Key:  {}", public_hex.bright_black());

    let path = save_key(data_dir, &name, &key)?;

    println!();
    println!(
        "{}  Saved to: {}",
        "✓".green().bold(),
        path.display().to_string().bright_black()
    );
    println!();
    println!("{}", "Keep your private key safe!".yellow().bold());

    Ok(())
}

fn show_key(data_dir: &Path, name: &str) -> Result<()> {
    let key = load_key(data_dir, name)?;

    println!();
    println!("  Name:        {}", name.bright_yellow());
    println!("  Public Key:  {}", key.public_key_hex());
    println!();

    Ok(())
}
