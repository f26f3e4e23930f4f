//! Generator demo against a temporary ledger.

use super::block::print_block;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use sigchain_ledger::{Generator, Ledger, COIN};
use sigchain_storage::Storage;

#[derive(Args)]
pub struct DemoArgs {
    /// Number of participant keys
    #[arg(short, long, default_value = "4")]
    keys: usize,

    /// Number of random blocks after the distribution block
    #[arg(short, long, default_value = "3")]
    blocks: usize,

    /// Transactions per random block
    #[arg(short, long, default_value = "2")]
    transactions: usize,

    /// Coins paid to each participant by the distribution block
    #[arg(long, default_value = "1000")]
    grant: u64,
}

pub fn run(args: DemoArgs) -> Result<()> {
    println!("{}", "Running sigchain demo...".bold().cyan());

    let ledger = Ledger::new(Storage::open_temporary()?);
    let mut generator = Generator::new(args.keys);

    let genesis = generator.genesis_block()?;
    ledger.save_genesis_block(&genesis)?;
    println!();
    println!("{}  Genesis block", "✓".green().bold());
    print_block(&genesis);

    let distribution = generator.distribution_block(&ledger, args.grant.saturating_mul(COIN))?;
    ledger.save_new_block(&distribution)?;
    println!("{}  Distribution block", "✓".green().bold());
    print_block(&distribution);

    for i in 0..args.blocks {
        let block = generator.random_block(&ledger, args.transactions)?;
        ledger.save_new_block(&block)?;
        println!("{}  Random block {}", "✓".green().bold(), i + 1);
        print_block(&block);
    }

    println!("{}", "Balances:".bold().cyan());
    for key in generator.keys() {
        let public_key = key.public_key();
        let balance = ledger.get_balance(&public_key)?;
        println!(
            "  {}…  {}",
            &public_key.to_hex()[..18],
            balance.to_string().bright_green()
        );
    }

    println!();
    if ledger.verify_ledger_integrity()? {
        println!(
            "{}  Chain intact ({} blocks)",
            "✓".green().bold(),
            ledger.block_count()?
        );
    } else {
        println!("{}  Chain has a gap", "✗".red().bold());
    }

    Ok(())
}
