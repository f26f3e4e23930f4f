//! sigchain CLI entry point.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sigchain")]
#[command(about = "A signed, hash-linked transaction ledger", long_about = None)]
struct Cli {
    /// Directory holding the ledger, keys and configuration
    #[arg(short, long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd, &cli.data_dir) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("sigchain - A signed, hash-linked transaction ledger");
            println!("Run 'sigchain --help' for usage information.");
        }
    }
}
