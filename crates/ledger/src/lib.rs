//! Ledger orchestration for sigchain.
//!
//! This crate brings the core types and the record store together:
//! - **Ledger**: insertion ordering, chain-linkage validation, balance checks,
//!   chain walks and gap detection
//! - **Config**: the balance policy used when verifying blocks
//! - **Generator**: synthetic keys, transactions and blocks
//!
//! # Example
//!
//! ```rust,no_run
//! use sigchain_ledger::{Generator, Ledger};
//! use sigchain_storage::Storage;
//!
//! let storage = Storage::open("./ledger_data").unwrap();
//! let ledger = Ledger::new(storage);
//!
//! let mut generator = Generator::new(4);
//! ledger.save_genesis_block(&generator.genesis_block().unwrap()).unwrap();
//!
//! let block = generator.distribution_block(&ledger, 1_000).unwrap();
//! ledger.save_new_block(&block).unwrap();
//!
//! assert!(ledger.verify_ledger_integrity().unwrap());
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod ledger;

// Re-export commonly used types
pub use config::{BalanceCheck, LedgerConfig};
pub use error::{LedgerError, Result};
pub use generator::{Generator, GeneratorError, COIN, GENESIS_AMOUNT};
pub use ledger::{GenesisOutcome, Ledger, MissingBlockOutcome};
