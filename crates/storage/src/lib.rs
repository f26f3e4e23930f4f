//! Persistent storage layer for sigchain.
//!
//! This crate provides the storage backend for the ledger:
//! - A sled wrapper with bincode serialization helpers
//! - The `RecordStore` queries the ledger runs against
//! - Block and transaction records keyed by signature
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! │                  (Ledger, Generator, CLI)                │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   Storage Layer                          │
//! │  ┌──────────────────────────┐  ┌─────────────────────┐  │
//! │  │ RecordStore              │  │ Storage (DB)        │  │
//! │  │  - block: + signature    │  │  - sled wrapper     │  │
//! │  │  - tx: + signature       │  │  - serialization    │  │
//! │  │  - scans and sums        │  │  - atomic batches   │  │
//! │  └──────────────────────────┘  └─────────────────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                    sled Database                         │
//! │              (Embedded Key-Value Store)                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use sigchain_core::{Block, Key};
//! use sigchain_storage::{RecordStore, Storage};
//!
//! let storage = Storage::open("./ledger_data").unwrap();
//!
//! let key = Key::generate();
//! let genesis = Block::genesis(&key, 1_000_000).unwrap();
//! storage.insert_block(&genesis).unwrap();
//!
//! assert_eq!(storage.count::<Block>().unwrap(), 1);
//! ```

pub mod db;
pub mod store;

// Re-export commonly used types
pub use db::{BatchOp, Result, Storage, StorageError};
pub use store::{Record, RecordStore};
