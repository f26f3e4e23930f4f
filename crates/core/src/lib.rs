//! Core ledger primitives for sigchain.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - P-256 keys and fixed-size signatures
//! - Canonical little-endian encoding of signable entities
//! - Transactions and their binary layout
//! - Blocks

pub mod block;
pub mod crypto;
pub mod encoding;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockError};
pub use crypto::{Key, KeyError, PublicKey, Signature};
pub use encoding::{encode_signable, Signable, SignableEncoder};
pub use transaction::{Transaction, TransactionError, MAX_SIGNING_ATTEMPTS};
