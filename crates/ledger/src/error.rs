//! Ledger errors.

use sigchain_core::Signature;
use sigchain_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The block does not link to the current head. Re-fetch the head and retry.
    #[error("block does not extend the current head")]
    InvalidSequence,

    /// A signature or balance check failed.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("block {0} is already in the ledger")]
    Duplicate(Signature),

    /// Lookup miss. Chain walks treat this as the end of the chain.
    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
