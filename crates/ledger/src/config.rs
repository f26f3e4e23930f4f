//! Ledger configuration.

use serde::{Deserialize, Serialize};

/// How `verify_block` checks that senders can cover their transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceCheck {
    /// Each transaction is checked on its own against the sender's stored
    /// balance. Several transactions from one sender in a single block are
    /// not checked jointly.
    #[default]
    Global,
    /// Transactions are checked left to right, debiting each sender as the
    /// block is walked, so a block cannot overspend.
    Running,
}

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub balance_check: BalanceCheck,
}

impl LedgerConfig {
    pub fn with_balance_check(balance_check: BalanceCheck) -> Self {
        Self { balance_check }
    }
}
