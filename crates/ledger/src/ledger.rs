//! The ledger: ordered insertion, chain-linkage validation, balances and gap detection.
//!
//! Every block links to its predecessor through `merkle_hash`, which holds the
//! predecessor's signature. The genesis block links to the zero sentinel.

use crate::config::{BalanceCheck, LedgerConfig};
use crate::error::{LedgerError, Result};
use parking_lot::RwLock;
use sigchain_core::{Block, PublicKey, Signature, Transaction};
use sigchain_storage::{RecordStore, Storage};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Result of [`Ledger::save_genesis_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenesisOutcome {
    /// The store was empty and the block was saved.
    Saved,
    /// The store already holds blocks; nothing was written.
    AlreadySet,
}

/// Result of [`Ledger::save_missing_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingBlockOutcome {
    /// The block connects to a stored block and was saved.
    Inserted,
    /// The block connects to nothing stored and was dropped.
    Unconnected,
}

/// A signed block chain on top of a record store.
///
/// Writes hold an exclusive guard for their whole read-check-write sequence.
/// Chain walks hold a shared guard, so they observe a consistent chain.
pub struct Ledger<S: RecordStore = Storage> {
    store: S,
    config: LedgerConfig,
    lock: RwLock<()>,
}

impl<S: RecordStore> Ledger<S> {
    /// Create a ledger with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            lock: RwLock::new(()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The backing store. Writes made through it bypass every ledger check.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Save the first block of the chain.
    pub fn save_genesis_block(&self, block: &Block) -> Result<GenesisOutcome> {
        let _guard = self.lock.write();

        if !block.is_signed() {
            return Err(LedgerError::InvalidBlock("genesis block is not signed".into()));
        }
        if self.store.count::<Block>()? > 0 {
            debug!("Genesis already set, ignoring block");
            return Ok(GenesisOutcome::AlreadySet);
        }

        self.store.insert_block(block)?;
        info!("Genesis block saved: {}", short(block.signature()));
        Ok(GenesisOutcome::Saved)
    }

    /// Append a block to the head of the chain.
    pub fn save_new_block(&self, block: &Block) -> Result<()> {
        let _guard = self.lock.write();

        let head = self.latest_block()?;
        let extends_head = head
            .as_ref()
            .and_then(Block::signature)
            .is_some_and(|head_signature| head_signature == block.merkle_hash());
        if !extends_head {
            warn!(
                "Rejected block {}: link {} does not match the head",
                short(block.signature()),
                short(Some(block.merkle_hash()))
            );
            return Err(LedgerError::InvalidSequence);
        }

        if let Some(reason) = self.block_rejection(block)? {
            warn!("Rejected block {}: {}", short(block.signature()), reason);
            return Err(LedgerError::InvalidBlock(reason));
        }

        self.store.insert_block(block)?;
        info!(
            "Block saved: {} ({} transactions)",
            short(block.signature()),
            block.transaction_count()
        );
        Ok(())
    }

    /// Backfill a block found missing by a chain walk.
    ///
    /// The block is stored only if it connects to the stored chain: either a
    /// stored block links to it, or it links to a stored block.
    pub fn save_missing_block(&self, block: &Block) -> Result<MissingBlockOutcome> {
        let _guard = self.lock.write();

        let signature = *block
            .signature()
            .ok_or_else(|| LedgerError::InvalidBlock("block is not signed".into()))?;
        if block.verify_signature() && self.store.contains::<Block>(&signature)? {
            return Err(LedgerError::Duplicate(signature));
        }

        if let Some(reason) = self.block_rejection(block)? {
            warn!("Rejected missing block {}: {}", short(block.signature()), reason);
            return Err(LedgerError::InvalidBlock(reason));
        }

        let has_successor = self.next_block_of(block)?.is_some();
        let has_predecessor = self.previous_block_of(block)?.is_some();
        if !has_successor && !has_predecessor {
            warn!("Dropped unconnected block {}", signature);
            return Ok(MissingBlockOutcome::Unconnected);
        }

        self.store.insert_block(block)?;
        info!("Missing block saved: {}", signature);
        Ok(MissingBlockOutcome::Inserted)
    }

    /// Delete every transaction, then every block.
    pub fn clear_ledger(&self) -> Result<()> {
        let _guard = self.lock.write();

        let transactions = self.store.delete_all::<Transaction>()?;
        let blocks = self.store.delete_all::<Block>()?;
        info!("Ledger cleared: {} blocks, {} transactions", blocks, transactions);
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn is_block_in_ledger(&self, block: &Block) -> Result<bool> {
        let signature = block
            .signature()
            .ok_or_else(|| LedgerError::InvalidBlock("block is not signed".into()))?;
        Ok(self.store.get::<Block>(signature)?.is_some())
    }

    pub fn get_block(&self, signature: &Signature) -> Result<Block> {
        self.store
            .get(signature)?
            .ok_or_else(|| LedgerError::NotFound(format!("block {}", signature)))
    }

    pub fn get_transaction(&self, signature: &Signature) -> Result<Transaction> {
        self.store
            .get(signature)?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", signature)))
    }

    /// The stored block linking to `block`.
    pub fn get_next_block(&self, block: &Block) -> Result<Block> {
        self.next_block_of(block)?
            .ok_or_else(|| LedgerError::NotFound(format!("successor of block {}", short(block.signature()))))
    }

    /// The stored block `block` links to.
    pub fn get_previous_block(&self, block: &Block) -> Result<Block> {
        self.previous_block_of(block)?
            .ok_or_else(|| LedgerError::NotFound(format!("predecessor of block {}", short(block.signature()))))
    }

    /// The stored transaction linking to `tx`.
    pub fn get_next_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        let found = match tx.signature() {
            Some(signature) => self
                .store
                .find_one_where(|candidate: &Transaction| candidate.merkle_hash() == signature)?,
            None => None,
        };
        found.ok_or_else(|| {
            LedgerError::NotFound(format!("successor of transaction {}", short(tx.signature())))
        })
    }

    /// The stored transaction `tx` links to.
    pub fn get_previous_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        self.store.get(tx.merkle_hash())?.ok_or_else(|| {
            LedgerError::NotFound(format!("predecessor of transaction {}", short(tx.signature())))
        })
    }

    /// The block with the latest creation time, ties broken by signature bytes.
    pub fn get_latest_block(&self) -> Result<Block> {
        self.latest_block()?
            .ok_or_else(|| LedgerError::NotFound("latest block".into()))
    }

    /// Received minus sent, over every stored transaction.
    pub fn get_balance(&self, public_key: &PublicKey) -> Result<i128> {
        let _guard = self.lock.read();
        self.balance_of(public_key)
    }

    /// The latest transaction sent by `public_key`.
    pub fn get_last_transaction(&self, public_key: &PublicKey) -> Result<Transaction> {
        // Non-matching transactions all map to `None`, below every match.
        let latest = self.store.max_by_key(|tx: &Transaction| {
            (tx.input() == public_key).then(|| (tx.creation_time(), tx.signature().copied()))
        })?;
        latest
            .filter(|tx| tx.input() == public_key)
            .ok_or_else(|| LedgerError::NotFound(format!("last transaction of {}", public_key)))
    }

    pub fn all_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.store.scan()?)
    }

    pub fn all_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.store.scan()?)
    }

    pub fn block_count(&self) -> Result<usize> {
        Ok(self.store.count::<Block>()?)
    }

    pub fn transaction_count(&self) -> Result<usize> {
        Ok(self.store.count::<Transaction>()?)
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check the block signature, every transaction signature, that no
    /// transaction repeats or is already stored, then balances according to
    /// the configured [`BalanceCheck`].
    pub fn verify_block(&self, block: &Block) -> Result<bool> {
        let _guard = self.lock.read();
        Ok(self.block_rejection(block)?.is_none())
    }

    /// Walk predecessors from `block`. Returns the link of the last block
    /// reached unless that block is the genesis block.
    pub fn find_missing_block_below(&self, block: &Block) -> Result<Option<Signature>> {
        let _guard = self.lock.read();
        self.missing_below(block)
    }

    /// Walk successors from `block`. Returns the signature of the last block
    /// reached, which a missing successor would link to, unless that block is
    /// the current head.
    ///
    /// Unlike [`find_missing_block_below`](Self::find_missing_block_below) this
    /// never reports a block's `merkle_hash` and has no zero-sentinel case: the
    /// only way to tell a gap above from the true end of the chain is to
    /// compare the walk's end with the latest block.
    pub fn find_missing_block_above(&self, block: &Block) -> Result<Option<Signature>> {
        let _guard = self.lock.read();

        let mut current = block.clone();
        let mut steps = 0usize;
        while let Some(next) = self.next_block_of(&current)? {
            current = next;
            steps += 1;
        }
        debug!("Walked {} blocks above {}", steps, short(block.signature()));

        let head = self.latest_block()?;
        let at_head = match (head.as_ref().and_then(Block::signature), current.signature()) {
            (Some(head_signature), Some(signature)) => head_signature == signature,
            _ => false,
        };
        if at_head {
            return Ok(None);
        }
        Ok(current.signature().copied())
    }

    /// True iff the ledger is non-empty and no gap exists below its latest block.
    pub fn verify_ledger_integrity(&self) -> Result<bool> {
        let _guard = self.lock.read();

        let Some(latest) = self.latest_block()? else {
            return Ok(false);
        };
        let gap = self.missing_below(&latest)?;
        if let Some(missing) = &gap {
            warn!("Ledger integrity check found a gap at {}", missing);
        }
        Ok(gap.is_none())
    }

    // =========================================================================
    // Unguarded helpers
    // =========================================================================

    fn latest_block(&self) -> Result<Option<Block>> {
        Ok(self
            .store
            .max_by_key(|block: &Block| (block.creation_time(), block.signature().copied()))?)
    }

    fn next_block_of(&self, block: &Block) -> Result<Option<Block>> {
        let Some(signature) = block.signature() else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_one_where(|candidate: &Block| candidate.merkle_hash() == signature)?)
    }

    fn previous_block_of(&self, block: &Block) -> Result<Option<Block>> {
        Ok(self.store.get(block.merkle_hash())?)
    }

    fn missing_below(&self, block: &Block) -> Result<Option<Signature>> {
        let mut current = block.clone();
        let mut steps = 0usize;
        while let Some(previous) = self.previous_block_of(&current)? {
            current = previous;
            steps += 1;
        }
        debug!("Walked {} blocks below {}", steps, short(block.signature()));

        if current.merkle_hash().is_zero() {
            Ok(None)
        } else {
            Ok(Some(*current.merkle_hash()))
        }
    }

    fn balance_of(&self, public_key: &PublicKey) -> Result<i128> {
        let received = self.store.sum_amount_where(|tx| tx.output() == public_key)?;
        let sent = self.store.sum_amount_where(|tx| tx.input() == public_key)?;
        Ok(received as i128 - sent as i128)
    }

    /// Why `block` fails verification, or `None` if it passes.
    fn block_rejection(&self, block: &Block) -> Result<Option<String>> {
        if !block.verify_signature() {
            return Ok(Some("block signature does not verify".into()));
        }
        for tx in block.transactions() {
            if !tx.verify_signature() {
                return Ok(Some(format!(
                    "transaction {} signature does not verify",
                    short(tx.signature())
                )));
            }
        }

        let mut seen = HashSet::new();
        for signature in block.transactions().iter().filter_map(Transaction::signature) {
            if !seen.insert(signature) {
                return Ok(Some(format!("transaction {} appears twice", short(Some(signature)))));
            }
            if self.store.contains::<Transaction>(signature)? {
                return Ok(Some(format!(
                    "transaction {} is already stored",
                    short(Some(signature))
                )));
            }
        }

        match self.config.balance_check {
            BalanceCheck::Global => {
                for tx in block.transactions() {
                    let balance = self.balance_of(tx.input())?;
                    if balance < i128::from(tx.amount()) {
                        return Ok(Some(insufficient(tx, balance)));
                    }
                }
            }
            BalanceCheck::Running => {
                let mut available: HashMap<&PublicKey, i128> = HashMap::new();
                for tx in block.transactions() {
                    let balance = match available.get(tx.input()) {
                        Some(balance) => *balance,
                        None => self.balance_of(tx.input())?,
                    };
                    if balance < i128::from(tx.amount()) {
                        return Ok(Some(insufficient(tx, balance)));
                    }
                    available.insert(tx.input(), balance - i128::from(tx.amount()));
                }
            }
        }

        Ok(None)
    }
}

fn insufficient(tx: &Transaction, balance: i128) -> String {
    format!(
        "sender {} has balance {} below amount {}",
        tx.input(),
        balance,
        tx.amount()
    )
}

/// First bytes of a signature for log lines.
fn short(signature: Option<&Signature>) -> String {
    match signature {
        Some(signature) => signature.to_hex()[..16].to_string(),
        None => "<unsigned>".into(),
    }
}
