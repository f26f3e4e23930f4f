//! Synthetic keys, transactions and blocks for tests and demos.
//!
//! Generated transfers never exceed what the sender can still spend, counting
//! earlier transfers in the same block, so generated blocks pass either
//! balance policy.

use crate::error::LedgerError;
use crate::ledger::Ledger;
use rand::Rng;
use sigchain_core::{Block, BlockError, Key, PublicKey, Signature, Transaction, TransactionError};
use sigchain_storage::RecordStore;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Smallest units per coin.
pub const COIN: u64 = 100_000_000;

/// Amount minted by [`Generator::genesis_block`].
pub const GENESIS_AMOUNT: u64 = 10_000_000 * COIN;

/// Upper bound of a single random transfer.
pub const MAX_RANDOM_AMOUNT: u64 = 99 * COIN;

/// Errors that can occur while generating entities.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("block error: {0}")]
    Block(#[from] BlockError),

    #[error("latest block is not signed")]
    UnsignedHead,
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Produces keys, signed transactions and signed blocks against a ledger.
pub struct Generator {
    genesis_key: Key,
    keys: Vec<Key>,
    /// Signature of the last transaction generated per sender.
    last_signatures: HashMap<PublicKey, Signature>,
}

impl Generator {
    /// Create a generator with `key_count` participant keys (at least 2).
    pub fn new(key_count: usize) -> Self {
        let keys = (0..key_count.max(2)).map(|_| Key::generate()).collect();
        Self {
            genesis_key: Key::generate(),
            keys,
            last_signatures: HashMap::new(),
        }
    }

    pub fn genesis_key(&self) -> &Key {
        &self.genesis_key
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn random_key(&self) -> &Key {
        &self.keys[rand::thread_rng().gen_range(0..self.keys.len())]
    }

    /// The genesis block minting [`GENESIS_AMOUNT`] to the genesis key.
    pub fn genesis_block(&self) -> Result<Block> {
        Ok(Block::genesis(&self.genesis_key, GENESIS_AMOUNT)?)
    }

    /// A block paying `amount` from the genesis key to every participant.
    pub fn distribution_block<S: RecordStore>(&mut self, ledger: &Ledger<S>, amount: u64) -> Result<Block> {
        let outputs: Vec<PublicKey> = self.keys.iter().map(Key::public_key).collect();
        let mut transactions = Vec::with_capacity(outputs.len());
        for output in outputs {
            transactions.push(self.distribution_transaction(ledger, output, amount)?);
        }
        self.block_on_head(ledger, transactions)
    }

    /// A block of `transaction_count` random transfers between participants (at least 1).
    pub fn random_block<S: RecordStore>(&mut self, ledger: &Ledger<S>, transaction_count: usize) -> Result<Block> {
        let mut pending = HashMap::new();
        let mut transactions = Vec::with_capacity(transaction_count.max(1));
        for _ in 0..transaction_count.max(1) {
            transactions.push(self.random_transfer(ledger, &mut pending)?);
        }
        self.block_on_head(ledger, transactions)
    }

    /// A signed transfer between two distinct random participants.
    pub fn random_transaction<S: RecordStore>(&mut self, ledger: &Ledger<S>) -> Result<Transaction> {
        self.random_transfer(ledger, &mut HashMap::new())
    }

    /// A signed transfer of `amount` from the genesis key to `output`.
    pub fn distribution_transaction<S: RecordStore>(
        &mut self,
        ledger: &Ledger<S>,
        output: PublicKey,
        amount: u64,
    ) -> Result<Transaction> {
        let genesis_key = self.genesis_key.clone();
        self.signed_transfer(ledger, &genesis_key, output, amount)
    }

    fn random_transfer<S: RecordStore>(
        &mut self,
        ledger: &Ledger<S>,
        pending: &mut HashMap<PublicKey, u64>,
    ) -> Result<Transaction> {
        let mut rng = rand::thread_rng();
        let input_index = rng.gen_range(0..self.keys.len());
        let mut output_index = rng.gen_range(0..self.keys.len());
        while output_index == input_index {
            output_index = rng.gen_range(0..self.keys.len());
        }

        let input = self.keys[input_index].clone();
        let output = self.keys[output_index].public_key();

        let spent = pending.get(&input.public_key()).copied().unwrap_or(0);
        let spendable = ledger.get_balance(&input.public_key())? - i128::from(spent);
        let ceiling = u64::try_from(spendable.max(0))
            .unwrap_or(u64::MAX)
            .min(MAX_RANDOM_AMOUNT);
        let amount = rng.gen_range(0..=ceiling);

        let tx = self.signed_transfer(ledger, &input, output, amount)?;
        *pending.entry(input.public_key()).or_insert(0) += amount;
        Ok(tx)
    }

    fn signed_transfer<S: RecordStore>(
        &mut self,
        ledger: &Ledger<S>,
        input: &Key,
        output: PublicKey,
        amount: u64,
    ) -> Result<Transaction> {
        let sender = input.public_key();
        let link = self.previous_link(ledger, &sender)?;

        let tx = Transaction::new(link, sender.clone(), output, amount, false).signed(input)?;
        if let Some(signature) = tx.signature() {
            self.last_signatures.insert(sender, *signature);
        }
        Ok(tx)
    }

    /// The sender's previous transaction signature, or the zero sentinel.
    fn previous_link<S: RecordStore>(&self, ledger: &Ledger<S>, sender: &PublicKey) -> Result<Signature> {
        if let Some(signature) = self.last_signatures.get(sender) {
            return Ok(*signature);
        }
        match ledger.get_last_transaction(sender) {
            Ok(tx) => Ok(tx.signature().copied().unwrap_or(Signature::ZERO)),
            Err(LedgerError::NotFound(_)) => Ok(Signature::ZERO),
            Err(e) => Err(e.into()),
        }
    }

    fn block_on_head<S: RecordStore>(&self, ledger: &Ledger<S>, transactions: Vec<Transaction>) -> Result<Block> {
        let head = ledger.get_latest_block()?;
        let link = *head.signature().ok_or(GeneratorError::UnsignedHead)?;

        let verifier = self.random_key();
        let block = Block::new(link, transactions, verifier.public_key()).signed(verifier)?;
        debug!("Generated block with {} transactions", block.transaction_count());
        Ok(block)
    }
}
