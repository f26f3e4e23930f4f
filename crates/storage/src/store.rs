//! Record storage for blocks and transactions.
//!
//! Records are keyed by a type prefix followed by their signature, so every
//! query is either a point lookup or a prefix scan over one record type.

use crate::db::{BatchOp, Result, Storage, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sigchain_core::{Block, Signature, Transaction};
use tracing::debug;

/// A persisted entity, keyed by its signature.
pub trait Record: Serialize + DeserializeOwned {
    /// Key prefix shared by every record of this type.
    const PREFIX: &'static [u8];

    /// The signature this record is stored under, if signed.
    fn record_signature(&self) -> Option<&Signature>;

    /// Full storage key of this record.
    fn record_key(&self) -> Result<Vec<u8>> {
        let signature = self.record_signature().ok_or(StorageError::MissingKey)?;
        Ok(Storage::record_key(Self::PREFIX, signature))
    }
}

impl Record for Block {
    const PREFIX: &'static [u8] = b"block:";

    fn record_signature(&self) -> Option<&Signature> {
        self.signature()
    }
}

impl Record for Transaction {
    const PREFIX: &'static [u8] = b"tx:";

    fn record_signature(&self) -> Option<&Signature> {
        self.signature()
    }
}

/// Queries the ledger needs from its backing store.
pub trait RecordStore {
    /// Persist a block and every transaction it carries, atomically.
    fn insert_block(&self, block: &Block) -> Result<()>;

    /// Number of stored records of one type.
    fn count<R: Record>(&self) -> Result<usize>;

    /// Remove every record of one type, returning how many were removed.
    fn delete_all<R: Record>(&self) -> Result<usize>;

    /// Point lookup by signature.
    fn get<R: Record>(&self, signature: &Signature) -> Result<Option<R>>;

    /// Whether a record of this type is stored under `signature`.
    fn contains<R: Record>(&self, signature: &Signature) -> Result<bool>;

    /// First record (in key order) matching `predicate`.
    fn find_one_where<R, F>(&self, predicate: F) -> Result<Option<R>>
    where
        R: Record,
        F: FnMut(&R) -> bool;

    /// Record with the greatest key as computed by `key_fn`.
    fn max_by_key<R, K, F>(&self, key_fn: F) -> Result<Option<R>>
    where
        R: Record,
        K: Ord,
        F: FnMut(&R) -> K;

    /// Every record of one type, in key order.
    fn scan<R: Record>(&self) -> Result<Vec<R>>;

    /// Sum of the amounts of every transaction matching `predicate`.
    fn sum_amount_where<F>(&self, predicate: F) -> Result<u128>
    where
        F: FnMut(&Transaction) -> bool;
}

impl Storage {
    fn records<R: Record>(&self) -> impl Iterator<Item = Result<R>> + '_ {
        self.inner()
            .scan_prefix(R::PREFIX)
            .values()
            .map(|value| -> Result<R> { Ok(bincode::deserialize(&value?)?) })
    }
}

impl RecordStore for Storage {
    fn insert_block(&self, block: &Block) -> Result<()> {
        let mut ops = Vec::with_capacity(block.transactions().len() + 1);
        ops.push(BatchOp::Insert {
            key: block.record_key()?,
            value: bincode::serialize(block)?,
        });
        for tx in block.transactions() {
            ops.push(BatchOp::Insert {
                key: tx.record_key()?,
                value: bincode::serialize(tx)?,
            });
        }
        self.batch(ops)?;

        debug!(
            transactions = block.transactions().len(),
            "stored block and its transactions"
        );
        Ok(())
    }

    fn count<R: Record>(&self) -> Result<usize> {
        let mut count = 0;
        for entry in self.inner().scan_prefix(R::PREFIX).keys() {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn delete_all<R: Record>(&self) -> Result<usize> {
        let mut ops = Vec::new();
        for key in self.inner().scan_prefix(R::PREFIX).keys() {
            ops.push(BatchOp::Remove { key: key?.to_vec() });
        }
        let removed = ops.len();
        self.batch(ops)?;

        debug!(
            prefix = %String::from_utf8_lossy(R::PREFIX),
            removed,
            "deleted records"
        );
        Ok(removed)
    }

    fn get<R: Record>(&self, signature: &Signature) -> Result<Option<R>> {
        Storage::get(self, Storage::record_key(R::PREFIX, signature))
    }

    fn contains<R: Record>(&self, signature: &Signature) -> Result<bool> {
        Storage::contains(self, Storage::record_key(R::PREFIX, signature))
    }

    fn find_one_where<R, F>(&self, mut predicate: F) -> Result<Option<R>>
    where
        R: Record,
        F: FnMut(&R) -> bool,
    {
        for record in self.records::<R>() {
            let record = record?;
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn max_by_key<R, K, F>(&self, mut key_fn: F) -> Result<Option<R>>
    where
        R: Record,
        K: Ord,
        F: FnMut(&R) -> K,
    {
        let mut best: Option<(K, R)> = None;
        for record in self.records::<R>() {
            let record = record?;
            let key = key_fn(&record);
            let replace = match &best {
                Some((best_key, _)) => key > *best_key,
                None => true,
            };
            if replace {
                best = Some((key, record));
            }
        }
        Ok(best.map(|(_, record)| record))
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        self.records().collect()
    }

    fn sum_amount_where<F>(&self, mut predicate: F) -> Result<u128>
    where
        F: FnMut(&Transaction) -> bool,
    {
        let mut total: u128 = 0;
        for tx in self.records::<Transaction>() {
            let tx = tx?;
            if predicate(&tx) {
                total += u128::from(tx.amount());
            }
        }
        Ok(total)
    }
}
