//! Blocks: ordered batches of transactions signed by a verifier.

use crate::crypto::{Key, KeyError, PublicKey, Signature};
use crate::encoding::{encode_signable, Signable, SignableCache, SignableEncoder};
use crate::transaction::{Transaction, TransactionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during block operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    #[error("block must be signed with the verifier's key")]
    WrongSigner,
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// A signed batch of transactions linked to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    id: Uuid,
    version: i32,
    creation_time: DateTime<Utc>,
    /// Signature of the previous block, or the zero sentinel for genesis.
    merkle_hash: Signature,
    transactions: Vec<Transaction>,
    /// Public key of the signer.
    verifier: PublicKey,
    signature: Option<Signature>,
    #[serde(skip)]
    signable: SignableCache,
}

impl Block {
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new unsigned block at the current time.
    pub fn new(merkle_hash: Signature, transactions: Vec<Transaction>, verifier: PublicKey) -> Self {
        Self::from_parts(
            Uuid::new_v4(),
            Self::CURRENT_VERSION,
            Utc::now(),
            merkle_hash,
            transactions,
            verifier,
            None,
        )
    }

    /// Rebuild a block from every field.
    pub fn from_parts(
        id: Uuid,
        version: i32,
        creation_time: DateTime<Utc>,
        merkle_hash: Signature,
        transactions: Vec<Transaction>,
        verifier: PublicKey,
        signature: Option<Signature>,
    ) -> Self {
        Self {
            id,
            version,
            creation_time,
            merkle_hash,
            transactions,
            verifier,
            signature,
            signable: SignableCache::default(),
        }
    }

    /// Create a signed genesis block minting `amount` to `key`.
    ///
    /// The single minting transaction spends from the mint placeholder, so its
    /// signature comes from `key` without the acceptance filter.
    pub fn genesis(key: &Key, amount: u64) -> Result<Self, BlockError> {
        let mut mint = Transaction::new(
            Signature::ZERO,
            PublicKey::mint_placeholder(),
            key.public_key(),
            amount,
            false,
        );
        mint.sign_genesis(key)?;

        let mut block = Self::new(Signature::ZERO, vec![mint], key.public_key());
        block.sign(key)?;
        Ok(block)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn merkle_hash(&self) -> &Signature {
        &self.merkle_hash
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of transactions as carried in the signed encoding.
    ///
    /// Equal to `transactions().len()` up to `u32::MAX`, where it saturates.
    pub fn transaction_count(&self) -> u32 {
        u32::try_from(self.transactions.len()).unwrap_or(u32::MAX)
    }

    pub fn verifier(&self) -> &PublicKey {
        &self.verifier
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Replace the stored signature without re-signing.
    pub fn set_signature(&mut self, signature: Option<Signature>) {
        self.signature = signature;
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.merkle_hash.is_zero()
    }

    /// The canonical signable bytes, computed once per instance.
    pub fn signable_bytes(&self) -> &[u8] {
        self.signable.get_or_init(|| encode_signable(self))
    }

    /// Sign the block with the verifier's key.
    pub fn sign(&mut self, key: &Key) -> Result<(), BlockError> {
        if key.public_key() != self.verifier {
            return Err(BlockError::WrongSigner);
        }
        let signature = key.sign(self.signable_bytes())?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Create a signed block.
    pub fn signed(mut self, key: &Key) -> Result<Self, BlockError> {
        self.sign(key)?;
        Ok(self)
    }

    /// Verify the signature against the key encoded in `verifier`.
    pub fn verify_signature(&self) -> bool {
        match self.verifier.to_key() {
            Ok(key) => self.verify_signature_with(&key),
            Err(_) => false,
        }
    }

    /// Verify the signature against an explicit key.
    pub fn verify_signature_with(&self, key: &Key) -> bool {
        match &self.signature {
            Some(signature) => key.verify(self.signable_bytes(), signature),
            None => false,
        }
    }
}

impl Signable for Block {
    fn write_signable(&self, encoder: &mut SignableEncoder) {
        encoder
            .put_i32(self.version)
            .put_i64(self.creation_time.timestamp())
            .put_bytes(self.merkle_hash.as_bytes())
            .put_u32(self.transaction_count());
        for tx in &self.transactions {
            tx.write_full(encoder);
        }
        encoder.put_bytes(self.verifier.as_bytes());
    }
}
