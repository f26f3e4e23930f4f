//! Transaction types, filtered signing and the fixed binary layout.
//!
//! Binary layout (`to_bytes` / `from_bytes`), `149 + 2N` bytes in total:
//!
//! ```text
//! version:4 | time:8 | merkle_hash:64 | input:N | output:N | amount:8 | is_delegating:1 | signature:64
//! ```
//!
//! Everything but the trailing signature is the canonical signable encoding.

use crate::crypto::{Key, KeyError, PublicKey, Signature, SIGNATURE_LEN};
use crate::encoding::{ByteReader, DecodeError, Signable, SignableCache, SignableEncoder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Upper bound on signing attempts while searching for an acceptable signature.
pub const MAX_SIGNING_ATTEMPTS: u32 = 1_000_000;

/// Bytes taken by the fixed-size fields of the binary layout.
pub const FIXED_ENCODED_LEN: usize = 4 + 8 + SIGNATURE_LEN + 8 + 1 + SIGNATURE_LEN;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    #[error("transaction must be signed with the key belonging to its input")]
    WrongSigner,
    #[error("no acceptable signature found in {0} attempts")]
    SignatureSearchExhausted(u32),
    #[error("malformed transaction encoding: {0}")]
    MalformedEncoding(String),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

impl From<DecodeError> for TransactionError {
    fn from(err: DecodeError) -> Self {
        TransactionError::MalformedEncoding(err.to_string())
    }
}

/// Whether a signature has the sparse shape required of transaction
/// signatures: first byte zero, second byte below 16 (about 1 in 4096).
pub fn is_acceptable_signature(signature: &Signature) -> bool {
    signature.0[0] == 0 && signature.0[1] < 0x10
}

/// A value transfer between two public keys.
///
/// Signed fields are fixed at construction; only the signature can change
/// afterwards, which keeps the memoized signable bytes valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque identifier, not signed.
    id: Uuid,
    /// Format version.
    version: i32,
    /// Creation time. Only whole seconds are signed and encoded.
    creation_time: DateTime<Utc>,
    /// Signature of the sender's previous transaction, or the zero sentinel.
    merkle_hash: Signature,
    /// Sender public key.
    input: PublicKey,
    /// Receiver public key.
    output: PublicKey,
    /// Amount in the smallest unit.
    amount: u64,
    /// Whether the transaction also delegates the input's authority.
    is_delegating: bool,
    /// Set by `sign`.
    signature: Option<Signature>,
    #[serde(skip)]
    signable: SignableCache,
}

impl Transaction {
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new unsigned transaction at the current time.
    pub fn new(
        merkle_hash: Signature,
        input: PublicKey,
        output: PublicKey,
        amount: u64,
        is_delegating: bool,
    ) -> Self {
        Self::from_parts(
            Uuid::new_v4(),
            Self::CURRENT_VERSION,
            Utc::now(),
            merkle_hash,
            input,
            output,
            amount,
            is_delegating,
            None,
        )
    }

    /// Rebuild a transaction from every field.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        version: i32,
        creation_time: DateTime<Utc>,
        merkle_hash: Signature,
        input: PublicKey,
        output: PublicKey,
        amount: u64,
        is_delegating: bool,
        signature: Option<Signature>,
    ) -> Self {
        Self {
            id,
            version,
            creation_time,
            merkle_hash,
            input,
            output,
            amount,
            is_delegating,
            signature,
            signable: SignableCache::default(),
        }
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

    pub fn input(&self) -> &PublicKey {
        &self.input
    }

    pub fn output(&self) -> &PublicKey {
        &self.output
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn is_delegating(&self) -> bool {
        self.is_delegating
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

    /// The canonical signable bytes, computed once per instance.
    pub fn signable_bytes(&self) -> &[u8] {
        self.signable
            .get_or_init(|| crate::encoding::encode_signable(self))
    }

    /// Sign with the input's key, retrying until the signature is acceptable.
    pub fn sign(&mut self, key: &Key) -> Result<(), TransactionError> {
        self.sign_with_attempts(key, MAX_SIGNING_ATTEMPTS)
    }

    /// Like [`Transaction::sign`] with an explicit attempt bound.
    pub fn sign_with_attempts(&mut self, key: &Key, max_attempts: u32) -> Result<(), TransactionError> {
        if key.public_key() != self.input {
            return Err(TransactionError::WrongSigner);
        }

        let signature = {
            let message = self.signable_bytes();
            let mut found = None;
            for _ in 0..max_attempts {
                let candidate = key.sign(message)?;
                if is_acceptable_signature(&candidate) {
                    found = Some(candidate);
                    break;
                }
            }
            found.ok_or(TransactionError::SignatureSearchExhausted(max_attempts))?
        };

        self.signature = Some(signature);
        Ok(())
    }

    /// Create a signed transaction.
    pub fn signed(mut self, key: &Key) -> Result<Self, TransactionError> {
        self.sign(key)?;
        Ok(self)
    }

    /// Sign the genesis minting transaction. Its input is the mint placeholder,
    /// which has no private key, so the minting key signs without the filter.
    pub(crate) fn sign_genesis(&mut self, key: &Key) -> Result<(), TransactionError> {
        if self.input != PublicKey::mint_placeholder() {
            return Err(TransactionError::WrongSigner);
        }
        let signature = key.sign(self.signable_bytes())?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Whether the stored signature passes the acceptance filter.
    pub fn has_acceptable_signature(&self) -> bool {
        self.signature.as_ref().is_some_and(is_acceptable_signature)
    }

    /// Verify the signature against the key encoded in `input`.
    pub fn verify_signature(&self) -> bool {
        match self.input.to_key() {
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

    /// Append the full byte form (signable bytes then signature) to `encoder`.
    /// An unsigned transaction contributes nothing.
    pub fn write_full(&self, encoder: &mut SignableEncoder) {
        if let Some(signature) = &self.signature {
            encoder
                .put_bytes(self.signable_bytes())
                .put_bytes(signature.as_bytes());
        }
    }

    /// The binary form: signable bytes followed by the signature, or empty if unsigned.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut encoder = SignableEncoder::new();
        self.write_full(&mut encoder);
        encoder.finish()
    }

    /// Decode the binary form. Input and output lengths are inferred from the
    /// total length; the id is not part of the encoding and comes back nil.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        if bytes.len() < FIXED_ENCODED_LEN {
            return Err(TransactionError::MalformedEncoding(format!(
                "{} bytes is shorter than the {} byte minimum",
                bytes.len(),
                FIXED_ENCODED_LEN
            )));
        }
        let remaining = bytes.len() - FIXED_ENCODED_LEN;
        if remaining % 2 != 0 {
            return Err(TransactionError::MalformedEncoding(
                "input and output lengths differ".into(),
            ));
        }
        let key_len = remaining / 2;

        let mut reader = ByteReader::new(bytes);
        let version = reader.read_i32()?;
        let seconds = reader.read_i64()?;
        let merkle_hash = Signature(reader.take_array()?);
        let input = PublicKey::from_bytes(reader.take(key_len)?);
        let output = PublicKey::from_bytes(reader.take(key_len)?);
        let amount = reader.read_u64()?;
        let is_delegating = reader.read_bool()?;
        let signature = Signature(reader.take_array()?);
        reader.finish()?;

        let creation_time = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
            TransactionError::MalformedEncoding(format!("creation time {} out of range", seconds))
        })?;

        Ok(Self::from_parts(
            Uuid::nil(),
            version,
            creation_time,
            merkle_hash,
            input,
            output,
            amount,
            is_delegating,
            Some(signature),
        ))
    }

    /// Hex rendering of the binary form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode a hex rendering (case-insensitive).
    pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(s).map_err(|e| TransactionError::MalformedEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Signable for Transaction {
    fn write_signable(&self, encoder: &mut SignableEncoder) {
        encoder
            .put_i32(self.version)
            .put_i64(self.creation_time.timestamp())
            .put_bytes(self.merkle_hash.as_bytes())
            .put_bytes(self.input.as_bytes())
            .put_bytes(self.output.as_bytes())
            .put_u64(self.amount)
            .put_bool(self.is_delegating);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PUBLIC_KEY_LEN;
    use crate::encoding::encode_signable;

    fn transfer(input: &Key, output: &Key, amount: u64) -> Transaction {
        Transaction::new(
            Signature::ZERO,
            input.public_key(),
            output.public_key(),
            amount,
            false,
        )
    }

    fn assert_same_content(a: &Transaction, b: &Transaction) {
        assert_eq!(a.version(), b.version());
        assert_eq!(a.creation_time().timestamp(), b.creation_time().timestamp());
        assert_eq!(a.merkle_hash(), b.merkle_hash());
        assert_eq!(a.input(), b.input());
        assert_eq!(a.output(), b.output());
        assert_eq!(a.amount(), b.amount());
        assert_eq!(a.is_delegating(), b.is_delegating());
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_sign_with_valid_key() {
        let input = Key::generate();
        let output = Key::generate();
        let mut tx = transfer(&input, &output, 100);

        assert!(!tx.is_signed());
        tx.sign(&input).unwrap();

        assert!(tx.is_signed());
        assert!(tx.has_acceptable_signature());
        let sig = tx.signature().unwrap();
        assert_eq!(sig.0[0], 0);
        assert!(sig.0[1] < 16);
    }

    #[test]
    fn test_sign_with_wrong_key_fails() {
        let input = Key::generate();
        let output = Key::generate();
        let mut tx = transfer(&input, &output, 100);

        assert_eq!(tx.sign(&output), Err(TransactionError::WrongSigner));
        assert!(!tx.is_signed());
    }

    #[test]
    fn test_signature_verification() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = transfer(&input, &output, 100).signed(&input).unwrap();

        assert!(tx.verify_signature());
        assert!(tx.verify_signature_with(&input));
        assert!(!tx.verify_signature_with(&output));
    }

    #[test]
    fn test_unsigned_does_not_verify() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = transfer(&input, &output, 100);

        assert!(!tx.verify_signature());
        assert!(tx.to_bytes().is_empty());
    }

    #[test]
    fn test_tampered_signature_fails() {
        let input = Key::generate();
        let output = Key::generate();
        let mut tx = transfer(&input, &output, 100).signed(&input).unwrap();

        let mut tampered = *tx.signature().unwrap();
        let last = SIGNATURE_LEN - 1;
        tampered.0[last] = !tampered.0[last];
        tx.set_signature(Some(tampered));

        assert!(!tx.verify_signature());
    }

    #[test]
    fn test_tampered_data_fails() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = transfer(&input, &output, 100).signed(&input).unwrap();

        let tampered = Transaction::from_parts(
            tx.id(),
            tx.version(),
            tx.creation_time(),
            *tx.merkle_hash(),
            tx.input().clone(),
            tx.output().clone(),
            1100,
            tx.is_delegating(),
            tx.signature().copied(),
        );

        assert!(!tampered.verify_signature());
    }

    #[test]
    fn test_signable_layout() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = transfer(&input, &output, 0x0102);

        let bytes = tx.signable_bytes().to_vec();
        assert_eq!(bytes.len(), 4 + 8 + 64 + PUBLIC_KEY_LEN * 2 + 8 + 1);
        assert_eq!(&bytes[..4], &1i32.to_le_bytes());
        assert_eq!(&bytes[4..12], &tx.creation_time().timestamp().to_le_bytes());
        assert_eq!(&bytes[12..76], Signature::ZERO.as_bytes());
        assert_eq!(&bytes[76..141], input.public_key_bytes().as_slice());
        assert_eq!(&bytes[141..206], output.public_key_bytes().as_slice());
        assert_eq!(&bytes[206..214], &0x0102u64.to_le_bytes());
        assert_eq!(bytes[214], 0);
        assert_eq!(bytes, encode_signable(&tx));
    }

    #[test]
    fn test_signable_bytes_are_memoized() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = transfer(&input, &output, 5);

        let first = tx.signable_bytes().as_ptr();
        let second = tx.signable_bytes().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = transfer(&input, &output, 100).signed(&input).unwrap();

        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), FIXED_ENCODED_LEN + 2 * PUBLIC_KEY_LEN);

        let decoded = Transaction::from_bytes(&bytes).unwrap();
        assert_same_content(&tx, &decoded);
        assert!(decoded.verify_signature());
    }

    #[test]
    fn test_from_hex_roundtrip() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = Transaction::new(Signature::ZERO, input.public_key(), output.public_key(), 42, true)
            .signed(&input)
            .unwrap();

        let decoded = Transaction::from_hex(&tx.to_hex().to_uppercase()).unwrap();
        assert_same_content(&tx, &decoded);
        assert!(decoded.is_delegating());
    }

    #[test]
    fn test_from_bytes_rejects_malformed() {
        assert!(matches!(
            Transaction::from_bytes(&[0u8; 100]),
            Err(TransactionError::MalformedEncoding(_))
        ));
        assert!(matches!(
            Transaction::from_bytes(&[0u8; FIXED_ENCODED_LEN + 3]),
            Err(TransactionError::MalformedEncoding(_))
        ));

        let mut bad_flag = vec![0u8; FIXED_ENCODED_LEN + 2];
        bad_flag[FIXED_ENCODED_LEN + 2 - SIGNATURE_LEN - 1] = 7;
        assert!(matches!(
            Transaction::from_bytes(&bad_flag),
            Err(TransactionError::MalformedEncoding(_))
        ));

        assert!(matches!(
            Transaction::from_hex("zz"),
            Err(TransactionError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_from_bytes_accepts_minimum_length() {
        let decoded = Transaction::from_bytes(&[0u8; FIXED_ENCODED_LEN]).unwrap();
        assert!(decoded.input().is_empty());
        assert!(decoded.output().is_empty());
        assert_eq!(decoded.creation_time().timestamp(), 0);
    }

    #[test]
    fn test_signature_search_is_bounded() {
        let input = Key::generate();
        let output = Key::generate();
        let mut tx = transfer(&input, &output, 1);

        assert_eq!(
            tx.sign_with_attempts(&input, 0),
            Err(TransactionError::SignatureSearchExhausted(0))
        );
        assert!(!tx.is_signed());
    }

    #[test]
    fn test_public_only_key_cannot_sign() {
        let input = Key::generate();
        let output = Key::generate();
        let public_only = input.public_key().to_key().unwrap();
        let mut tx = transfer(&input, &output, 1);

        assert_eq!(
            tx.sign(&public_only),
            Err(TransactionError::Key(KeyError::NoPrivateKey))
        );
    }

    #[test]
    fn test_storage_serialization_keeps_subsecond_time() {
        let input = Key::generate();
        let output = Key::generate();
        let tx = transfer(&input, &output, 9).signed(&input).unwrap();

        let encoded = bincode::serialize(&tx).unwrap();
        let decoded: Transaction = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.creation_time(), tx.creation_time());
        assert!(decoded.verify_signature());
    }
}
