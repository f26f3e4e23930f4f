//! P-256 ECDSA keys, public key bytes and signatures.

use p256::ecdsa::signature::{RandomizedSigner, Verifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of an uncompressed SEC1 public key (`0x04 ‖ X ‖ Y`).
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of a compact public key (`X ‖ Y`), accepted on import only.
pub const COMPACT_PUBLIC_KEY_LEN: usize = 64;

/// Length of a private scalar.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Length of an `r ‖ s` signature.
pub const SIGNATURE_LEN: usize = 64;

const UNCOMPRESSED_TAG: u8 = 0x04;

/// Errors that can occur during key operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyError {
    #[error("key has no private scalar")]
    NoPrivateKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature length {0}, expected 64")]
    InvalidSignatureLength(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// An ECDSA signature in fixed `r ‖ s` form.
///
/// Link fields (`merkle_hash`) reuse this type, since a link is the signature
/// of the predecessor entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

mod signature_serde {
    use super::SIGNATURE_LEN;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; SIGNATURE_LEN], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(bytes.as_slice(), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; SIGNATURE_LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        if bytes.len() != SIGNATURE_LEN {
            return Err(serde::de::Error::custom("signature must be 64 bytes"));
        }
        let mut arr = [0u8; SIGNATURE_LEN];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        signature_serde::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Signature(signature_serde::deserialize(deserializer)?))
    }
}

impl Signature {
    /// The sentinel link (all zeros): "no predecessor".
    pub const ZERO: Self = Self([0u8; SIGNATURE_LEN]);

    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice, which must be exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(KeyError::InvalidSignatureLength(bytes.len()));
        }
        let mut arr = [0u8; SIGNATURE_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Whether this is the sentinel link.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; SIGNATURE_LEN]
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string (case-insensitive).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Raw public key bytes identifying an account.
///
/// Stored as opaque bytes so that placeholders which are not curve points
/// (the genesis mint input) can still own balances. Equality and hashing are
/// structural, so the type is safe as a map key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The input of the genesis minting transaction: `0x04` followed by 64 zero bytes.
    pub fn mint_placeholder() -> Self {
        let mut bytes = vec![0u8; PUBLIC_KEY_LEN];
        bytes[0] = UNCOMPRESSED_TAG;
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from a hex string (case-insensitive).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Ok(Self(hex::decode(s)?))
    }

    /// Interpret these bytes as a curve point, yielding a public-only key.
    pub fn to_key(&self) -> Result<Key, KeyError> {
        Key::from_public_point(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "PublicKey({})", &hex[..hex.len().min(18)])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A P-256 key pair, or a public-only key that can verify but not sign.
#[derive(Clone)]
pub struct Key {
    signing_key: Option<SigningKey>,
    verifying_key: VerifyingKey,
}

impl Key {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        Self {
            signing_key: Some(signing_key),
            verifying_key,
        }
    }

    /// Rebuild a key pair from a 32-byte private scalar.
    pub fn from_private_scalar(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(KeyError::InvalidPrivateKey);
        }
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        let verifying_key = *signing_key.verifying_key();
        Ok(Self {
            signing_key: Some(signing_key),
            verifying_key,
        })
    }

    /// Build a public-only key from a 65-byte uncompressed point or a 64-byte `X ‖ Y`.
    pub fn from_public_point(bytes: &[u8]) -> Result<Self, KeyError> {
        let verifying_key = match bytes.len() {
            PUBLIC_KEY_LEN if bytes[0] == UNCOMPRESSED_TAG => VerifyingKey::from_sec1_bytes(bytes),
            COMPACT_PUBLIC_KEY_LEN => {
                let mut point = Vec::with_capacity(PUBLIC_KEY_LEN);
                point.push(UNCOMPRESSED_TAG);
                point.extend_from_slice(bytes);
                VerifyingKey::from_sec1_bytes(&point)
            }
            _ => return Err(KeyError::InvalidPublicKey),
        }
        .map_err(|_| KeyError::InvalidPublicKey)?;

        Ok(Self {
            signing_key: None,
            verifying_key,
        })
    }

    /// Rebuild a key pair from a hex-encoded private scalar.
    pub fn from_private_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_private_scalar(&hex::decode(s)?)
    }

    /// Build a public-only key from hex-encoded point bytes.
    pub fn from_public_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_public_point(&hex::decode(s)?)
    }

    pub fn has_private_key(&self) -> bool {
        self.signing_key.is_some()
    }

    /// The 65-byte uncompressed public key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.verifying_key.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public_key_bytes())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// The 32-byte private scalar.
    pub fn private_key_bytes(&self) -> Result<[u8; PRIVATE_KEY_LEN], KeyError> {
        let signing_key = self.signing_key.as_ref().ok_or(KeyError::NoPrivateKey)?;
        let mut out = [0u8; PRIVATE_KEY_LEN];
        out.copy_from_slice(&signing_key.to_bytes());
        Ok(out)
    }

    pub fn private_key_hex(&self) -> Result<String, KeyError> {
        Ok(hex::encode(self.private_key_bytes()?))
    }

    /// Sign a message with ECDSA over its SHA-256 digest.
    ///
    /// Every call draws fresh randomness, so repeated signatures over the same
    /// message differ.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, KeyError> {
        let signing_key = self.signing_key.as_ref().ok_or(KeyError::NoPrivateKey)?;
        let signature: EcdsaSignature = signing_key.sign_with_rng(&mut OsRng, message);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        Ok(Signature(out))
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match EcdsaSignature::from_slice(&signature.0) {
            Ok(sig) => self.verifying_key.verify(message, &sig).is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("public_key", &self.public_key())
            .field("private", &self.has_private_key())
            .finish()
    }
}
