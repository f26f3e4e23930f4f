//! Canonical byte encoding of signable entities.
//!
//! Every integer is written little-endian through `to_le_bytes`, so the
//! produced bytes are identical on every host regardless of its native byte
//! order. Signing and verification both go through [`encode_signable`].

use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// An entity with a canonical signable byte form.
pub trait Signable {
    /// Write the signable fields, in their fixed order, into `encoder`.
    fn write_signable(&self, encoder: &mut SignableEncoder);
}

/// Encode the signable fields of an entity.
pub fn encode_signable<T: Signable + ?Sized>(entity: &T) -> Vec<u8> {
    let mut encoder = SignableEncoder::new();
    entity.write_signable(&mut encoder);
    encoder.finish()
}

/// Append-only little-endian byte writer.
#[derive(Debug, Default)]
pub struct SignableEncoder {
    buf: Vec<u8>,
}

impl SignableEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// One byte: `0x01` for true, `0x00` for false.
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(u8::from(value));
        self
    }

    /// Raw bytes, no length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Errors raised while decoding a fixed-layout buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} bytes at offset {offset}, {remaining} left")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

/// Bounds-checked little-endian reader, the decoding side of [`SignableEncoder`].
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.offset,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

/// Lazily computed signable bytes, scoped to one entity instance.
///
/// The owning entity keeps its signed fields immutable after construction, so
/// the first computed value stays valid. Ignored by equality and by serde.
#[derive(Clone, Default)]
pub struct SignableCache(OnceLock<Vec<u8>>);

impl SignableCache {
    pub fn get_or_init(&self, f: impl FnOnce() -> Vec<u8>) -> &[u8] {
        self.0.get_or_init(f)
    }

    pub fn is_filled(&self) -> bool {
        self.0.get().is_some()
    }
}

impl PartialEq for SignableCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for SignableCache {}

impl fmt::Debug for SignableCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(bytes) => write!(f, "SignableCache({} bytes)", bytes.len()),
            None => write!(f, "SignableCache(empty)"),
        }
    }
}
