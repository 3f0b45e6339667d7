//! Value codec — tags every stored value with an operation kind.
//!
//! Every logical entry in the engine is a triple `(key, op, value)`. On disk
//! and in the memtable, the op and value are packed together so that a
//! lookup needs only one slice to recover both: `op_byte ‖ value_bytes`.
//! [`OpKind::DELETE`] entries carry an empty value and mark the key as a
//! tombstone.

use crate::encoding::EncodingError;
use thiserror::Error;

/// Errors produced while decoding a tagged value.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The tagged byte string was empty (no op byte present).
    #[error("tagged value is empty, missing op byte")]
    MissingOpByte,

    /// The op byte did not match a known [`OpKind`] discriminant.
    #[error("invalid op byte: 0x{0:02X} (expected 0x00 or 0x01)")]
    InvalidOp(u8),
}

impl From<CodecError> for EncodingError {
    fn from(e: CodecError) -> Self {
        EncodingError::Custom(e.to_string())
    }
}

/// The kind of operation an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    /// A deletion tombstone; the associated value is always empty.
    Delete = 0,
    /// A live value.
    Set = 1,
}

impl OpKind {
    /// Decode a raw op byte, rejecting anything other than 0 or 1.
    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            0 => Ok(Self::Delete),
            1 => Ok(Self::Set),
            other => Err(CodecError::InvalidOp(other)),
        }
    }

    /// The raw byte written to disk for this op.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether an entry carrying this op is a tombstone.
    pub fn is_tombstone(self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// Encode `(op, value)` as the tagged byte string `op_byte ‖ value_bytes`.
pub fn encode(op: OpKind, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + value.len());
    out.push(op.as_byte());
    out.extend_from_slice(value);
    out
}

/// Split a tagged byte string into its op and a view over the value bytes.
pub fn decode(bytes: &[u8]) -> Result<(OpKind, &[u8]), CodecError> {
    let (&tag, rest) = bytes.split_first().ok_or(CodecError::MissingOpByte)?;
    let op = OpKind::from_byte(tag)?;
    Ok((op, rest))
}

/// `true` iff the tagged value's op is [`OpKind::Delete`].
pub fn is_tombstone(bytes: &[u8]) -> Result<bool, CodecError> {
    Ok(decode(bytes)?.0.is_tombstone())
}
