//! Sorted String Table (SST) module — C5/C6.
//!
//! An SST is an **immutable**, sorted, on-disk file of `(key, op, value)`
//! entries. Once written its bytes never change; updates are represented by
//! writing a new SST at a higher level or via compaction.
//!
//! # On-disk layout
//!
//! ```text
//! [ data blocks ][ sparse index block ][ membership filter ][ footer(16 bytes) ]
//! ```
//!
//! - **Data blocks** — the sorted entries themselves, closed at roughly 90%
//!   of a 4 KiB target so no entry spans two blocks.
//! - **Sparse index** — one entry per closed data block, keyed by that
//!   block's *last* key, pointing at `(block_offset, block_length)`.
//! - **Membership filter** — a serialized [`crate::filter::MembershipFilter`]
//!   covering every key in the file.
//! - **Footer** — exactly 16 bytes: `index_length:u64 LE ‖ filter_length:u64 LE`.
//!   Readers derive `filter_offset = file_size - 16 - filter_length` and
//!   `index_offset = filter_offset - index_length`.
//!
//! Entries (both data and index) share one wire encoding:
//! `varuint(key_len) ‖ varuint(value_field_len) ‖ key ‖ op_byte ‖ value`,
//! where `value_field_len = 1 + len(value)`. Index entries carry `op = SET`
//! purely for encoding uniformity and a value of `u32_le(offset) ‖ u32_le(length)`.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`builder::SstWriter`], the writer consuming a sorted
//!   entry stream (C5).
//! - [`iterator`] — [`iterator::SstIterator`], the forward cursor over an
//!   open SST (part of C6).

pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

pub use builder::SstWriter;
pub use iterator::SstIterator;

use std::{fs::File, io, path::Path};

use memmap2::Mmap;
use thiserror::Error;

use crate::codec::{self, OpKind};
use crate::encoding::{self, EncodingError};
use crate::filter::{FilterError, MembershipFilter};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Target (soft) data block size before a block is closed.
pub const DATA_BLOCK_TARGET_SIZE: usize = 4096;

/// Fraction of [`DATA_BLOCK_TARGET_SIZE`] at which a block is closed.
pub const DATA_BLOCK_CLOSE_THRESHOLD: usize = (DATA_BLOCK_TARGET_SIZE * 9) / 10;

/// Size of the footer region, in bytes: two little-endian `u64`s.
pub const FOOTER_SIZE: usize = 16;

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

/// Errors returned by SST read/write operations.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Entry or footer encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Membership filter (de)serialization error.
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// The file failed a structural sanity check (truncated, footer lengths
    /// that don't fit the file, out-of-range block offsets, varint overruns).
    #[error("corrupt SSTable: {0}")]
    Corruption(String),
}

// ------------------------------------------------------------------------------------------------
// Entry codec shared by data blocks and the sparse index
// ------------------------------------------------------------------------------------------------

/// Append one wire-format entry: `varuint(key_len) ‖ varuint(value_field_len)
/// ‖ key ‖ op_byte ‖ value`.
pub(crate) fn encode_entry(key: &[u8], op: OpKind, value: &[u8], buf: &mut Vec<u8>) {
    encoding::encode_varuint(key.len() as u64, buf);
    encoding::encode_varuint((1 + value.len()) as u64, buf);
    buf.extend_from_slice(key);
    buf.push(op.as_byte());
    buf.extend_from_slice(value);
}

/// Decode one wire-format entry from the start of `buf`.
///
/// Returns `(key, op, value, bytes_consumed)`.
pub(crate) fn decode_entry(buf: &[u8]) -> Result<(&[u8], OpKind, &[u8], usize), SSTableError> {
    let (key_len, n1) = encoding::decode_varuint(buf)
        .map_err(|e| SSTableError::Corruption(format!("entry key_len: {e}")))?;
    let (value_field_len, n2) = encoding::decode_varuint(&buf[n1..])
        .map_err(|e| SSTableError::Corruption(format!("entry value_field_len: {e}")))?;
    let key_len = key_len as usize;
    let value_field_len = value_field_len as usize;
    if value_field_len == 0 {
        return Err(SSTableError::Corruption(
            "entry value_field_len must include the op byte".into(),
        ));
    }
    let header_len = n1 + n2;
    let total = header_len + key_len + value_field_len;
    if buf.len() < total {
        return Err(SSTableError::Corruption(
            "entry overruns buffer".into(),
        ));
    }
    let key = &buf[header_len..header_len + key_len];
    let tagged = &buf[header_len + key_len..total];
    let (op, value) = codec::decode(tagged)
        .map_err(|e| SSTableError::Corruption(format!("entry op byte: {e}")))?;
    Ok((key, op, value, total))
}

// ------------------------------------------------------------------------------------------------
// Sparse index entry
// ------------------------------------------------------------------------------------------------

/// One entry in the sparse index: the last key of a data block, and that
/// block's location in the file.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) last_key: Vec<u8>,
    pub(crate) block_offset: u32,
    pub(crate) block_length: u32,
}

fn encode_index_entry(entry: &IndexEntry, buf: &mut Vec<u8>) {
    let mut value = Vec::with_capacity(8);
    value.extend_from_slice(&entry.block_offset.to_le_bytes());
    value.extend_from_slice(&entry.block_length.to_le_bytes());
    encode_entry(&entry.last_key, OpKind::Set, &value, buf);
}

fn decode_index_entry(buf: &[u8]) -> Result<(IndexEntry, usize), SSTableError> {
    let (key, _op, value, consumed) = decode_entry(buf)?;
    if value.len() != 8 {
        return Err(SSTableError::Corruption(
            "index entry value must be 8 bytes (two u32 LE)".into(),
        ));
    }
    let block_offset = u32::from_le_bytes(value[0..4].try_into().unwrap());
    let block_length = u32::from_le_bytes(value[4..8].try_into().unwrap());
    Ok((
        IndexEntry {
            last_key: key.to_vec(),
            block_offset,
            block_length,
        },
        consumed,
    ))
}

// ------------------------------------------------------------------------------------------------
// Footer
// ------------------------------------------------------------------------------------------------

struct Footer {
    index_length: u64,
    filter_length: u64,
}

impl Footer {
    fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.index_length.to_le_bytes());
        buf[8..16].copy_from_slice(&self.filter_length.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self, SSTableError> {
        if buf.len() != FOOTER_SIZE {
            return Err(SSTableError::Corruption("footer is not 16 bytes".into()));
        }
        let index_length = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let filter_length = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        Ok(Self {
            index_length,
            filter_length,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// SSTable — immutable mmap-backed reader
// ------------------------------------------------------------------------------------------------

/// Result of a single-SST point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    /// A live value was found.
    Value(Vec<u8>),
    /// A tombstone was found — the key is deleted as of this file.
    Tombstone,
    /// This SST has no information about the key.
    NotFound,
}

/// An open, memory-mapped, immutable SST.
pub struct SSTable {
    mmap: Mmap,
    index: Vec<IndexEntry>,
    filter: MembershipFilter,
    index_offset: usize,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
}

impl SSTable {
    /// Open an SST file, verifying structural soundness and loading its
    /// sparse index and membership filter into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SSTableError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let file_len = mmap.len();

        if file_len < FOOTER_SIZE {
            return Err(SSTableError::Corruption("file smaller than footer".into()));
        }

        let footer = Footer::decode(&mmap[file_len - FOOTER_SIZE..])?;

        let reserved = footer.index_length + footer.filter_length + FOOTER_SIZE as u64;
        if reserved > file_len as u64 {
            return Err(SSTableError::Corruption(
                "index_length + filter_length + 16 exceeds file_size".into(),
            ));
        }

        let filter_offset = file_len - FOOTER_SIZE - footer.filter_length as usize;
        let index_offset = filter_offset - footer.index_length as usize;

        let filter_bytes = &mmap[filter_offset..filter_offset + footer.filter_length as usize];
        let filter = MembershipFilter::from_bytes(filter_bytes)?;

        let mut index = Vec::new();
        let mut cursor = index_offset;
        while cursor < filter_offset {
            let (entry, consumed) = decode_index_entry(&mmap[cursor..filter_offset])?;
            cursor += consumed;
            index.push(entry);
        }

        for entry in &index {
            let start = entry.block_offset as usize;
            let end = start + entry.block_length as usize;
            if end > index_offset {
                return Err(SSTableError::Corruption(
                    "index entry points outside the data region".into(),
                ));
            }
        }

        let max_key = index
            .last()
            .map(|e| e.last_key.clone())
            .ok_or_else(|| SSTableError::Corruption("SST has an empty index".into()))?;

        let first_block = &index[0];
        let block_bytes = &mmap[first_block.block_offset as usize
            ..first_block.block_offset as usize + first_block.block_length as usize];
        let (min_key, _, _, _) = decode_entry(block_bytes)?;
        let min_key = min_key.to_vec();

        Ok(Self {
            mmap,
            index,
            filter,
            index_offset,
            min_key,
            max_key,
        })
    }

    /// The smallest key stored in this SST.
    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    /// The largest key stored in this SST.
    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    /// On-disk size of this SST, in bytes.
    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// `true` iff `[min_key, max_key]` intersects `[lo, hi]`.
    pub fn is_in_range(&self, lo: &[u8], hi: &[u8]) -> bool {
        self.min_key.as_slice() <= hi && self.max_key.as_slice() >= lo
    }

    /// Look up `key`: bloom check, then sparse-index binary search, then a
    /// linear scan of the target block.
    pub fn get(&self, key: &[u8]) -> Result<GetResult, SSTableError> {
        if key < self.min_key.as_slice() || key > self.max_key.as_slice() {
            return Ok(GetResult::NotFound);
        }

        if !self.filter.contains(key) {
            return Ok(GetResult::NotFound);
        }

        let block_idx = match self
            .index
            .binary_search_by(|entry| entry.last_key.as_slice().cmp(key))
        {
            Ok(i) => i,
            Err(i) if i < self.index.len() => i,
            Err(_) => return Ok(GetResult::NotFound),
        };

        let entry = &self.index[block_idx];
        let start = entry.block_offset as usize;
        let end = start + entry.block_length as usize;
        let block = &self.mmap[start..end];

        let mut cursor = 0;
        while cursor < block.len() {
            let (entry_key, op, value, consumed) = decode_entry(&block[cursor..])?;
            if entry_key == key {
                return Ok(match op {
                    OpKind::Set => GetResult::Value(value.to_vec()),
                    OpKind::Delete => GetResult::Tombstone,
                });
            }
            if entry_key > key {
                break;
            }
            cursor += consumed;
        }

        Ok(GetResult::NotFound)
    }

    /// A forward cursor reading entries from offset 0 up to (not including)
    /// the sparse index.
    pub fn iterator(&self) -> SstIterator<'_> {
        SstIterator::new(&self.mmap[..self.index_offset])
    }
}
