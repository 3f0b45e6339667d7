//! SST writer (C5) — serializes a sorted entry stream into a complete SST file.
//!
//! # Atomicity
//!
//! 1. Write everything to `path` with a `.tmp` extension.
//! 2. Flush and `fsync` the file.
//! 3. Rename `.tmp` → the final path.
//!
//! A crash during step 1 or 2 leaves only an orphaned `.tmp` file; the final
//! path never observes a partially-written SST.

use std::{
    fs::{File, OpenOptions, rename},
    io::{BufWriter, Seek, Write},
    path::Path,
};

use crate::codec::OpKind;
use crate::filter::{DEFAULT_FALSE_POSITIVE_RATE, MembershipFilter};

use super::{
    DATA_BLOCK_CLOSE_THRESHOLD, Footer, IndexEntry, SSTableError, encode_entry,
    encode_index_entry,
};

/// Summary of a completed build, useful to callers that want key-range or
/// size bookkeeping without reopening the file.
pub struct BuildSummary {
    /// Smallest key written.
    pub min_key: Vec<u8>,
    /// Largest key written.
    pub max_key: Vec<u8>,
    /// Number of entries written.
    pub entry_count: usize,
    /// Final file size in bytes.
    pub file_size: u64,
}

/// Builds a complete SST file at a given path from a sorted entry stream.
pub struct SstWriter<P: AsRef<Path>> {
    path: P,
}

impl<P: AsRef<Path>> SstWriter<P> {
    /// Create a writer targeting the given output path.
    pub fn new(path: P) -> Self {
        Self { path }
    }

    /// Consume a sorted `(key, op, value)` stream and write a complete SST.
    ///
    /// `expected_items` sizes the membership filter; it need not be exact,
    /// only a reasonable estimate of the entry count.
    ///
    /// # Errors
    ///
    /// Returns [`SSTableError::Corruption`] if `entries` is empty — an SST
    /// with no data has no well-defined `min_key`/`max_key`, violating I4.
    pub fn build<'a>(
        self,
        entries: impl Iterator<Item = (&'a [u8], OpKind, &'a [u8])>,
        expected_items: usize,
    ) -> Result<BuildSummary, SSTableError> {
        self.build_with_fpr(entries, expected_items, DEFAULT_FALSE_POSITIVE_RATE)
    }

    /// Same as [`Self::build`], but with an explicit target false-positive
    /// rate for the membership filter instead of [`DEFAULT_FALSE_POSITIVE_RATE`].
    pub fn build_with_fpr<'a>(
        self,
        entries: impl Iterator<Item = (&'a [u8], OpKind, &'a [u8])>,
        expected_items: usize,
        fpr: f64,
    ) -> Result<BuildSummary, SSTableError> {
        let final_path = self.path.as_ref();
        let tmp_path = final_path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut filter = MembershipFilter::new(expected_items, fpr)?;
        let mut index_entries: Vec<IndexEntry> = Vec::new();
        let mut current_block = Vec::<u8>::new();
        let mut min_key: Option<Vec<u8>> = None;
        let mut max_key: Option<Vec<u8>> = None;
        let mut entry_count = 0usize;

        {
            let mut writer = BufWriter::new(&mut file);
            let mut block_offset = writer.stream_position()?;

            for (key, op, value) in entries {
                entry_count += 1;
                if min_key.is_none() {
                    min_key = Some(key.to_vec());
                }
                max_key = Some(key.to_vec());

                filter.add(key);
                encode_entry(key, op, value, &mut current_block);

                if current_block.len() >= DATA_BLOCK_CLOSE_THRESHOLD {
                    writer.write_all(&current_block)?;
                    index_entries.push(IndexEntry {
                        last_key: key.to_vec(),
                        block_offset: block_offset
                            .try_into()
                            .map_err(|_| SSTableError::Corruption("file exceeds 4 GiB".into()))?,
                        block_length: current_block.len() as u32,
                    });
                    block_offset += current_block.len() as u64;
                    current_block.clear();
                }
            }

            if !current_block.is_empty() {
                let last_key = max_key
                    .clone()
                    .expect("max_key set whenever current_block is non-empty");
                writer.write_all(&current_block)?;
                index_entries.push(IndexEntry {
                    last_key,
                    block_offset: block_offset
                        .try_into()
                        .map_err(|_| SSTableError::Corruption("file exceeds 4 GiB".into()))?,
                    block_length: current_block.len() as u32,
                });
            }

            writer.flush()?;
        }

        if entry_count == 0 {
            drop(file);
            let _ = std::fs::remove_file(&tmp_path);
            return Err(SSTableError::Corruption(
                "cannot build an SST from an empty entry stream".into(),
            ));
        }

        let mut index_bytes = Vec::new();
        for entry in &index_entries {
            encode_index_entry(entry, &mut index_bytes);
        }
        file.write_all(&index_bytes)?;

        let filter_bytes = filter.to_bytes();
        file.write_all(&filter_bytes)?;

        let footer = Footer {
            index_length: index_bytes.len() as u64,
            filter_length: filter_bytes.len() as u64,
        };
        file.write_all(&footer.encode())?;

        file.flush()?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();
        drop(file);

        rename(&tmp_path, final_path)?;

        Ok(BuildSummary {
            min_key: min_key.expect("entry_count > 0 implies min_key is set"),
            max_key: max_key.expect("entry_count > 0 implies max_key is set"),
            entry_count,
            file_size,
        })
    }
}
