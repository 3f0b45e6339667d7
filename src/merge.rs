//! Merge engine (C7) — k-way merge with dedup and tombstone drop.
//!
//! Feeds a set of already-sorted entry iterators (one per input SST, newest
//! first) into a `BinaryHeap`-driven k-way merge, then slices the merged
//! stream into one or more size-bounded output SSTs at the target level.
//!
//! The heap ordering mirrors the classic LSM merge pattern: entries compare
//! by `(key ascending, source_priority ascending)`, and `BinaryHeap` is a
//! max-heap, so the comparison is reversed to make the smallest key (and,
//! among ties, the newest source) surface first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::codec::OpKind;
use crate::sstable::{SSTableError, SstWriter};

/// Errors produced while merging and writing compaction output.
#[derive(Debug, Error)]
pub enum MergeError {
    /// An error writing or reading an SST during the merge.
    #[error("SST error during merge: {0}")]
    SSTable(#[from] SSTableError),

    /// Underlying I/O error (e.g. cleaning up a partial output file).
    #[error("I/O error during merge: {0}")]
    Io(#[from] std::io::Error),
}

/// One fully decoded entry from a merge input, tagged with the priority of
/// the source that produced it (lower priority number = newer source).
#[derive(Debug, Clone)]
struct HeapItem {
    key: Vec<u8>,
    op: OpKind,
    value: Vec<u8>,
    source_priority: u32,
    source_idx: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source_priority == other.source_priority
    }
}
impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest
        // (key, source_priority) on top.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source_priority.cmp(&self.source_priority))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A merge input: an ordered entry stream plus its priority (lower = newer).
pub struct MergeSource<'a> {
    pub priority: u32,
    pub entries: Box<dyn Iterator<Item = (Vec<u8>, OpKind, Vec<u8>)> + 'a>,
}

/// k-way merges a set of sorted sources into one ascending, deduplicated
/// stream, dropping tombstones that can provably never be needed again.
pub struct MergeIterator<'a> {
    sources: Vec<Box<dyn Iterator<Item = (Vec<u8>, OpKind, Vec<u8>)> + 'a>>,
    heap: BinaryHeap<HeapItem>,
    last_emitted_key: Option<Vec<u8>>,
    /// `true` when this merge's inputs already cover every level that could
    /// still hide an older copy of a key — i.e. a bottommost compaction —
    /// so DELETE entries may be dropped outright instead of carried forward.
    drop_tombstones: bool,
}

impl<'a> MergeIterator<'a> {
    /// Build a merge iterator from `sources`, priming the heap with one
    /// entry per source.
    pub fn new(mut sources: Vec<MergeSource<'a>>, drop_tombstones: bool) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        let mut streams = Vec::with_capacity(sources.len());

        // Sort by priority so `source_idx` is stable and deterministic.
        sources.sort_by_key(|s| s.priority);

        for (idx, source) in sources.into_iter().enumerate() {
            let mut entries = source.entries;
            if let Some((key, op, value)) = entries.next() {
                heap.push(HeapItem {
                    key,
                    op,
                    value,
                    source_priority: source.priority,
                    source_idx: idx,
                });
            }
            streams.push(entries);
        }

        Self {
            sources: streams,
            heap,
            last_emitted_key: None,
            drop_tombstones,
        }
    }

    fn refill_from(&mut self, source_idx: usize, priority: u32) {
        if let Some((key, op, value)) = self.sources[source_idx].next() {
            self.heap.push(HeapItem {
                key,
                op,
                value,
                source_priority: priority,
                source_idx,
            });
        }
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = (Vec<u8>, OpKind, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.heap.pop()?;
            self.refill_from(item.source_idx, item.source_priority);

            // Dedup: an older duplicate of a key we've already emitted.
            if self.last_emitted_key.as_deref() == Some(item.key.as_slice()) {
                continue;
            }
            self.last_emitted_key = Some(item.key.clone());

            if item.op == OpKind::Delete && self.drop_tombstones {
                continue;
            }

            return Some((item.key, item.op, item.value));
        }
    }
}

/// Result of writing one output SST during a compaction round.
pub struct MergeOutput {
    pub path: PathBuf,
    pub seq: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}

/// Consume a merged, deduplicated entry stream and write it out as one or
/// more SSTs, each respecting `max_file_size`. A new output file always
/// starts on a new key — the size check happens only between keys, never
/// mid-entry.
///
/// `make_path` is called once per output file with a monotonically
/// increasing index, returning the path to write to and the sequence
/// number that path was allocated under.
pub fn write_merge_output(
    mut entries: std::iter::Peekable<impl Iterator<Item = (Vec<u8>, OpKind, Vec<u8>)>>,
    max_file_size: u64,
    filter_fpr: f64,
    mut make_path: impl FnMut(usize) -> (PathBuf, u64),
) -> Result<Vec<MergeOutput>, MergeError> {
    let mut outputs = Vec::new();
    let mut file_idx = 0usize;

    while entries.peek().is_some() {
        let (path, seq) = make_path(file_idx);
        file_idx += 1;

        let mut batch: Vec<(Vec<u8>, OpKind, Vec<u8>)> = Vec::new();
        let mut running_size: u64 = 0;

        while let Some((key, op, value)) = entries.peek() {
            let entry_size = (key.len() + 1 + value.len()) as u64;
            if !batch.is_empty() && running_size + entry_size > max_file_size {
                break;
            }
            running_size += entry_size;
            let (key, op, value) = entries.next().unwrap();
            batch.push((key, op, value));
        }

        debug!(
            path = %path.display(),
            entries = batch.len(),
            bytes = running_size,
            "writing compaction output file"
        );

        let refs: Vec<(&[u8], OpKind, &[u8])> = batch
            .iter()
            .map(|(k, op, v)| (k.as_slice(), *op, v.as_slice()))
            .collect();
        let summary = SstWriter::new(&path).build_with_fpr(refs.into_iter(), batch.len(), filter_fpr)?;

        outputs.push(MergeOutput {
            path,
            seq,
            min_key: summary.min_key,
            max_key: summary.max_key,
            file_size: summary.file_size,
        });
    }

    Ok(outputs)
}

/// Remove a partially-written output file left behind by a failed merge, so
/// a retry never trips over garbage from the previous attempt.
pub fn cleanup_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), %e, "failed to remove partial compaction output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source<'a>(priority: u32, entries: Vec<(&'static [u8], OpKind, &'static [u8])>) -> MergeSource<'a> {
        MergeSource {
            priority,
            entries: Box::new(
                entries
                    .into_iter()
                    .map(|(k, op, v)| (k.to_vec(), op, v.to_vec())),
            ),
        }
    }

    #[test]
    fn merges_disjoint_sources_in_key_order() {
        let a = source(0, vec![(b"b", OpKind::Set, b"2"), (b"d", OpKind::Set, b"4")]);
        let b = source(1, vec![(b"a", OpKind::Set, b"1"), (b"c", OpKind::Set, b"3")]);

        let merged: Vec<_> = MergeIterator::new(vec![a, b], false).collect();
        let keys: Vec<&[u8]> = merged.iter().map(|(k, _, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b", b"c", b"d"]);
    }

    #[test]
    fn newer_source_wins_on_duplicate_key() {
        let newer = source(0, vec![(b"k", OpKind::Set, b"new")]);
        let older = source(1, vec![(b"k", OpKind::Set, b"old")]);

        let merged: Vec<_> = MergeIterator::new(vec![newer, older], false).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].2, b"new");
    }

    #[test]
    fn tombstone_retained_when_not_bottommost() {
        let only = source(0, vec![(b"k", OpKind::Delete, b"")]);
        let merged: Vec<_> = MergeIterator::new(vec![only], false).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].1, OpKind::Delete);
    }

    #[test]
    fn tombstone_dropped_at_bottommost_compaction() {
        let only = source(0, vec![(b"k", OpKind::Delete, b"")]);
        let merged: Vec<_> = MergeIterator::new(vec![only], true).collect();
        assert!(merged.is_empty());
    }
}
