//! Level manager (C8) — per-level SST bookkeeping, compaction triggers, and
//! victim selection.
//!
//! Levels are numbered `0..L_MAX`. Level 0 holds flush output directly and
//! its files may overlap in key range; levels `1..L_MAX` are kept
//! non-overlapping by construction, one file range butting up against the
//! next. SST files live on disk as `<level>_<seq:06d>.sst`, which doubles as
//! both the directory-scan recovery format and the age ordering for L0
//! (smaller sequence number = older file). Levels `>= 1` are kept sorted by
//! `min_key` instead, since a partial compaction can assign a newer `seq`
//! to a file that lands in the *middle* of the level's key range.
//!
//! File lifetime is reference-counted: an [`SstHandle`] is only unlinked
//! from disk once its last [`Arc`] clone is dropped, so a reader holding a
//! snapshot of a level never has its file yanked out from under it mid-read.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use crate::sstable::{GetResult, SSTable, SSTableError};

/// Number of levels, `0..L_MAX`. Level `L_MAX - 1` is the bottommost level.
pub const L_MAX: usize = 7;

/// Default L0 file-count trigger.
pub const DEFAULT_L0_CAPACITY: usize = 5;

/// Default per-level size growth factor.
pub const DEFAULT_GROWTH_FACTOR: u64 = 10;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SST error: {0}")]
    SSTable(#[from] SSTableError),

    #[error("malformed SST filename: {0}")]
    BadFilename(String),
}

/// Tunables governing when levels fill up and trigger compaction.
#[derive(Debug, Clone, Copy)]
pub struct LevelConfig {
    pub l0_capacity: usize,
    pub growth_factor: u64,
    pub memtable_size_limit: u64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            l0_capacity: DEFAULT_L0_CAPACITY,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            memtable_size_limit: 4 * 1024 * 1024,
        }
    }
}

/// Byte budget for level `i` (`i >= 1`): `memtable_size_limit * growth_factor^i`.
pub fn level_size_budget(config: &LevelConfig, level: usize) -> u64 {
    config
        .memtable_size_limit
        .saturating_mul(config.growth_factor.saturating_pow(level as u32))
}

/// A reference-counted handle to an open, on-disk SST. Unlinking the
/// backing file is deferred until every clone of the enclosing `Arc` has
/// been dropped and [`SstHandle::mark_for_unlink`] was called.
pub struct SstHandle {
    pub path: PathBuf,
    pub seq: u64,
    pub table: SSTable,
    pending_unlink: AtomicBool,
}

impl SstHandle {
    fn open(path: PathBuf, seq: u64) -> Result<Self, LevelError> {
        let table = SSTable::open(&path)?;
        Ok(Self {
            path,
            seq,
            table,
            pending_unlink: AtomicBool::new(false),
        })
    }

    /// Mark this file for deletion once the last reference to it is dropped.
    pub fn mark_for_unlink(&self) {
        self.pending_unlink.store(true, Ordering::SeqCst);
    }
}

impl Drop for SstHandle {
    fn drop(&mut self) {
        if self.pending_unlink.load(Ordering::SeqCst) {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), %e, "failed to unlink obsolete SST");
            } else {
                info!(path = %self.path.display(), "unlinked obsolete SST");
            }
        }
    }
}

/// Order the handles at `level` the way lookups need them ordered: L0 by
/// `seq` so [`LevelManager::get`] can scan newest-to-oldest, and every
/// deeper level by `min_key` so it can binary-search by key range. A level
/// `>= 1` is only ever partially rewritten by compaction (a middle-range
/// output can land with a higher `seq` than an untouched edge file), so
/// `seq` order and key order are not interchangeable there.
fn sort_level(level: usize, handles: &mut [Arc<SstHandle>]) {
    if level == 0 {
        handles.sort_by_key(|h| h.seq);
    } else {
        handles.sort_by(|a, b| a.table.min_key().cmp(b.table.min_key()));
    }
}

/// Build the canonical on-disk filename for a `(level, seq)` pair.
pub fn sst_filename(level: usize, seq: u64) -> String {
    format!("{level}_{seq:06}.sst")
}

/// Parse `<level>_<seq>.sst`, returning `(level, seq)`.
fn parse_sst_filename(name: &str) -> Option<(usize, u64)> {
    let stem = name.strip_suffix(".sst")?;
    let (level_str, seq_str) = stem.split_once('_')?;
    let level = level_str.parse().ok()?;
    let seq = seq_str.parse().ok()?;
    Some((level, seq))
}

/// A compaction job selected by [`LevelManager::select_compaction`].
pub struct CompactionJob {
    pub source_level: usize,
    pub target_level: usize,
    /// Victim files from `source_level` (and, for `source_level >= 1`, the
    /// one file chosen to compact).
    pub victims: Vec<Arc<SstHandle>>,
    /// Overlapping victims from `target_level`, already present there.
    pub overlapping: Vec<Arc<SstHandle>>,
    /// `true` when `target_level` is the bottommost level, meaning
    /// tombstones produced by this merge may be dropped outright.
    pub is_bottommost: bool,
}

impl CompactionJob {
    /// All input files for this job, across both levels.
    pub fn all_inputs(&self) -> impl Iterator<Item = &Arc<SstHandle>> {
        self.victims.iter().chain(self.overlapping.iter())
    }
}

/// Per-level SST bookkeeping and compaction trigger/victim-selection logic.
pub struct LevelManager {
    dir: PathBuf,
    config: LevelConfig,
    levels: Mutex<Vec<Vec<Arc<SstHandle>>>>,
    compacting: Vec<AtomicBool>,
    next_seq: AtomicU64,
}

impl LevelManager {
    /// Recover level state by scanning `dir` for `<level>_<seq>.sst` files.
    /// There is no manifest — the directory listing *is* the durable state.
    pub fn open(dir: impl AsRef<Path>, config: LevelConfig) -> Result<Self, LevelError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut levels: Vec<Vec<Arc<SstHandle>>> = (0..L_MAX).map(|_| Vec::new()).collect();
        let mut max_seq: u64 = 0;

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some((level, seq)) = parse_sst_filename(&name) else {
                continue;
            };
            if level >= L_MAX {
                return Err(LevelError::BadFilename(name.into_owned()));
            }
            max_seq = max_seq.max(seq);
            let handle = SstHandle::open(entry.path(), seq)?;
            levels[level].push(Arc::new(handle));
        }

        for (level, handles) in levels.iter_mut().enumerate() {
            sort_level(level, handles);
        }

        info!(
            dir = %dir.display(),
            counts = ?levels.iter().map(Vec::len).collect::<Vec<_>>(),
            "recovered levels from directory scan"
        );

        let compacting = (0..L_MAX).map(|_| AtomicBool::new(false)).collect();

        Ok(Self {
            dir,
            config,
            levels: Mutex::new(levels),
            compacting,
            next_seq: AtomicU64::new(max_seq + 1),
        })
    }

    /// Allocate a fresh, monotonically increasing sequence number.
    pub fn allocate_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Full path for a `(level, seq)` pair under this manager's directory.
    pub fn path_for(&self, level: usize, seq: u64) -> PathBuf {
        self.dir.join(sst_filename(level, seq))
    }

    /// Install a newly flushed (or newly compacted) SST at `level`.
    pub fn install(&self, level: usize, path: PathBuf, seq: u64) -> Result<(), LevelError> {
        let handle = SstHandle::open(path, seq)?;
        let mut levels = self.levels.lock().unwrap();
        levels[level].push(Arc::new(handle));
        sort_level(level, &mut levels[level]);
        Ok(())
    }

    /// Snapshot the handles at `level`, ordered per [`sort_level`] (L0:
    /// oldest first; deeper levels: ascending `min_key`). Cheap: only
    /// clones `Arc`s, never touches disk.
    pub fn snapshot(&self, level: usize) -> Vec<Arc<SstHandle>> {
        self.levels.lock().unwrap()[level].clone()
    }

    /// Route a point lookup across every level per the read path: mutable
    /// memtable and flush queue are checked by the caller before this;
    /// here we search L0 newest-to-oldest, then levels `1..L_MAX` via
    /// binary search over non-overlapping ranges.
    pub fn get(&self, key: &[u8]) -> Result<GetResult, LevelError> {
        let l0 = self.snapshot(0);
        for handle in l0.iter().rev() {
            if handle.table.min_key() <= key && key <= handle.table.max_key() {
                match handle.table.get(key)? {
                    GetResult::NotFound => continue,
                    found => return Ok(found),
                }
            }
        }

        for level in 1..L_MAX {
            let handles = self.snapshot(level);
            let idx = handles.partition_point(|h| h.table.max_key() < key);
            if let Some(handle) = handles.get(idx) {
                if handle.table.min_key() <= key {
                    return Ok(handle.table.get(key)?);
                }
            }
        }

        Ok(GetResult::NotFound)
    }

    fn total_bytes(&self, level: usize) -> u64 {
        self.levels.lock().unwrap()[level]
            .iter()
            .map(|h| h.table.file_size())
            .sum()
    }

    /// Find overlapping handles in `level` for the key range `[lo, hi]`.
    fn overlapping_in(&self, level: usize, lo: &[u8], hi: &[u8]) -> Vec<Arc<SstHandle>> {
        self.levels.lock().unwrap()[level]
            .iter()
            .filter(|h| h.table.is_in_range(lo, hi))
            .cloned()
            .collect()
    }

    /// Decide whether any level needs compacting, and if so select the
    /// victim set. Returns `None` if nothing is over budget, or if the
    /// relevant levels are already mid-compaction.
    pub fn select_compaction(&self) -> Option<CompactionJob> {
        let l0_len = self.levels.lock().unwrap()[0].len();
        if l0_len >= self.config.l0_capacity
            && !self.compacting[0].swap(true, Ordering::SeqCst)
        {
            let victims = self.snapshot(0);
            let overlapping = self.snapshot(1);
            return Some(CompactionJob {
                source_level: 0,
                target_level: 1,
                victims,
                overlapping,
                is_bottommost: L_MAX - 1 == 1,
            });
        }

        for level in 1..L_MAX - 1 {
            let budget = level_size_budget(&self.config, level);
            if self.total_bytes(level) <= budget {
                continue;
            }
            if self.compacting[level].swap(true, Ordering::SeqCst) {
                continue;
            }

            let handles = self.snapshot(level);
            let Some(oldest) = handles.into_iter().min_by_key(|h| h.seq) else {
                self.compacting[level].store(false, Ordering::SeqCst);
                continue;
            };
            let overlapping =
                self.overlapping_in(level + 1, oldest.table.min_key(), oldest.table.max_key());

            return Some(CompactionJob {
                source_level: level,
                target_level: level + 1,
                victims: vec![oldest],
                overlapping,
                is_bottommost: level + 1 == L_MAX - 1,
            });
        }

        None
    }

    /// Atomically swap a compaction job's inputs for its outputs: install
    /// the new files at `target_level`, remove the consumed inputs from
    /// their levels, and mark them for deferred unlink. Clears the
    /// `is_compacting` flag for `job.source_level` regardless of outcome.
    pub fn apply_compaction(
        &self,
        job: &CompactionJob,
        outputs: Vec<(PathBuf, u64)>,
    ) -> Result<(), LevelError> {
        let result = self.apply_compaction_inner(job, outputs);
        self.compacting[job.source_level].store(false, Ordering::SeqCst);
        result
    }

    fn apply_compaction_inner(
        &self,
        job: &CompactionJob,
        outputs: Vec<(PathBuf, u64)>,
    ) -> Result<(), LevelError> {
        let mut new_handles = Vec::with_capacity(outputs.len());
        for (path, seq) in outputs {
            new_handles.push(Arc::new(SstHandle::open(path, seq)?));
        }

        let consumed: HashSet<PathBuf> = job
            .all_inputs()
            .map(|h| h.path.clone())
            .collect();

        let mut levels = self.levels.lock().unwrap();

        levels[job.source_level].retain(|h| !consumed.contains(&h.path));
        levels[job.target_level].retain(|h| !consumed.contains(&h.path));
        levels[job.target_level].extend(new_handles);
        sort_level(job.target_level, &mut levels[job.target_level]);
        drop(levels);

        for handle in job.all_inputs() {
            handle.mark_for_unlink();
        }

        Ok(())
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests;
