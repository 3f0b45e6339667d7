//! # Storage Engine
//!
//! The orchestrator (C9) tying together the in-memory write path, the
//! background flush/compaction workers, and the on-disk level hierarchy.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Engine                             │
//! │  ┌───────────┐   rotate   ┌─────────────┐                  │
//! │  │  Active   │ ─────────► │ Flush queue │                  │
//! │  │ Memtable  │            │ (frozen)    │                  │
//! │  └───────────┘            └──────┬──────┘                  │
//! │                                  │ flush worker             │
//! │                                  ▼                          │
//! │                         ┌─────────────────┐                 │
//! │                         │   L0 SSTables   │                 │
//! │                         └────────┬────────┘                 │
//! │                                  │ compact worker            │
//! │                                  ▼                          │
//! │                    L1 .. L(L_MAX-1) SSTables                │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes land directly in the active memtable; when it has no room for
//! the next entry it is rotated into the flush queue and a background
//! thread drains it into an L0 SST. A second background thread watches
//! the level hierarchy and runs compactions when a level trips its
//! trigger. Neither worker is on the foreground write/read path — at
//! worst a write blocks briefly acquiring the active-memtable lock.
//!
//! There is no write-ahead log: a process crash loses whatever sat in
//! memtables that had not yet reached an SST. Durability model and
//! suggested mitigations are described in `DESIGN.md`.
//!
//! Startup performs no manifest replay. `LevelManager::open` recovers the
//! entire on-disk layout by scanning the data directory for
//! `<level>_<seq>.sst` files.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::level::{CompactionJob, LevelConfig, LevelError, LevelManager, level_size_budget};
use crate::memtable::{Memtable, MemtableLookup};
use crate::merge::{self, MergeError, MergeSource};
use crate::sstable::{GetResult, SSTableError, SstWriter};

#[cfg(test)]
mod tests;

/// Errors surfaced by [`Engine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error originating from the level manager.
    #[error("level manager error: {0}")]
    Level(#[from] LevelError),

    /// Error originating from an SST build or read.
    #[error("SSTable error: {0}")]
    SSTable(#[from] SSTableError),

    /// Error originating from the merge engine.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration for an [`Engine`] instance.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Byte budget for the active memtable before it is rotated to the
    /// flush queue.
    pub memtable_size_limit: usize,

    /// Number of L0 files that trigger an L0→L1 compaction.
    pub l0_capacity: usize,

    /// Per-level size growth factor for levels `1..L_MAX`.
    pub growth_factor: u64,

    /// Target false-positive rate for each SST's membership filter.
    pub filter_false_positive_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_size_limit: 4 * 1024 * 1024,
            l0_capacity: crate::level::DEFAULT_L0_CAPACITY,
            growth_factor: crate::level::DEFAULT_GROWTH_FACTOR,
            filter_false_positive_rate: crate::filter::DEFAULT_FALSE_POSITIVE_RATE,
        }
    }
}

impl EngineConfig {
    fn level_config(&self) -> LevelConfig {
        LevelConfig {
            l0_capacity: self.l0_capacity,
            growth_factor: self.growth_factor,
            memtable_size_limit: self.memtable_size_limit as u64,
        }
    }
}

/// State shared between the engine handle and its background workers.
struct Shared {
    config: EngineConfig,
    levels: LevelManager,
    active: Mutex<Memtable>,
    flush_queue: Mutex<Vec<Memtable>>,
}

impl Shared {
    fn rotate_if_full(&self, key: &[u8], value: &[u8]) {
        let mut active = self.active.lock().unwrap();
        if !active.is_empty() && !active.has_room(key, value) {
            let full = std::mem::replace(&mut *active, Memtable::new(self.config.memtable_size_limit));
            self.flush_queue.lock().unwrap().push(full);
        }
    }

    fn flush_oldest(&self) -> Result<bool, EngineError> {
        let entries: Vec<(Vec<u8>, crate::codec::OpKind, Vec<u8>)> = {
            let queue = self.flush_queue.lock().unwrap();
            let Some(memtable) = queue.first() else {
                return Ok(false);
            };
            memtable
                .iter()
                .map(|(k, op, v)| (k.to_vec(), op, v.to_vec()))
                .collect()
        };

        if !entries.is_empty() {
            let seq = self.levels.allocate_seq();
            let path = self.levels.path_for(0, seq);
            let refs: Vec<(&[u8], crate::codec::OpKind, &[u8])> =
                entries.iter().map(|(k, op, v)| (k.as_slice(), *op, v.as_slice())).collect();

            SstWriter::new(&path).build_with_fpr(
                refs.into_iter(),
                entries.len(),
                self.config.filter_false_positive_rate,
            )?;
            self.levels.install(0, path, seq)?;
        }

        self.flush_queue.lock().unwrap().remove(0);
        Ok(true)
    }

    fn run_compaction(&self, job: CompactionJob) -> Result<(), EngineError> {
        let mut sources = Vec::new();
        let mut priority = 0u32;
        for handle in job.victims.iter().rev() {
            let entries: Vec<_> = handle.table.iterator().map(|e| (e.key, e.op, e.value)).collect();
            sources.push(MergeSource {
                priority,
                entries: Box::new(entries.into_iter()),
            });
            priority += 1;
        }
        for handle in &job.overlapping {
            let entries: Vec<_> = handle.table.iterator().map(|e| (e.key, e.op, e.value)).collect();
            sources.push(MergeSource {
                priority,
                entries: Box::new(entries.into_iter()),
            });
            priority += 1;
        }

        let merged = merge::MergeIterator::new(sources, job.is_bottommost).peekable();
        let max_file_size = level_size_budget(
            &self.config.level_config(),
            job.target_level.saturating_sub(1),
        );

        let levels = &self.levels;
        let target_level = job.target_level;
        let written = merge::write_merge_output(
            merged,
            max_file_size,
            self.config.filter_false_positive_rate,
            |_idx| {
                let seq = levels.allocate_seq();
                (levels.path_for(target_level, seq), seq)
            },
        );

        let written = match written {
            Ok(w) => w,
            Err(e) => {
                error!(%e, "compaction merge failed");
                return Err(e.into());
            }
        };

        self.levels
            .apply_compaction(&job, written.into_iter().map(|o| (o.path, o.seq)).collect())?;
        Ok(())
    }
}

/// An open key-value store. Cheap to clone — internally an `Arc` handle —
/// and safe to share across threads.
pub struct Engine {
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    flush_tx: Sender<()>,
    compact_tx: Sender<()>,
    flush_handle: Option<JoinHandle<()>>,
    compact_handle: Option<JoinHandle<()>>,
}

impl Engine {
    /// Open (or create) a store rooted at `path`, recovering any existing
    /// on-disk levels and starting the background flush/compaction workers.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let levels = LevelManager::open(path, config.level_config())?;
        let shared = Arc::new(Shared {
            active: Mutex::new(Memtable::new(config.memtable_size_limit)),
            flush_queue: Mutex::new(Vec::new()),
            levels,
            config,
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let (flush_tx, flush_rx) = channel::unbounded();
        let (compact_tx, compact_rx) = channel::unbounded();

        let flush_handle = spawn_flush_worker(shared.clone(), flush_rx, shutdown.clone());
        let compact_handle = spawn_compaction_worker(shared.clone(), compact_rx, shutdown.clone());

        info!(dir = %shared.levels.dir().display(), "engine opened");

        Ok(Self {
            shared,
            shutdown,
            flush_tx,
            compact_tx,
            flush_handle: Some(flush_handle),
            compact_handle: Some(compact_handle),
        })
    }

    /// Insert or overwrite `key` with `value`.
    pub fn insert(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        self.shared.rotate_if_full(&key, &value);
        self.shared.active.lock().unwrap().insert(key, value);
        let _ = self.flush_tx.try_send(());
        Ok(())
    }

    /// Delete `key`, recording a tombstone. No error is raised if the key
    /// did not previously exist.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        self.shared.rotate_if_full(&key, &[]);
        self.shared.active.lock().unwrap().insert_tombstone(key);
        let _ = self.flush_tx.try_send(());
        Ok(())
    }

    /// Look up `key`, checking the active memtable, the flush queue
    /// (newest to oldest), L0 (newest to oldest), then each deeper level
    /// in turn.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        match self.shared.active.lock().unwrap().get(key) {
            MemtableLookup::Value(v) => return Ok(Some(v)),
            MemtableLookup::Tombstone => return Ok(None),
            MemtableLookup::NotFound => {}
        }

        {
            let queue = self.shared.flush_queue.lock().unwrap();
            for memtable in queue.iter().rev() {
                match memtable.get(key) {
                    MemtableLookup::Value(v) => return Ok(Some(v)),
                    MemtableLookup::Tombstone => return Ok(None),
                    MemtableLookup::NotFound => continue,
                }
            }
        }

        match self.shared.levels.get(key)? {
            GetResult::Value(v) => Ok(Some(v)),
            GetResult::Tombstone | GetResult::NotFound => Ok(None),
        }
    }

    /// Flush every pending memtable and drain outstanding compactions,
    /// then stop the background workers. Safe to call at most once;
    /// `Engine` is also drained on `Drop`.
    pub fn close(&mut self) -> Result<(), EngineError> {
        // Stop both background workers and join them *before* draining
        // below, so the drain is the sole consumer of the flush queue and
        // level manager. Draining first (workers still alive) let a woken
        // worker race the foreground drain on `flush_queue`: both could
        // read the same front entry, each write an L0 SST, and each
        // `remove(0)` — the second removal then drops the next,
        // still-unflushed memtable instead of the one just flushed.
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.flush_tx.try_send(());
        let _ = self.compact_tx.try_send(());

        if let Some(h) = self.flush_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.compact_handle.take() {
            let _ = h.join();
        }

        {
            let mut active = self.shared.active.lock().unwrap();
            if !active.is_empty() {
                let full = std::mem::replace(
                    &mut *active,
                    Memtable::new(self.shared.config.memtable_size_limit),
                );
                self.shared.flush_queue.lock().unwrap().push(full);
            }
        }

        while self.shared.flush_oldest()? {}

        loop {
            match self.shared.levels.select_compaction() {
                Some(job) => self.shared.run_compaction(job)?,
                None => break,
            }
        }

        info!("engine closed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.close() {
                warn!(%e, "error closing engine during drop");
            }
        }
    }
}

fn spawn_flush_worker(
    shared: Arc<Shared>,
    rx: Receiver<()>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match rx.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(()) | Err(channel::RecvTimeoutError::Timeout) => {}
            Err(channel::RecvTimeoutError::Disconnected) => return,
        }
        loop {
            match shared.flush_oldest() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    error!(%e, "flush failed, will retry on next trigger");
                    break;
                }
            }
        }
    })
}

fn spawn_compaction_worker(
    shared: Arc<Shared>,
    rx: Receiver<()>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match rx.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(()) | Err(channel::RecvTimeoutError::Timeout) => {}
            Err(channel::RecvTimeoutError::Disconnected) => return,
        }
        loop {
            match shared.levels.select_compaction() {
                Some(job) => {
                    debug!(source = job.source_level, target = job.target_level, "compacting");
                    if let Err(e) = shared.run_compaction(job) {
                        error!(%e, "compaction failed, will retry on next trigger");
                        break;
                    }
                }
                None => break,
            }
        }
    })
}
