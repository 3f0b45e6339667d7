//! # StrataKV
//!
//! An embeddable, persistent key-value storage engine built on a
//! **leveled Log-Structured Merge Tree (LSM-tree)** architecture. Optimized
//! for write throughput, with point lookups routed through an in-memory
//! write buffer, a bounded number of unsorted L0 files, and a hierarchy of
//! non-overlapping, size-bounded lower levels.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Engine                            │
//! │  ┌────────────┐  ┌──────────────┐  ┌─────────────┐   │
//! │  │  Active     │  │  Flush queue │  │  Levels     │   │
//! │  │  Memtable   │  │  (frozen)    │  │  0..L_MAX   │   │
//! │  └─────┬──────┘  └──────┬───────┘  └──────┬──────┘   │
//! │        │   rotate       │   flush          │          │
//! │        └────────────►   └───────────►      │          │
//! │                                             │          │
//! │  ┌──────────────────────────────────────────┘          │
//! │  │  Background compactor (leveled policy)              │
//! │  └──────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! There is no write-ahead log and no manifest. Durable state is entirely
//! the set of `<level>_<seq>.sst` files on disk; [`engine::Engine::open`]
//! recovers it with a directory scan.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Orchestrator — open, insert, delete, get, close; background workers |
//! | [`level`] | Per-level SST bookkeeping, compaction triggers, victim selection |
//! | [`merge`] | k-way merge with dedup and conditional tombstone drop |
//! | [`sstable`] | Immutable, sorted, on-disk tables with sparse indices and membership filters |
//! | [`memtable`] | In-memory sorted write buffer |
//! | [`filter`] | Bloom-filter membership test for negative point lookups |
//! | [`codec`] | Value wire encoding: op byte + payload |
//! | [`encoding`] | Low-level `Encode`/`Decode` primitives and varint helpers |
//!
//! ## Key properties
//!
//! - **Ordered keys** — all on-disk state is sorted by raw key bytes.
//! - **Last-write-wins** — the newest version of a key, across memtable,
//!   flush queue, and levels, always shadows older ones.
//! - **Bloom filter lookups** — each SST carries a membership filter for
//!   fast negative point-lookup responses.
//! - **Leveled compaction** — L0 overlaps are merged as a whole; deeper
//!   levels stay non-overlapping and grow geometrically in size.
//! - **No WAL** — a crash loses whatever had not yet reached an SST; see
//!   `DESIGN.md` for the rationale.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use stratakv::engine::{Engine, EngineConfig};
//!
//! let mut engine = Engine::open("/tmp/my_store", EngineConfig::default()).unwrap();
//!
//! engine.insert(b"hello".to_vec(), b"world".to_vec()).unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! engine.delete(b"hello".to_vec()).unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), None);
//!
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod codec;
pub mod encoding;
pub mod engine;
pub mod filter;
pub mod level;
pub mod memtable;
pub mod merge;
pub mod sstable;
