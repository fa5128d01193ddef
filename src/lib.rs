//! Sharded persistent store for spaced-repetition scheduling state.
//!
//! Holds one [`ScheduleRecord`] per flashcard (due date, memory-model
//! parameters, review history) with O(1) in-memory access, and persists them
//! across up to 256 JSON shard files keyed by the first two characters of the
//! record id. Bursts of mutation — a review session touches hundreds of
//! records in seconds — are coalesced by a debounce timer into one batched
//! write per affected shard.
//!
//! The file system is injected through the [`StorageBackend`] trait, so the
//! store compiles independently of any host application. Copies of the shard
//! directory diverging across devices (offline edits synced later) are
//! reconciled by the explicit, last-review-wins [`RecordStore::merge_from_disk`]
//! pass.
//!
//! The scheduling algorithm itself lives outside this crate: callers compute
//! a new record from a rating and hand it to [`RecordStore::set`].

mod scheduler;

pub mod backend;
pub mod models;
pub mod shard;
pub mod store;

pub use backend::{FsBackend, MemoryBackend, StorageBackend};
pub use models::{
    CardPhase, MergeReport, ReviewLogEntry, ScheduleRecord, StoreStats, MAX_HISTORY,
};
pub use shard::shard_key;
pub use store::{RecordStore, Result, StoreConfig, StoreError, DEFAULT_DEBOUNCE};
