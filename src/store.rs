//! The record store facade.
//!
//! Layout on disk:
//! ```text
//! {store-dir}/
//! ├── 00.json   # flat id → record map for bucket "00"
//! ├── 3f.json
//! └── ...       # up to 256 shard files, named by 2-char bucket key
//! ```
//!
//! All records live in memory after `load()`; mutations update the cache
//! synchronously, mark the owning shard dirty and arm a debounce timer that
//! batches the actual writes. Divergent copies written by other devices into
//! the same (file-synced) directory are reconciled by the explicit
//! `merge_from_disk` pass — the store does no file watching of its own.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::backend::StorageBackend;
use crate::models::{CardPhase, MergeReport, ScheduleRecord, StoreStats};
use crate::scheduler::{spawn_flush_timer, FlushTimer};
use crate::shard::{decode_shard, encode_shard, shard_key, shard_path};

/// Quiet period after the last mutation before dirty shards are written
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store is not loaded; call load() first")]
    NotReady,

    #[error("load already in progress")]
    LoadInProgress,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Construction parameters for a [`RecordStore`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the shard files
    pub dir: PathBuf,
    /// Debounce window between the last mutation and the batched write
    pub debounce: Duration,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Uninitialized,
    Loading,
    Ready,
}

struct StoreInner {
    backend: Arc<dyn StorageBackend>,
    dir: PathBuf,
    /// Authoritative copy of every record; the single source of truth once
    /// loaded
    cache: Mutex<HashMap<String, ScheduleRecord>>,
    /// Bucket keys with mutations not yet written to disk
    dirty: Mutex<HashSet<String>>,
    state: Mutex<LoadState>,
    /// Reentrancy guard: flush and merge never overlap each other
    persist_guard: tokio::sync::Mutex<()>,
}

/// Sharded persistent store for flashcard scheduling state.
///
/// Created once per process via [`RecordStore::open`] + [`RecordStore::load`];
/// call [`RecordStore::save_now`] on shutdown so the last debounce window's
/// mutations reach the disk.
pub struct RecordStore {
    inner: Arc<StoreInner>,
    timer: FlushTimer,
}

impl RecordStore {
    /// Create a store over the given backend and directory.
    ///
    /// Spawns the debounce timer task, so this must be called within a tokio
    /// runtime. No I/O happens until [`RecordStore::load`].
    pub fn open(backend: Arc<dyn StorageBackend>, config: StoreConfig) -> Self {
        let inner = Arc::new(StoreInner {
            backend,
            dir: config.dir,
            cache: Mutex::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            state: Mutex::new(LoadState::Uninitialized),
            persist_guard: tokio::sync::Mutex::new(()),
        });

        // The timer holds only a weak reference so dropping the store stops
        // the task
        let weak = Arc::downgrade(&inner);
        let timer = spawn_flush_timer(config.debounce, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        if let Err(e) = inner.flush().await {
                            log::warn!("Debounced flush failed: {}", e);
                        }
                        true
                    }
                    None => false,
                }
            }
        });

        Self { inner, timer }
    }

    /// Read every shard file into the cache.
    ///
    /// Idempotent: a second call once loaded is a no-op. A missing store
    /// directory is created; a corrupt shard file is skipped with a warning
    /// and loading continues with the rest.
    pub async fn load(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                LoadState::Ready => return Ok(()),
                LoadState::Loading => return Err(StoreError::LoadInProgress),
                LoadState::Uninitialized => *state = LoadState::Loading,
            }
        }

        match self.inner.load_shards().await {
            Ok(()) => {
                *self.inner.state.lock().unwrap() = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.inner.state.lock().unwrap() = LoadState::Uninitialized;
                Err(e)
            }
        }
    }

    // ==================== Cache / Mutation API ====================

    /// Get a record by id
    pub fn get(&self, id: &str) -> Result<Option<ScheduleRecord>> {
        self.inner.ensure_ready()?;
        Ok(self.inner.cache.lock().unwrap().get(id).cloned())
    }

    /// Install a record (full replace), keyed by `record.id`.
    ///
    /// History is trimmed to the newest [`crate::models::MAX_HISTORY`]
    /// entries, the owning shard is marked dirty and the debounce timer is
    /// armed. The new value is visible to `get` immediately, before any
    /// flush.
    pub fn set(&self, mut record: ScheduleRecord) -> Result<()> {
        self.inner.ensure_ready()?;
        record.trim_history();

        let bucket = shard_key(&record.id);
        self.inner
            .cache
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
        self.inner.dirty.lock().unwrap().insert(bucket);
        self.timer.arm();
        Ok(())
    }

    /// Remove a record. Returns false (and changes nothing) when absent.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.inner.ensure_ready()?;

        if self.inner.cache.lock().unwrap().remove(id).is_none() {
            return Ok(false);
        }
        self.inner.dirty.lock().unwrap().insert(shard_key(id));
        self.timer.arm();
        Ok(true)
    }

    pub fn has(&self, id: &str) -> Result<bool> {
        self.inner.ensure_ready()?;
        Ok(self.inner.cache.lock().unwrap().contains_key(id))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.inner.ensure_ready()?;
        Ok(self.inner.cache.lock().unwrap().keys().cloned().collect())
    }

    pub fn get_all(&self) -> Result<Vec<ScheduleRecord>> {
        self.inner.ensure_ready()?;
        Ok(self.inner.cache.lock().unwrap().values().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        self.inner.ensure_ready()?;
        Ok(self.inner.cache.lock().unwrap().len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Install many records at once without arming the debounce timer.
    ///
    /// Shards are marked dirty as usual; the caller (a migration, an
    /// importer) decides when to [`RecordStore::flush`]. Returns the number
    /// of records imported.
    pub fn import_bulk(
        &self,
        records: impl IntoIterator<Item = ScheduleRecord>,
    ) -> Result<usize> {
        self.inner.ensure_ready()?;

        let mut cache = self.inner.cache.lock().unwrap();
        let mut dirty = self.inner.dirty.lock().unwrap();
        let mut imported = 0;
        for mut record in records {
            record.trim_history();
            dirty.insert(shard_key(&record.id));
            cache.insert(record.id.clone(), record);
            imported += 1;
        }
        Ok(imported)
    }

    // ==================== Persistence ====================

    /// Write every dirty shard. Returns the number of shards written.
    ///
    /// Shards whose write fails stay dirty and are retried by the next flush;
    /// the first error is returned after all shards have been attempted. A
    /// flush with nothing dirty writes nothing.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.flush().await
    }

    /// Cancel any pending debounce window and flush immediately.
    ///
    /// Required on clean shutdown — otherwise mutations from the last
    /// debounce window never reach the disk.
    pub async fn save_now(&self) -> Result<usize> {
        self.timer.cancel();
        self.inner.flush().await
    }

    /// Reconcile the cache against the current on-disk shards.
    ///
    /// Explicit and caller-triggered: the store cannot detect external file
    /// changes itself, so the host invokes this after observing sync
    /// activity. Resolution is last-review-wins per record; see
    /// [`MergeReport`] for the counts returned.
    pub async fn merge_from_disk(&self) -> Result<MergeReport> {
        self.inner.merge_from_disk().await
    }

    /// Snapshot of cache contents and pending-write state
    pub fn stats(&self) -> Result<StoreStats> {
        self.inner.ensure_ready()?;
        Ok(self.inner.stats())
    }

    /// Number of shards with unwritten mutations
    pub fn dirty_shard_count(&self) -> usize {
        self.inner.dirty.lock().unwrap().len()
    }
}

impl StoreInner {
    fn ensure_ready(&self) -> Result<()> {
        match *self.state.lock().unwrap() {
            LoadState::Ready => Ok(()),
            _ => Err(StoreError::NotReady),
        }
    }

    async fn load_shards(&self) -> Result<()> {
        self.backend.mkdir(&self.dir).await?;

        let mut loaded = 0usize;
        for path in self.backend.list(&self.dir).await? {
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let text = match self.backend.read(&path).await {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Skipping unreadable shard {:?}: {}", path, e);
                    continue;
                }
            };
            let entries = match decode_shard(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Skipping corrupt shard {:?}: {}", path, e);
                    continue;
                }
            };

            loaded += entries.len();
            self.cache.lock().unwrap().extend(entries);
        }

        log::debug!("Loaded {} records from {:?}", loaded, self.dir);
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        self.ensure_ready()?;
        let _guard = self.persist_guard.lock().await;

        // Take the dirty buckets together with a snapshot of their records in
        // one critical section. A mutation that lands while the writes below
        // are in flight re-dirties its bucket and is picked up by the next
        // flush; it can never be cleared unwritten.
        let mut buckets: HashMap<String, BTreeMap<String, ScheduleRecord>> = {
            let cache = self.cache.lock().unwrap();
            let mut dirty = self.dirty.lock().unwrap();

            let mut buckets: HashMap<String, BTreeMap<String, ScheduleRecord>> =
                dirty.drain().map(|b| (b, BTreeMap::new())).collect();
            for (id, record) in cache.iter() {
                if let Some(bucket) = buckets.get_mut(&shard_key(id)) {
                    bucket.insert(id.clone(), record.clone());
                }
            }
            buckets
        };

        if buckets.is_empty() {
            return Ok(0);
        }

        self.backend.mkdir(&self.dir).await?;

        let mut written = 0usize;
        let mut first_err: Option<StoreError> = None;
        for (bucket, records) in buckets.drain() {
            let path = shard_path(&self.dir, &bucket);
            let result = match encode_shard(&records) {
                Ok(text) => self.backend.write(&path, &text).await.map_err(StoreError::from),
                Err(e) => Err(StoreError::from(e)),
            };

            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    // Failed shards go back in the dirty set so a later
                    // mutation or manual flush retries them
                    log::warn!("Failed to write shard {:?}: {}", path, e);
                    self.dirty.lock().unwrap().insert(bucket);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                log::debug!("Flushed {} shards to {:?}", written, self.dir);
                Ok(written)
            }
        }
    }

    async fn merge_from_disk(&self) -> Result<MergeReport> {
        self.ensure_ready()?;
        let _guard = self.persist_guard.lock().await;

        let mut report = MergeReport::default();
        for path in self.backend.list(&self.dir).await? {
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let entries = match self.backend.read(&path).await {
                Ok(text) => match decode_shard(&text) {
                    Ok(entries) => entries,
                    Err(e) => {
                        log::warn!("Skipping corrupt shard {:?} during merge: {}", path, e);
                        continue;
                    }
                },
                Err(e) => {
                    log::warn!("Skipping unreadable shard {:?} during merge: {}", path, e);
                    continue;
                }
            };

            let mut cache = self.cache.lock().unwrap();
            for (id, mut disk) in entries {
                disk.trim_history();
                match cache.get(&id) {
                    None => {
                        // Pure addition from another device
                        cache.insert(id, disk);
                        report.merged += 1;
                    }
                    Some(mem) => {
                        // Last-review-wins: a copy with genuine review
                        // activity outranks one that has never been reviewed,
                        // and the more recently reviewed copy wins. Ties keep
                        // memory.
                        let take_disk = match (disk.last_review, mem.last_review) {
                            (Some(d), Some(m)) => d > m,
                            (Some(_), None) => true,
                            (None, _) => false,
                        };
                        if take_disk {
                            cache.insert(id, disk);
                            report.conflicts += 1;
                        }
                    }
                }
            }
        }

        log::debug!(
            "Merge from {:?}: {} merged, {} conflicts",
            self.dir,
            report.merged,
            report.conflicts
        );
        Ok(report)
    }

    fn stats(&self) -> StoreStats {
        let now = Utc::now();
        let cache = self.cache.lock().unwrap();

        let mut stats = StoreStats {
            total_records: cache.len(),
            ..Default::default()
        };
        for record in cache.values() {
            match record.phase {
                CardPhase::New => stats.new_cards += 1,
                CardPhase::Learning => stats.learning_cards += 1,
                CardPhase::Review => stats.review_cards += 1,
                CardPhase::Relearning => stats.relearning_cards += 1,
            }
            if record.suspended {
                stats.suspended_cards += 1;
            }
            if record.is_due(now) {
                stats.due_cards += 1;
            }
        }
        stats.dirty_shards = self.dirty.lock().unwrap().len();
        stats
    }
}
