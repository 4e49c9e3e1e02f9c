//! Process-wide view of the pending transaction pool.
//!
//! One map of pending transactions plus the annotation cache, both behind a
//! single mutex. Ingest is idempotent; confirmation removes block contents;
//! eviction bounds both maps by age. All mutations are short critical
//! sections; annotation synthesis happens outside the lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::B256;

use cast_data::types::{PendingTx, TxAnnotation};

/// Pending entries and idle annotations older than this are evicted.
pub const MEMPOOL_TTL_MS: u64 = 60 * 60 * 1000;

struct CachedAnnotation {
    annotation: TxAnnotation,
    last_used_ms: u64,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<B256, PendingTx>,
    annotations: HashMap<B256, CachedAnnotation>,
}

/// Thread-safe mempool map with annotation cache.
pub struct MempoolState {
    inner: Mutex<Inner>,
}

impl Default for MempoolState {
    fn default() -> Self {
        Self::new()
    }
}

impl MempoolState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a transaction. Re-ingesting a known hash updates nothing;
    /// returns whether the entry is new.
    pub fn ingest(&self, tx: PendingTx) -> bool {
        let mut inner = self.lock();
        match inner.pending.entry(tx.hash) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(tx);
                true
            }
        }
    }

    /// Removes every supplied hash and its cached annotation. Returns how
    /// many pending entries were present.
    pub fn confirm_block(&self, hashes: &[B256]) -> usize {
        let mut inner = self.lock();
        let mut removed = 0;
        for hash in hashes {
            if inner.pending.remove(hash).is_some() {
                removed += 1;
            }
            inner.annotations.remove(hash);
        }
        removed
    }

    /// Drops pending entries first seen before `now_ms − TTL` and
    /// annotations idle for longer than the TTL. Returns evicted pending
    /// count.
    pub fn evict_stale(&self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(MEMPOOL_TTL_MS);
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner.pending.retain(|_, tx| tx.first_seen_ms >= cutoff);
        inner
            .annotations
            .retain(|_, cached| cached.last_used_ms >= cutoff);
        before - inner.pending.len()
    }

    /// All pending transactions, unordered.
    pub fn snapshot(&self) -> Vec<PendingTx> {
        self.lock().pending.values().cloned().collect()
    }

    /// One pending transaction by hash.
    pub fn get(&self, hash: &B256) -> Option<PendingTx> {
        self.lock().pending.get(hash).cloned()
    }

    /// Pending transactions first seen at or after `cutoff_ms`.
    pub fn recent_since(&self, cutoff_ms: u64) -> Vec<PendingTx> {
        self.lock()
            .pending
            .values()
            .filter(|tx| tx.first_seen_ms >= cutoff_ms)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Cached annotation, refreshing its last-used stamp.
    pub fn cached_annotation(&self, hash: &B256, now_ms: u64) -> Option<TxAnnotation> {
        let mut inner = self.lock();
        let cached = inner.annotations.get_mut(hash)?;
        cached.last_used_ms = now_ms;
        Some(cached.annotation.clone())
    }

    /// Stores an annotation for a hash.
    pub fn cache_annotation(&self, hash: B256, annotation: TxAnnotation, now_ms: u64) {
        self.lock().annotations.insert(
            hash,
            CachedAnnotation {
                annotation,
                last_used_ms: now_ms,
            },
        );
    }

    /// Number of cached annotations.
    pub fn annotation_count(&self) -> usize {
        self.lock().annotations.len()
    }

    /// Drops everything. Used when the node session resyncs.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.pending.clear();
        inner.annotations.clear();
    }
}
