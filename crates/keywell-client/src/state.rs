//! Shared cache state between foreground calls and the maintenance task.

use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use keywell_cache::CacheStore;
use keywell_core::{CacheState, CacheStatus, MaintenanceHealth};

/// Cache store plus lock-free status counters.
///
/// The store itself sits behind one exclusive mutex covering every mutating
/// operation; that single lock is what serializes foreground consumption
/// against background replenishment and upholds exactly-once consumption
/// under concurrency. Status reads come from atomics refreshed after each
/// mutation, so `check_cache_status` never contends with a rotation or a
/// download in progress (it may trail by one maintenance tick).
pub(crate) struct CacheShared {
    store: Mutex<CacheStore>,
    /// Pool size at which the cache first reports ready.
    pub min_num_cached_bytes: u64,

    remaining: AtomicU64,
    /// Bytes an append can still store (pool and location bounds combined).
    headroom: AtomicU64,
    total_downloaded: AtomicU64,
    /// Sticky: never cleared once set.
    ready: AtomicBool,
    consecutive_failures: AtomicU32,
    /// Sticky until a download succeeds.
    stalled: AtomicBool,
    /// Bumped by `wipe` so an in-flight download result is discarded.
    wipe_generation: AtomicU64,
}

impl CacheShared {
    pub fn new(store: CacheStore, min_num_cached_bytes: u64) -> Self {
        let shared = Self {
            store: Mutex::new(store),
            min_num_cached_bytes,
            remaining: AtomicU64::new(0),
            headroom: AtomicU64::new(0),
            total_downloaded: AtomicU64::new(0),
            ready: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            stalled: AtomicBool::new(false),
            wipe_generation: AtomicU64::new(0),
        };
        shared.refresh(&shared.lock_store());
        shared
    }

    /// Take the exclusive store lock.
    ///
    /// A poisoned lock means some operation panicked mid-mutation; the store
    /// itself stays consistent (its invariants are re-established from disk
    /// on open), so we keep serving rather than wedging every caller.
    pub fn lock_store(&self) -> MutexGuard<'_, CacheStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh the status atomics from the store. Call with the lock held.
    pub fn refresh(&self, store: &CacheStore) {
        let remaining = store.remaining();
        self.remaining.store(remaining, Ordering::Release);
        self.headroom.store(store.headroom(), Ordering::Release);
        self.total_downloaded.store(store.total_downloaded(), Ordering::Release);
        if remaining >= self.min_num_cached_bytes {
            self.ready.store(true, Ordering::Release);
        }
    }

    /// Unconsumed bytes, as of the last refresh.
    #[allow(dead_code)]
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Storable bytes, as of the last refresh. Replenishment requests no
    /// more than this: when the locations hold less than the pool bound,
    /// asking for the full pool deficit would only produce bytes the store
    /// must reject.
    pub fn headroom(&self) -> u64 {
        self.headroom.load(Ordering::Acquire)
    }

    /// Current wipe generation; compare around a download to detect a wipe.
    pub fn wipe_generation(&self) -> u64 {
        self.wipe_generation.load(Ordering::Acquire)
    }

    /// Mark a wipe; any download that started earlier must be discarded.
    pub fn bump_wipe_generation(&self) {
        self.wipe_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a successful download tick.
    pub fn record_maintenance_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.stalled.store(false, Ordering::Release);
    }

    /// Record a failed download tick; returns the new consecutive count.
    pub fn record_maintenance_failure(&self, stall_threshold: u32) -> u32 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= stall_threshold {
            self.stalled.store(true, Ordering::Release);
        }
        failures
    }

    /// Lock-free status snapshot.
    pub fn status(&self) -> CacheStatus {
        let state = if self.ready.load(Ordering::Acquire) {
            CacheState::Ready
        } else {
            CacheState::Downloading
        };
        let maintenance = if self.stalled.load(Ordering::Acquire) {
            MaintenanceHealth::Stalled {
                consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            }
        } else {
            MaintenanceHealth::Nominal
        };
        CacheStatus {
            state,
            remaining_capacity: self.remaining.load(Ordering::Acquire),
            total_downloaded_random: self.total_downloaded.load(Ordering::Acquire),
            maintenance,
        }
    }
}
