//! Keyed nonce storage with mutual-exclusion locking.
//!
//! The nonce manager keeps one entry per account: the set of nonces it has
//! handed out and not yet seen mined or released. The store is pluggable so
//! a deployment can persist reservations; the in-memory implementation here
//! is the default.
//!
//! ## Locking
//!
//! `lock(key)` gives the caller exclusive ownership of `key` until `put` or
//! `release` on that key. Because a holder may suspend on node I/O between
//! lock and put, every acquired lock arms a watchdog: if it is still held
//! after `lock_timeout` the store force-releases it and logs a warning, so
//! one stalled task cannot wedge an account forever.
//!
//! ```text
//!   Free ──lock()──► Locked (watchdog armed)
//!                        │ put() / release() / watchdog expiry
//!                        ▼
//!                      Free
//! ```

use std::collections::BTreeSet;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};

/// Per-account value stored by the nonce manager: the reserved nonce set.
pub type NonceSet = BTreeSet<u64>;

// ============================================================================
// Store capability
// ============================================================================

/// Per-key storage with optional exclusive locking.
///
/// `get` never blocks behind writers. `put` on a locked key releases the
/// lock as a side effect. Implementations that persist across restarts must
/// provide the same lock semantics.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<NonceSet>;
    async fn put(&self, key: &str, value: NonceSet);
    async fn delete(&self, key: &str);
    async fn keys(&self) -> Vec<String>;
    async fn clear(&self);

    /// Acquire the exclusive lock on `key`, waiting up to the configured
    /// acquisition budget. Fails with [`DispatchError::Timeout`] past it.
    async fn lock(&self, key: &str) -> DispatchResult<()>;

    /// Release the lock on `key` without writing.
    async fn release(&self, key: &str);
}

// ============================================================================
// In-memory implementation
// ============================================================================

struct StoreInner {
    data: DashMap<String, NonceSet>,
    /// key → generation of the currently held lock.
    locks: DashMap<String, u64>,
    generations: AtomicU64,
}

/// Default store: concurrent in-memory maps, one watchdog task per held lock.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
    lock_acquire_timeout: Duration,
    lock_check_interval: Duration,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                data: DashMap::new(),
                locks: DashMap::new(),
                generations: AtomicU64::new(0),
            }),
            lock_acquire_timeout: config.lock_acquire_timeout,
            lock_check_interval: config.lock_check_interval,
            lock_timeout: config.lock_timeout,
        }
    }

    /// Try to take the lock once. Returns the generation on success.
    fn try_lock(&self, key: &str) -> Option<u64> {
        match self.inner.locks.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
                slot.insert(generation);
                Some(generation)
            }
            Entry::Occupied(_) => None,
        }
    }

    /// Arm the auto-release watchdog for one acquired lock.
    ///
    /// The generation check makes a watchdog that outlives its lock a no-op:
    /// if the key was released and re-locked in the meantime, the stored
    /// generation differs and nothing is removed.
    fn arm_watchdog(&self, key: &str, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let budget = self.lock_timeout;
        let key = key.to_string();
        tokio::spawn(async move {
            sleep(budget).await;
            let expired = inner
                .locks
                .remove_if(&key, |_, held| *held == generation)
                .is_some();
            if expired {
                warn!(%key, budget_ms = budget.as_millis() as u64, "lock held past budget, auto-released");
            }
        });
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Option<NonceSet> {
        self.inner.data.get(key).map(|entry| entry.clone())
    }

    async fn put(&self, key: &str, value: NonceSet) {
        self.inner.data.insert(key.to_string(), value);
        // A write from the lock holder ends the critical section.
        self.inner.locks.remove(key);
    }

    async fn delete(&self, key: &str) {
        self.inner.data.remove(key);
    }

    async fn keys(&self) -> Vec<String> {
        self.inner.data.iter().map(|e| e.key().clone()).collect()
    }

    async fn clear(&self) {
        self.inner.data.clear();
    }

    async fn lock(&self, key: &str) -> DispatchResult<()> {
        let deadline = Instant::now() + self.lock_acquire_timeout;
        loop {
            if let Some(generation) = self.try_lock(key) {
                self.arm_watchdog(key, generation);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DispatchError::timeout(format!("lock acquisition for {key}")));
            }
            sleep(self.lock_check_interval).await;
        }
    }

    async fn release(&self, key: &str) {
        self.inner.locks.remove(key);
    }
}
