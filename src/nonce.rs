//! Nonce allocation with gap filling and mempool awareness.
//!
//! ## Problem Statement
//!
//! Transactions from one account must carry sequential nonces. Concurrent
//! callers, dropped transactions and external submissions all fragment the
//! local picture of which nonces are safe to use. This module serves unique
//! nonces per account by combining three sources on every allocation:
//!
//! - the node's confirmed count (the floor: anything below is mined),
//! - the node's per-account mempool (pending and queued reservations),
//! - the local store of nonces handed out and not yet seen mined.
//!
//! ## Allocation policy
//!
//! Allocation is gap-first: the lowest value at or above the confirmed count
//! that no source knows about wins. A release that leaves a hole below the
//! highest reservation is therefore refilled on the next acquire, instead of
//! growing the queued tail of the mempool forever.
//!
//! ## Concurrency
//!
//! The full read-compute-write cycle for one account runs under the store's
//! per-key lock. Node reads happen inside the critical section (they decide
//! what is allocatable), and the final `put` doubles as the unlock. Failures
//! after the lock is taken release it before surfacing.

use std::collections::BTreeSet;
use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{debug, trace};

use crate::error::DispatchResult;
use crate::inspector::AccountInspector;
use crate::store::{KvStore, NonceSet};
use crate::types::MempoolView;

// ============================================================================
// Pure allocation step
// ============================================================================

/// First nonce ≥ `tx_count` unknown to every source.
///
/// Stored or mempool values below `tx_count` are already mined and ignored.
/// Total: the scan stops at `max(known) + 1`, which is always vacant.
pub fn allocate(stored: &NonceSet, tx_count: u64, mempool: &MempoolView) -> u64 {
    let known: BTreeSet<u64> = stored
        .iter()
        .copied()
        .chain(mempool.known_nonces())
        .filter(|n| *n >= tx_count)
        .collect();

    let max_known = known.last().copied().map_or(tx_count, |m| m.max(tx_count));
    let mut next = tx_count;
    while next <= max_known && known.contains(&next) {
        next += 1;
    }
    next
}

// ============================================================================
// NonceManager
// ============================================================================

/// Dispenses, releases, and clears per-account nonce reservations.
#[derive(Clone)]
pub struct NonceManager {
    store: Arc<dyn KvStore>,
    inspector: AccountInspector,
}

impl NonceManager {
    pub fn new(store: Arc<dyn KvStore>, inspector: AccountInspector) -> Self {
        Self { store, inspector }
    }

    /// Accounts are keyed by their checksummed textual form.
    fn key(address: Address) -> String {
        address.to_checksum(None)
    }

    /// Reserve a nonce for `address`.
    ///
    /// As a side effect, reservations strictly below the confirmed count are
    /// dropped: those transactions are mined and the values are no longer
    /// ours to reuse.
    pub async fn acquire(&self, address: Address) -> DispatchResult<u64> {
        let key = Self::key(address);
        self.store.lock(&key).await?;
        match self.acquire_locked(address, &key).await {
            // The put inside released the lock already.
            Ok(nonce) => Ok(nonce),
            Err(e) => {
                self.store.release(&key).await;
                Err(e)
            }
        }
    }

    async fn acquire_locked(&self, address: Address, key: &str) -> DispatchResult<u64> {
        let tx_count = self.inspector.confirmed_count(address).await?;
        let mempool = self.inspector.mempool_view(address).await?;

        let mut stored = self.store.get(key).await.unwrap_or_default();
        let mined: Vec<u64> = stored.range(..tx_count).copied().collect();
        if !mined.is_empty() {
            debug!(%address, released = ?mined, tx_count, "dropping reservations below confirmed count");
            for n in &mined {
                stored.remove(n);
            }
        }

        let nonce = allocate(&stored, tx_count, &mempool);
        stored.insert(nonce);
        self.store.put(key, stored).await;
        trace!(%address, nonce, "acquired nonce");
        Ok(nonce)
    }

    /// Return a single nonce to the pool.
    pub async fn release(&self, address: Address, nonce: u64) -> DispatchResult<()> {
        self.release_many(address, &[nonce]).await
    }

    /// Return several nonces in one lock-put cycle.
    pub async fn release_many(&self, address: Address, nonces: &[u64]) -> DispatchResult<()> {
        if nonces.is_empty() {
            return Ok(());
        }
        let key = Self::key(address);
        self.store.lock(&key).await?;
        let mut stored = self.store.get(&key).await.unwrap_or_default();
        for n in nonces {
            stored.remove(n);
        }
        self.store.put(&key, stored).await;
        debug!(%address, released = ?nonces, "released nonces");
        Ok(())
    }

    /// Forget every per-account reservation.
    ///
    /// Safe to call concurrently with `acquire`; a nonce already returned to
    /// a caller stays valid for that caller.
    pub async fn clear_accounts(&self) {
        self.store.clear().await;
        debug!("cleared all account reservations");
    }

    /// Snapshot of the reservations currently held for `address`.
    pub async fn held(&self, address: Address) -> NonceSet {
        self.store.get(&Self::key(address)).await.unwrap_or_default()
    }
}
