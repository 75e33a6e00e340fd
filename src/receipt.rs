//! Receipt polling with timeout and success assertion.
//!
//! Mining is observed by polling `eth_getTransactionReceipt` at a fixed
//! interval until the receipt appears or the budget runs out. A receipt with
//! a failure status is surfaced as an error, not returned.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use futures::future::try_join_all;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::error::{DispatchError, DispatchResult};
use crate::node::NodeClient;
use crate::types::Receipt;

/// Default interval between receipt polls.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Something the waiter can resolve: a hash still to be mined, or a receipt
/// already in hand (passed through unchanged).
#[derive(Debug, Clone)]
pub enum WaitTarget {
    Hash(B256),
    Settled(Receipt),
}

/// Polls the node for mined receipts.
#[derive(Clone)]
pub struct ReceiptWaiter {
    node: Arc<dyn NodeClient>,
    poll_interval: Duration,
}

impl ReceiptWaiter {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self {
            node,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for `hash` to mine within `budget` and assert it succeeded.
    pub async fn wait(&self, hash: B256, budget: Duration) -> DispatchResult<Receipt> {
        let deadline = Instant::now() + budget;
        loop {
            if let Some(receipt) = self.node.get_receipt(hash).await? {
                if !receipt.succeeded() {
                    debug!(%hash, "transaction mined with failure status");
                    return Err(DispatchError::generic(format!("tx failed: {hash}")));
                }
                trace!(%hash, block = ?receipt.block_number, "receipt received");
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(DispatchError::timeout(format!("mining of {hash}")));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Resolve one target, passing an already-settled receipt straight
    /// through.
    pub async fn resolve(&self, target: WaitTarget, budget: Duration) -> DispatchResult<Receipt> {
        match target {
            WaitTarget::Hash(hash) => self.wait(hash, budget).await,
            WaitTarget::Settled(receipt) => Ok(receipt),
        }
    }

    /// Wait for every hash in parallel, failing on the first error.
    pub async fn wait_all(&self, hashes: &[B256], budget: Duration) -> DispatchResult<Vec<Receipt>> {
        try_join_all(hashes.iter().map(|hash| self.wait(*hash, budget))).await
    }
}
