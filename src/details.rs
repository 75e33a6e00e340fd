//! Transaction placement lookups.
//!
//! Resolves where a transaction currently stands by combining the receipt
//! lookup, the node mempool, and the confirmed count. A node without txpool
//! support degrades to [`TxStatus::Unsupported`] instead of failing.

use std::sync::Arc;

use alloy::primitives::{Address, B256};

use crate::error::DispatchResult;
use crate::inspector::AccountInspector;
use crate::node::NodeClient;
use crate::types::{PooledTx, Receipt, TxStatus};

/// Outcome of a hash lookup: the status plus whatever body was found.
#[derive(Debug, Clone, PartialEq)]
pub struct TxPlacement {
    pub status: TxStatus,
    pub receipt: Option<Receipt>,
    pub pooled: Option<PooledTx>,
}

impl TxPlacement {
    fn status_only(status: TxStatus) -> Self {
        Self {
            status,
            receipt: None,
            pooled: None,
        }
    }
}

/// Status queries for individual transactions.
#[derive(Clone)]
pub struct TransactionDetails {
    node: Arc<dyn NodeClient>,
    inspector: AccountInspector,
}

impl TransactionDetails {
    pub fn new(node: Arc<dyn NodeClient>, inspector: AccountInspector) -> Self {
        Self { node, inspector }
    }

    /// Resolve a hash: mined receipt first, then the content form of the
    /// pool under the checksummed sender, pending before queued.
    pub async fn by_hash(&self, from: Address, hash: B256) -> DispatchResult<TxPlacement> {
        if let Some(receipt) = self.node.get_receipt(hash).await? {
            return Ok(TxPlacement {
                status: TxStatus::Mined,
                receipt: Some(receipt),
                pooled: None,
            });
        }

        let content = self.inspector.mempool_content(from).await?;
        if !content.supported {
            return Ok(TxPlacement::status_only(TxStatus::Unsupported));
        }

        if let Some(tx) = content.pending.values().find(|tx| tx.hash == hash) {
            return Ok(TxPlacement {
                status: TxStatus::Pending,
                receipt: None,
                pooled: Some(tx.clone()),
            });
        }
        if let Some(tx) = content.queued.values().find(|tx| tx.hash == hash) {
            return Ok(TxPlacement {
                status: TxStatus::Queued,
                receipt: None,
                pooled: Some(tx.clone()),
            });
        }
        Ok(TxPlacement::status_only(TxStatus::Unknown))
    }

    /// Resolve an (address, nonce) pair against the inspect form of the
    /// pool, falling back to the confirmed count.
    ///
    /// A queued nonce never resolves to `Mined` here; queued means a gap
    /// still precedes it.
    pub async fn by_nonce(&self, from: Address, nonce: u64) -> DispatchResult<TxStatus> {
        let view = self.inspector.mempool_view(from).await?;
        if !view.supported {
            return Ok(TxStatus::Unsupported);
        }

        if view.pending.contains_key(&nonce) {
            return Ok(TxStatus::Pending);
        }
        if view.queued.contains_key(&nonce) {
            return Ok(TxStatus::Queued);
        }
        if nonce < self.inspector.confirmed_count(from).await? {
            return Ok(TxStatus::Mined);
        }
        Ok(TxStatus::Unknown)
    }
}
