//! Node-side account lookups: confirmed count and mempool views.
//!
//! The confirmed count is always taken on a latest-block basis; the pending
//! count some nodes report is not trusted anywhere in this crate. Mempool
//! replies are keyed by checksummed address, so the inspector normalizes the
//! queried address before indexing.

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::debug;

use crate::error::{is_not_supported, DispatchResult};
use crate::node::NodeClient;
use crate::types::{ContentView, MempoolView};

/// Read-only account state queries against the node.
#[derive(Clone)]
pub struct AccountInspector {
    node: Arc<dyn NodeClient>,
}

impl AccountInspector {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self { node }
    }

    /// Number of confirmed transactions from `address` (latest block).
    pub async fn confirmed_count(&self, address: Address) -> DispatchResult<u64> {
        self.node.transaction_count(address).await
    }

    /// Summary mempool view for one account.
    ///
    /// A node without txpool support yields the empty, `supported == false`
    /// view rather than an error; allocation then proceeds on the confirmed
    /// count alone.
    pub async fn mempool_view(&self, address: Address) -> DispatchResult<MempoolView> {
        let inspect = match self.node.txpool_inspect().await {
            Ok(inspect) => inspect,
            Err(e) if is_not_supported(&e.to_string()) => {
                debug!(%address, "txpool_inspect unsupported, using empty view");
                return Ok(MempoolView::unsupported());
            }
            Err(e) => return Err(e),
        };

        let key = address.to_checksum(None);
        Ok(MempoolView {
            pending: inspect.pending.get(&key).cloned().unwrap_or_default(),
            queued: inspect.queued.get(&key).cloned().unwrap_or_default(),
            supported: true,
        })
    }

    /// Content mempool view for one account (full transaction bodies).
    pub async fn mempool_content(&self, address: Address) -> DispatchResult<ContentView> {
        let content = match self.node.txpool_content().await {
            Ok(content) => content,
            Err(e) if is_not_supported(&e.to_string()) => {
                debug!(%address, "txpool_content unsupported, using empty view");
                return Ok(ContentView::unsupported());
            }
            Err(e) => return Err(e),
        };

        let key = address.to_checksum(None);
        Ok(ContentView {
            pending: content.pending.get(&key).cloned().unwrap_or_default(),
            queued: content.queued.get(&key).cloned().unwrap_or_default(),
            supported: true,
        })
    }
}
