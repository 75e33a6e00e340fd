//! Pipeline assembly.
//!
//! One [`Dispatcher`] per address space replaces the process-wide singleton
//! of older designs: it owns the store, nonce manager, builder, sender and
//! details modules, wired over one node client and one catalog. Components
//! remain individually constructible for embedding and testing.

use std::sync::Arc;

use crate::builder::TransactionBuilder;
use crate::catalog::ContractCatalog;
use crate::config::DispatchConfig;
use crate::details::TransactionDetails;
use crate::error::DispatchResult;
use crate::inspector::AccountInspector;
use crate::node::NodeClient;
use crate::nonce::NonceManager;
use crate::receipt::ReceiptWaiter;
use crate::sender::Sender;
use crate::store::{InMemoryStore, KvStore};

/// The assembled transaction pipeline.
pub struct Dispatcher {
    sender: Sender,
    details: TransactionDetails,
    nonces: NonceManager,
    receipts: ReceiptWaiter,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Assemble a pipeline over the default in-memory store.
    pub async fn new(
        node: Arc<dyn NodeClient>,
        catalog: Arc<dyn ContractCatalog>,
        config: DispatchConfig,
    ) -> DispatchResult<Self> {
        let store = Arc::new(InMemoryStore::from_config(&config));
        Self::with_store(node, catalog, store, config).await
    }

    /// Assemble a pipeline over a caller-provided store.
    pub async fn with_store(
        node: Arc<dyn NodeClient>,
        catalog: Arc<dyn ContractCatalog>,
        store: Arc<dyn KvStore>,
        config: DispatchConfig,
    ) -> DispatchResult<Self> {
        config.validate()?;

        if config.preload_contracts {
            // Resolve everything once so a bad artifact or a missing network
            // binding surfaces here, not at the first send.
            for name in catalog.names() {
                catalog.contract(&name).await?;
            }
        }

        let inspector = AccountInspector::new(Arc::clone(&node));
        let nonces = NonceManager::new(store, inspector.clone());
        let builder =
            TransactionBuilder::new(Arc::clone(&catalog), nonces.clone(), config.clone());
        let receipts = ReceiptWaiter::new(Arc::clone(&node));
        let sender = Sender::new(
            Arc::clone(&node),
            builder,
            receipts.clone(),
            config.clone(),
        );
        let details = TransactionDetails::new(node, inspector);

        Ok(Self {
            sender,
            details,
            nonces,
            receipts,
        })
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn details(&self) -> &TransactionDetails {
        &self.details
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    pub fn receipts(&self) -> &ReceiptWaiter {
        &self.receipts
    }
}
