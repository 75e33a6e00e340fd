//! Node access capability.
//!
//! The pipeline never talks to the wire itself; every chain interaction goes
//! through [`NodeClient`]. The production implementation wraps an alloy
//! provider and speaks plain JSON-RPC; tests substitute a scripted stub.
//!
//! Errors leaving this boundary are already classified
//! ([`DispatchError::from_node`]), so callers only ever see one wrapping
//! layer.

use alloy::{
    network::Ethereum,
    primitives::{Address, Bytes, B256, U64},
    providers::Provider,
    rpc::client::NoParams,
};
use async_trait::async_trait;

use crate::error::{DispatchError, DispatchResult};
use crate::types::{MempoolContent, MempoolInspect, RawTransaction, Receipt};

// ============================================================================
// Capability trait
// ============================================================================

/// The node operations the pipeline consumes.
///
/// The node itself is externally shared; implementations must be safe to
/// call from concurrent tasks without additional locking.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Submit a pre-signed transaction, returning its hash.
    async fn send_raw(&self, raw: Bytes) -> DispatchResult<B256>;

    /// Ask the node to sign and submit an unsigned transaction.
    async fn send_tx(&self, tx: &RawTransaction) -> DispatchResult<B256>;

    /// Receipt of a mined transaction, `None` while unmined.
    async fn get_receipt(&self, hash: B256) -> DispatchResult<Option<Receipt>>;

    /// Confirmed transaction count for an account, latest-block basis.
    async fn transaction_count(&self, address: Address) -> DispatchResult<u64>;

    /// Summary form of the node mempool (`txpool_inspect`).
    async fn txpool_inspect(&self) -> DispatchResult<MempoolInspect>;

    /// Content form of the node mempool (`txpool_content`).
    async fn txpool_content(&self) -> DispatchResult<MempoolContent>;

    /// Deployed bytecode at an address, empty when none.
    async fn get_code(&self, address: Address) -> DispatchResult<Bytes>;
}

// ============================================================================
// Alloy-backed implementation
// ============================================================================

/// [`NodeClient`] over any alloy provider.
#[derive(Clone)]
pub struct RpcNodeClient<P> {
    provider: P,
}

impl<P: Provider<Ethereum>> RpcNodeClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: Provider<Ethereum>> NodeClient for RpcNodeClient<P> {
    async fn send_raw(&self, raw: Bytes) -> DispatchResult<B256> {
        self.provider
            .raw_request("eth_sendRawTransaction".into(), (raw,))
            .await
            .map_err(DispatchError::from_node)
    }

    async fn send_tx(&self, tx: &RawTransaction) -> DispatchResult<B256> {
        self.provider
            .raw_request("eth_sendTransaction".into(), (tx.clone(),))
            .await
            .map_err(DispatchError::from_node)
    }

    async fn get_receipt(&self, hash: B256) -> DispatchResult<Option<Receipt>> {
        self.provider
            .raw_request("eth_getTransactionReceipt".into(), (hash,))
            .await
            .map_err(DispatchError::from_node)
    }

    async fn transaction_count(&self, address: Address) -> DispatchResult<u64> {
        let count: U64 = self
            .provider
            .raw_request("eth_getTransactionCount".into(), (address, "latest"))
            .await
            .map_err(DispatchError::from_node)?;
        Ok(count.to::<u64>())
    }

    async fn txpool_inspect(&self) -> DispatchResult<MempoolInspect> {
        self.provider
            .raw_request("txpool_inspect".into(), NoParams::default())
            .await
            .map_err(DispatchError::from_node)
    }

    async fn txpool_content(&self) -> DispatchResult<MempoolContent> {
        self.provider
            .raw_request("txpool_content".into(), NoParams::default())
            .await
            .map_err(DispatchError::from_node)
    }

    async fn get_code(&self, address: Address) -> DispatchResult<Bytes> {
        self.provider
            .raw_request("eth_getCode".into(), (address, "latest"))
            .await
            .map_err(DispatchError::from_node)
    }
}
