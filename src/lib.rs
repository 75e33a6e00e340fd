//! # txdispatch
//!
//! Client-side transaction dispatch for EVM-style chains.
//!
//! ## Core Features
//!
//! - **Nonce Management**: unique, gap-filling nonce allocation per account,
//!   reconciled against the node's confirmed count and mempool
//! - **Transaction Pipeline**: build → sign (external callback or node) →
//!   submit → poll to a mined receipt, with nonce release on failure
//! - **Ordered Chains**: strictly sequential multi-transaction submission
//!   with a single batch signing call and precise failure reporting
//! - **Error Classification**: node errors mapped to a closed taxonomy by
//!   message pattern, driving the nonce release rules
//! - **Degraded Nodes**: missing txpool support downgrades to confirmed-count
//!   allocation and `Unsupported` status answers, never errors
//!
//! ## Usage
//!
//! ```ignore
//! use txdispatch::{Dispatcher, DispatchConfig, JsonAbiCatalog, RpcNodeClient};
//!
//! let node = Arc::new(RpcNodeClient::new(provider));
//! let dispatcher = Dispatcher::new(node, catalog, DispatchConfig::default()).await?;
//! let receipt = dispatcher.sender().send(from, Some(&signer), &call, &overrides).await?;
//! ```

// ============================================================================
// Internal Module Declarations
// ============================================================================

/// Transaction assembly with nonce compensation
mod builder;

/// Contract catalog and dynamic call encoding
mod catalog;

/// Pipeline configuration and defaults
mod config;

/// Transaction placement lookups (hash / nonce status)
mod details;

/// Pipeline assembly
mod dispatcher;

/// Error taxonomy and node-error classification
mod error;

/// Node-side account lookups (confirmed count, mempool views)
mod inspector;

/// Node access capability and the alloy-backed client
mod node;

/// Gap-filling nonce allocation
mod nonce;

/// Receipt polling
mod receipt;

/// Single and chained submission
mod sender;

/// Keyed nonce storage with locking
mod store;

/// Core data model and wire encoding
mod types;

/// Test fixtures (compiled only in test mode)
#[cfg(test)]
pub mod test_support;

// ============================================================================
// Public Exports
// ============================================================================

pub use builder::{CallSpec, TransactionBuilder};
pub use catalog::{CallEncoder, ContractArtifact, ContractCatalog, ContractHandle, JsonAbiCatalog};
pub use config::DispatchConfig;
pub use details::{TransactionDetails, TxPlacement};
pub use dispatcher::Dispatcher;
pub use error::{is_not_supported, DispatchError, DispatchResult};
pub use inspector::AccountInspector;
pub use node::{NodeClient, RpcNodeClient};
pub use nonce::{allocate, NonceManager};
pub use receipt::{ReceiptWaiter, WaitTarget};
pub use sender::{Sender, SignCallback};
pub use store::{InMemoryStore, KvStore, NonceSet};
pub use types::{
    ContentView, MempoolContent, MempoolInspect, MempoolView, Overrides, PooledTx, RawTransaction,
    Receipt, TxStatus, TRANSFER_GAS,
};
