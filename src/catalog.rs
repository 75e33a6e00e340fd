//! Contract catalog: named, network-scoped call-encoding capability.
//!
//! The pipeline treats ABI handling as opaque. A [`ContractCatalog`] resolves
//! a name to a [`ContractHandle`] carrying the deployed address and an
//! encoder; how the encoder works (generated bindings, dynamic ABI, manual)
//! is the implementation's business. [`JsonAbiCatalog`] is the bundled
//! dynamic-ABI implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::JsonAbi,
    primitives::{Address, Bytes},
};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::error::{DispatchError, DispatchResult};

// ============================================================================
// Capability traits
// ============================================================================

/// Encodes method calls against one contract.
pub trait CallEncoder: Send + Sync {
    fn encode_call(&self, method: &str, args: &[DynSolValue]) -> DispatchResult<Bytes>;
}

/// A resolved contract binding.
#[derive(Clone)]
pub struct ContractHandle {
    pub name: String,
    pub address: Address,
    encoder: Arc<dyn CallEncoder>,
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

impl ContractHandle {
    pub fn new(name: impl Into<String>, address: Address, encoder: Arc<dyn CallEncoder>) -> Self {
        Self {
            name: name.into(),
            address,
            encoder,
        }
    }

    pub fn encode_call(&self, method: &str, args: &[DynSolValue]) -> DispatchResult<Bytes> {
        self.encoder.encode_call(method, args)
    }
}

/// Resolves contract names to handles.
#[async_trait]
pub trait ContractCatalog: Send + Sync {
    async fn contract(&self, name: &str) -> DispatchResult<ContractHandle>;

    /// Every registered name, used by the preload pass.
    fn names(&self) -> Vec<String>;
}

// ============================================================================
// JSON-ABI implementation
// ============================================================================

/// One registered artifact: the ABI plus its per-network deployments.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub abi: JsonAbi,
    /// chain id → deployed address.
    pub networks: BTreeMap<u64, Address>,
}

impl ContractArtifact {
    pub fn new(abi: JsonAbi) -> Self {
        Self {
            abi,
            networks: BTreeMap::new(),
        }
    }

    pub fn deployed_on(mut self, chain_id: u64, address: Address) -> Self {
        self.networks.insert(chain_id, address);
        self
    }
}

/// Catalog over JSON ABIs with dynamic call encoding.
///
/// Handles are memoized compute-once; the memo is shared across tasks.
pub struct JsonAbiCatalog {
    chain_id: u64,
    artifacts: BTreeMap<String, ContractArtifact>,
    resolved: DashMap<String, ContractHandle>,
}

impl JsonAbiCatalog {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            artifacts: BTreeMap::new(),
            resolved: DashMap::new(),
        }
    }

    pub fn register(mut self, name: impl Into<String>, artifact: ContractArtifact) -> Self {
        self.artifacts.insert(name.into(), artifact);
        self
    }
}

#[async_trait]
impl ContractCatalog for JsonAbiCatalog {
    async fn contract(&self, name: &str) -> DispatchResult<ContractHandle> {
        if let Some(handle) = self.resolved.get(name) {
            return Ok(handle.clone());
        }

        let artifact = self
            .artifacts
            .get(name)
            .ok_or_else(|| DispatchError::not_found(format!("contract {name}")))?;
        let address = artifact.networks.get(&self.chain_id).copied().ok_or(
            DispatchError::NoNetworkInContract {
                contract: name.to_string(),
                chain_id: self.chain_id,
            },
        )?;

        let handle = ContractHandle::new(
            name,
            address,
            Arc::new(AbiEncoder {
                abi: artifact.abi.clone(),
            }),
        );
        trace!(contract = name, %address, "resolved contract binding");

        // First resolution wins; a racing task gets the same handle.
        Ok(self
            .resolved
            .entry(name.to_string())
            .or_insert(handle)
            .clone())
    }

    fn names(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }
}

struct AbiEncoder {
    abi: JsonAbi,
}

impl CallEncoder for AbiEncoder {
    fn encode_call(&self, method: &str, args: &[DynSolValue]) -> DispatchResult<Bytes> {
        let overloads = self
            .abi
            .function(method)
            .ok_or_else(|| DispatchError::not_found(format!("function {method}")))?;

        // Overloads are disambiguated by arity.
        let function = overloads
            .iter()
            .find(|f| f.inputs.len() == args.len())
            .ok_or_else(|| {
                DispatchError::generic(format!(
                    "no overload of {method} takes {} arguments",
                    args.len()
                ))
            })?;

        let data = function
            .abi_encode_input(args)
            .map_err(|e| DispatchError::generic(format!("encoding {method} failed: {e}")))?;
        Ok(data.into())
    }
}
