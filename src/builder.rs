//! Transaction assembly with nonce compensation.
//!
//! The builder fills gas, gas price and chain id from per-call overrides or
//! the configured defaults, encodes call data through the catalog, and wires
//! in a nonce according to the call's mode:
//!
//! - explicit `overrides.nonce`: used as-is, the manager is bypassed;
//! - `assigned_nonce`: one is acquired from the manager;
//! - neither: the nonce is left unset and the node assigns it.
//!
//! Compensation invariant: a nonce the builder acquired and then failed to
//! use is released before the error propagates. Chain builds roll back every
//! nonce acquired so far.

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, U256},
};
use tracing::warn;

use crate::catalog::ContractCatalog;
use crate::config::DispatchConfig;
use crate::error::DispatchResult;
use crate::nonce::NonceManager;
use crate::types::{Overrides, RawTransaction, TRANSFER_GAS};

use std::sync::Arc;

// ============================================================================
// Call specification
// ============================================================================

/// One contract invocation, as named by the caller.
#[derive(Debug, Clone)]
pub struct CallSpec {
    pub contract: String,
    pub method: String,
    pub args: Vec<DynSolValue>,
}

impl CallSpec {
    pub fn new(contract: impl Into<String>, method: impl Into<String>, args: Vec<DynSolValue>) -> Self {
        Self {
            contract: contract.into(),
            method: method.into(),
            args,
        }
    }
}

/// How the nonce of a built transaction was determined.
enum NonceSource {
    /// Caller override; not the manager's to release.
    External(u64),
    /// Acquired from the manager; released on downstream failure.
    Managed(u64),
    /// Left for the node to assign.
    Node,
}

impl NonceSource {
    fn value(&self) -> Option<u64> {
        match self {
            NonceSource::External(n) | NonceSource::Managed(n) => Some(*n),
            NonceSource::Node => None,
        }
    }
}

// ============================================================================
// TransactionBuilder
// ============================================================================

/// Assembles raw call and transfer transactions.
#[derive(Clone)]
pub struct TransactionBuilder {
    catalog: Arc<dyn ContractCatalog>,
    nonces: NonceManager,
    config: DispatchConfig,
}

impl TransactionBuilder {
    pub fn new(
        catalog: Arc<dyn ContractCatalog>,
        nonces: NonceManager,
        config: DispatchConfig,
    ) -> Self {
        Self {
            catalog,
            nonces,
            config,
        }
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    async fn resolve_nonce(
        &self,
        from: Address,
        assigned_nonce: bool,
        overrides: &Overrides,
    ) -> DispatchResult<NonceSource> {
        if let Some(nonce) = overrides.nonce {
            return Ok(NonceSource::External(nonce));
        }
        if assigned_nonce {
            return Ok(NonceSource::Managed(self.nonces.acquire(from).await?));
        }
        Ok(NonceSource::Node)
    }

    /// Hand a managed nonce back after a failure between acquire and use.
    async fn compensate(&self, from: Address, source: &NonceSource) {
        if let NonceSource::Managed(nonce) = source {
            if let Err(e) = self.nonces.release(from, *nonce).await {
                warn!(%from, nonce, error = %e, "failed to release nonce after build failure");
            }
        }
    }

    fn assemble(
        &self,
        from: Address,
        to: Address,
        value: U256,
        data: Bytes,
        gas: u64,
        nonce: &NonceSource,
        overrides: &Overrides,
    ) -> RawTransaction {
        RawTransaction {
            from,
            to,
            value,
            gas,
            gas_price: overrides.gas_price.unwrap_or(self.config.gas_price),
            chain_id: overrides.chain_id.unwrap_or(self.config.chain_id),
            nonce: nonce.value(),
            data,
        }
    }

    /// Build a contract call transaction.
    pub async fn build_call(
        &self,
        from: Address,
        call: &CallSpec,
        assigned_nonce: bool,
        overrides: &Overrides,
    ) -> DispatchResult<RawTransaction> {
        let handle = self.catalog.contract(&call.contract).await?;
        let nonce = self.resolve_nonce(from, assigned_nonce, overrides).await?;

        let data = match handle.encode_call(&call.method, &call.args) {
            Ok(data) => data,
            Err(e) => {
                self.compensate(from, &nonce).await;
                return Err(e);
            }
        };

        let gas = overrides.gas.unwrap_or(self.config.gas_limit);
        let value = overrides.value.unwrap_or(U256::ZERO);
        Ok(self.assemble(from, handle.address, value, data, gas, &nonce, overrides))
    }

    /// Build a native-coin transfer. Gas is pinned to the transfer constant
    /// unless overridden.
    pub async fn build_transfer(
        &self,
        from: Address,
        to: Address,
        value: U256,
        assigned_nonce: bool,
        overrides: &Overrides,
    ) -> DispatchResult<RawTransaction> {
        let nonce = self.resolve_nonce(from, assigned_nonce, overrides).await?;
        let gas = overrides.gas.unwrap_or(TRANSFER_GAS);
        Ok(self.assemble(from, to, value, Bytes::new(), gas, &nonce, overrides))
    }

    /// Build an ordered chain of call transactions sharing one sender.
    ///
    /// With `assigned_nonce`, nonces are acquired sequentially, so the chain
    /// carries a contiguous run. An explicit nonce override does not apply
    /// to chains; one value cannot cover several transactions.
    pub async fn build_chain(
        &self,
        from: Address,
        calls: &[CallSpec],
        assigned_nonce: bool,
        overrides: &Overrides,
    ) -> DispatchResult<Vec<RawTransaction>> {
        let per_call = Overrides {
            nonce: None,
            ..overrides.clone()
        };

        let mut built: Vec<RawTransaction> = Vec::with_capacity(calls.len());
        for call in calls {
            match self.build_call(from, call, assigned_nonce, &per_call).await {
                Ok(tx) => built.push(tx),
                Err(e) => {
                    // The failing build released its own nonce; roll back
                    // the ones already committed to earlier entries.
                    let acquired: Vec<u64> = built.iter().filter_map(|tx| tx.nonce).collect();
                    if assigned_nonce && !acquired.is_empty() {
                        if let Err(release_err) =
                            self.nonces.release_many(from, &acquired).await
                        {
                            warn!(%from, error = %release_err, "failed to roll back chain nonces");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(built)
    }
}
