//! Single and chained transaction submission.
//!
//! ## Signing modes
//!
//! With a [`SignCallback`] present, the sender assigns nonces itself, hands
//! the raw transaction(s) to the callback under the signing timeout, checks
//! that every returned blob recovers to the declared sender, and submits the
//! signed bytes. Without one, the node signs and submits (and assigns the
//! nonce unless an override supplied it).
//!
//! ## Nonce release on failure
//!
//! A failed send releases its manager-assigned nonce unless the classified
//! error is a nonce rejection: that nonce is bad, and handing it back would
//! only repeat the failure. Chains follow the same rule for the failing
//! transaction and always release the nonces of everything after it.
//!
//! ## Chains
//!
//! Chain submissions are strictly ordered: each transaction is awaited to a
//! mined receipt before the next is submitted. External signing is a single
//! batch callback up-front. On failure the remainder (failing transaction
//! included) is surfaced inside [`DispatchError::FailedTxChain`].

use std::sync::Arc;
use std::time::Duration;

use alloy::{
    consensus::{transaction::SignerRecoverable, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{Address, Bytes, U256},
};
use async_trait::async_trait;
use dashmap::DashSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::builder::{CallSpec, TransactionBuilder};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::node::NodeClient;
use crate::receipt::ReceiptWaiter;
use crate::types::{Overrides, RawTransaction, Receipt};

// ============================================================================
// External signer capability
// ============================================================================

/// Detached signer: receives raw transactions, returns signed wire blobs of
/// the same cardinality. The private key never enters this crate.
#[async_trait]
pub trait SignCallback: Send + Sync {
    async fn sign(&self, from: Address, txs: &[RawTransaction]) -> DispatchResult<Vec<Bytes>>;
}

/// Recover the signer address from a signed wire blob.
fn recover_signer(blob: &Bytes) -> DispatchResult<Address> {
    let envelope = TxEnvelope::decode_2718(&mut blob.as_ref())
        .map_err(|e| DispatchError::generic(format!("undecodable signed transaction: {e}")))?;
    envelope
        .recover_signer()
        .map_err(|e| DispatchError::generic(format!("signature recovery failed: {e}")))
}

// ============================================================================
// Sender
// ============================================================================

/// Drives transactions from build through signing to a mined receipt.
pub struct Sender {
    node: Arc<dyn NodeClient>,
    builder: TransactionBuilder,
    receipts: ReceiptWaiter,
    config: DispatchConfig,
    /// Targets already confirmed to carry code.
    verified_code: DashSet<Address>,
}

impl Sender {
    pub fn new(
        node: Arc<dyn NodeClient>,
        builder: TransactionBuilder,
        receipts: ReceiptWaiter,
        config: DispatchConfig,
    ) -> Self {
        Self {
            node,
            builder,
            receipts,
            config,
            verified_code: DashSet::new(),
        }
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    fn mining_budget(&self, overrides: &Overrides) -> Duration {
        overrides
            .wait_for_mine_timeout
            .unwrap_or(self.config.tx_mining_timeout)
    }

    // ------------------------------------------------------------------
    // Single sends
    // ------------------------------------------------------------------

    /// Submit one contract call and wait for its receipt.
    pub async fn send(
        &self,
        from: Address,
        signer: Option<&dyn SignCallback>,
        call: &CallSpec,
        overrides: &Overrides,
    ) -> DispatchResult<Receipt> {
        let tx = self
            .builder
            .build_call(from, call, signer.is_some(), overrides)
            .await?;
        self.finish_single(from, signer, tx, true, overrides).await
    }

    /// Submit one native-coin transfer and wait for its receipt.
    pub async fn send_transfer(
        &self,
        from: Address,
        signer: Option<&dyn SignCallback>,
        to: Address,
        value: U256,
        overrides: &Overrides,
    ) -> DispatchResult<Receipt> {
        let tx = self
            .builder
            .build_transfer(from, to, value, signer.is_some(), overrides)
            .await?;
        self.finish_single(from, signer, tx, false, overrides).await
    }

    /// Common tail of single sends: submit, await, apply the release rule.
    async fn finish_single(
        &self,
        from: Address,
        signer: Option<&dyn SignCallback>,
        tx: RawTransaction,
        check_code: bool,
        overrides: &Overrides,
    ) -> DispatchResult<Receipt> {
        // The nonce belongs to the manager only when it was acquired for
        // this call; overrides bypass acquire and release alike.
        let managed = match (overrides.nonce, signer) {
            (None, Some(_)) => tx.nonce,
            _ => None,
        };

        match self
            .submit_and_mine(from, signer, &tx, check_code, overrides)
            .await
        {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                let e = e.classify();
                if let Some(nonce) = managed {
                    if e.releases_nonce() {
                        if let Err(release_err) = self.builder.nonces().release(from, nonce).await
                        {
                            warn!(%from, nonce, error = %release_err, "failed to release nonce after send failure");
                        } else {
                            debug!(%from, nonce, "released nonce after send failure");
                        }
                    }
                }
                Err(e)
            }
        }
    }

    async fn submit_and_mine(
        &self,
        from: Address,
        signer: Option<&dyn SignCallback>,
        tx: &RawTransaction,
        check_code: bool,
        overrides: &Overrides,
    ) -> DispatchResult<Receipt> {
        if check_code {
            self.ensure_deployed(tx.to).await?;
        }
        let hash = match signer {
            Some(signer) => {
                let mut blobs = self
                    .sign_batch(signer, from, std::slice::from_ref(tx))
                    .await?;
                self.node.send_raw(blobs.remove(0)).await?
            }
            None => self.node.send_tx(tx).await?,
        };
        debug!(%from, %hash, nonce = ?tx.nonce, "transaction submitted");
        self.receipts.wait(hash, self.mining_budget(overrides)).await
    }

    // ------------------------------------------------------------------
    // Chains
    // ------------------------------------------------------------------

    /// Submit an ordered chain, each step awaited to a mined receipt before
    /// the next. Returns the receipt of the last transaction.
    pub async fn send_chain(
        &self,
        from: Address,
        signer: Option<&dyn SignCallback>,
        calls: &[CallSpec],
        overrides: &Overrides,
    ) -> DispatchResult<Receipt> {
        let assigned = signer.is_some();
        let txs = self
            .builder
            .build_chain(from, calls, assigned, overrides)
            .await?;

        // External signing is one batch call covering the whole chain.
        let blobs = match signer {
            Some(signer) => match self.sign_batch(signer, from, &txs).await {
                Ok(blobs) => Some(blobs),
                Err(e) => return Err(self.fail_chain(from, assigned, &txs, 0, e).await),
            },
            None => None,
        };

        let budget = self.mining_budget(overrides);
        let mut last = None;
        for (index, tx) in txs.iter().enumerate() {
            let submitted = match &blobs {
                Some(blobs) => self.node.send_raw(blobs[index].clone()).await,
                None => self.node.send_tx(tx).await,
            };
            let hash = match submitted {
                Ok(hash) => hash,
                Err(e) => return Err(self.fail_chain(from, assigned, &txs, index, e).await),
            };
            debug!(%from, %hash, step = index, "chain transaction submitted");

            match self.receipts.wait(hash, budget).await {
                Ok(receipt) => last = Some(receipt),
                Err(e) => return Err(self.fail_chain(from, assigned, &txs, index, e).await),
            }
        }

        last.ok_or_else(|| DispatchError::generic("empty transaction chain"))
    }

    /// Build the chain failure: classify the cause, release nonces of the
    /// unsent remainder, and wrap it all up.
    ///
    /// The failing transaction keeps its nonce only on a nonce rejection;
    /// every transaction after it always releases.
    async fn fail_chain(
        &self,
        from: Address,
        assigned: bool,
        txs: &[RawTransaction],
        failed_index: usize,
        cause: DispatchError,
    ) -> DispatchError {
        let cause = cause.classify();
        let unsent: Vec<RawTransaction> = txs[failed_index..].to_vec();

        if assigned {
            let release: Vec<u64> = unsent
                .iter()
                .enumerate()
                .filter(|(offset, _)| *offset != 0 || cause.releases_nonce())
                .filter_map(|(_, tx)| tx.nonce)
                .collect();
            if !release.is_empty() {
                if let Err(e) = self.builder.nonces().release_many(from, &release).await {
                    warn!(%from, error = %e, "failed to release nonces of unsent chain remainder");
                } else {
                    debug!(%from, released = ?release, "released nonces of unsent chain remainder");
                }
            }
        }

        DispatchError::FailedTxChain {
            cause: Box::new(cause),
            unsent,
        }
    }

    // ------------------------------------------------------------------
    // Signing and preflight
    // ------------------------------------------------------------------

    /// Run the external signer under its budget and verify every blob.
    async fn sign_batch(
        &self,
        signer: &dyn SignCallback,
        from: Address,
        txs: &[RawTransaction],
    ) -> DispatchResult<Vec<Bytes>> {
        let blobs = timeout(self.config.tx_signing_timeout, signer.sign(from, txs))
            .await
            .map_err(|_| DispatchError::timeout("transaction signing"))??;

        if blobs.len() != txs.len() {
            return Err(DispatchError::generic(format!(
                "signer returned {} blobs for {} transactions",
                blobs.len(),
                txs.len()
            )));
        }
        for blob in &blobs {
            let recovered = recover_signer(blob)?;
            if recovered != from {
                return Err(DispatchError::SignerMismatch {
                    expected: from,
                    recovered,
                });
            }
        }
        Ok(blobs)
    }

    /// Fail fast on call targets with no code. Verified targets are memoized.
    async fn ensure_deployed(&self, address: Address) -> DispatchResult<()> {
        if self.verified_code.contains(&address) {
            return Ok(());
        }
        let code = self.node.get_code(address).await?;
        if code.is_empty() {
            return Err(DispatchError::NotDeployed { address });
        }
        self.verified_code.insert(address);
        Ok(())
    }
}
