//! Deterministic fixtures for exercising the pipeline without a node.
//!
//! `StubNode` is a scriptable [`NodeClient`]: transaction counts, mempool
//! replies, receipts and per-submission failures are all set by the test.
//! By default it auto-mines, inserting a success receipt for every
//! submission so receipt polling resolves on the first poll.

#[cfg(test)]
mod scenarios;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use alloy::{
    consensus::{transaction::SignerRecoverable, SignableTransaction, Transaction, TxEnvelope, TxLegacy},
    dyn_abi::DynSolValue,
    eips::eip2718::{Decodable2718, Encodable2718},
    network::TxSignerSync,
    primitives::{address, keccak256, Address, Bytes, TxKind, B256, U256},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::catalog::{ContractArtifact, JsonAbiCatalog};
use crate::error::{DispatchError, DispatchResult};
use crate::node::NodeClient;
use crate::sender::SignCallback;
use crate::types::{MempoolContent, MempoolInspect, MempoolView, RawTransaction, Receipt};

// ============================================================================
// Addresses and fixtures
// ============================================================================

pub const TOKEN_ADDRESS: Address = address!("00000000000000000000000000000000000000cc");
pub const MARKET_ADDRESS: Address = address!("00000000000000000000000000000000000000dd");

/// Chain id every fixture is registered on.
pub const TEST_CHAIN_ID: u64 = 5;

/// A minimal receipt with success status.
pub fn success_receipt(hash: B256) -> Receipt {
    Receipt {
        transaction_hash: hash,
        block_number: Some(1),
        block_hash: None,
        from: Address::ZERO,
        to: None,
        gas_used: 21_000,
        status: 1,
        contract_address: None,
    }
}

/// Per-account mempool view from plain nonce lists.
pub fn pool_view(pending: &[u64], queued: &[u64]) -> MempoolView {
    MempoolView {
        pending: pending.iter().map(|n| (*n, String::new())).collect(),
        queued: queued.iter().map(|n| (*n, String::new())).collect(),
        supported: true,
    }
}

/// Catalog with a token (transfer/approve) and a market (place) contract.
pub fn test_catalog() -> JsonAbiCatalog {
    let token_abi = serde_json::from_str(
        r#"[
            {
                "type": "function",
                "name": "transfer",
                "stateMutability": "nonpayable",
                "inputs": [
                    {"name": "to", "type": "address"},
                    {"name": "amount", "type": "uint256"}
                ],
                "outputs": [{"name": "", "type": "bool"}]
            },
            {
                "type": "function",
                "name": "approve",
                "stateMutability": "nonpayable",
                "inputs": [
                    {"name": "spender", "type": "address"},
                    {"name": "amount", "type": "uint256"}
                ],
                "outputs": [{"name": "", "type": "bool"}]
            }
        ]"#,
    )
    .unwrap();
    let market_abi = serde_json::from_str(
        r#"[
            {
                "type": "function",
                "name": "place",
                "stateMutability": "nonpayable",
                "inputs": [{"name": "id", "type": "bytes32"}],
                "outputs": []
            }
        ]"#,
    )
    .unwrap();

    JsonAbiCatalog::new(TEST_CHAIN_ID)
        .register(
            "Token",
            ContractArtifact::new(token_abi).deployed_on(TEST_CHAIN_ID, TOKEN_ADDRESS),
        )
        .register(
            "Market",
            ContractArtifact::new(market_abi).deployed_on(TEST_CHAIN_ID, MARKET_ADDRESS),
        )
}

pub fn approve_call(spender: Address, amount: u64) -> crate::builder::CallSpec {
    crate::builder::CallSpec::new(
        "Token",
        "approve",
        vec![
            DynSolValue::Address(spender),
            DynSolValue::Uint(U256::from(amount), 256),
        ],
    )
}

// ============================================================================
// Signing helpers
// ============================================================================

/// Deterministic test key.
pub fn test_signer() -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&B256::with_last_byte(1)).unwrap()
}

/// Second deterministic key, for mismatch cases.
pub fn other_signer() -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&B256::with_last_byte(2)).unwrap()
}

/// Sign a raw transaction as a legacy envelope and return the wire bytes.
pub fn sign_raw(tx: &RawTransaction, signer: &PrivateKeySigner) -> Bytes {
    let mut legacy = TxLegacy {
        chain_id: (tx.chain_id != 0).then_some(tx.chain_id),
        nonce: tx.nonce.unwrap_or_default(),
        gas_price: tx.gas_price,
        gas_limit: tx.gas,
        to: TxKind::Call(tx.to),
        value: tx.value,
        input: tx.data.clone(),
    };
    let signature = signer.sign_transaction_sync(&mut legacy).unwrap();
    let envelope: TxEnvelope = legacy.into_signed(signature).into();
    envelope.encoded_2718().into()
}

/// Callback signing with one fixed key.
pub struct KeySignCallback {
    signer: PrivateKeySigner,
}

impl KeySignCallback {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

#[async_trait]
impl SignCallback for KeySignCallback {
    async fn sign(&self, _from: Address, txs: &[RawTransaction]) -> DispatchResult<Vec<Bytes>> {
        Ok(txs.iter().map(|tx| sign_raw(tx, &self.signer)).collect())
    }
}

/// Callback that never returns within any realistic signing budget.
pub struct StalledSignCallback;

#[async_trait]
impl SignCallback for StalledSignCallback {
    async fn sign(&self, _from: Address, _txs: &[RawTransaction]) -> DispatchResult<Vec<Bytes>> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Callback returning the wrong number of blobs.
pub struct ShortSignCallback {
    pub signer: PrivateKeySigner,
}

#[async_trait]
impl SignCallback for ShortSignCallback {
    async fn sign(&self, _from: Address, txs: &[RawTransaction]) -> DispatchResult<Vec<Bytes>> {
        Ok(txs
            .iter()
            .skip(1)
            .map(|tx| sign_raw(tx, &self.signer))
            .collect())
    }
}

// ============================================================================
// StubNode
// ============================================================================

#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub hash: B256,
    pub from: Option<Address>,
    pub nonce: Option<u64>,
}

/// Scriptable in-process node.
pub struct StubNode {
    tx_counts: DashMap<Address, u64>,
    receipts: DashMap<B256, Receipt>,
    /// hash → polls remaining before the receipt becomes visible.
    receipt_gates: DashMap<B256, u32>,
    code: DashMap<Address, Bytes>,
    inspect: Mutex<Option<MempoolInspect>>,
    content: Mutex<Option<MempoolContent>>,
    txpool_enabled: AtomicBool,
    /// Scripted outcome per submission, front first. `None` = accept.
    send_script: Mutex<VecDeque<Option<DispatchError>>>,
    /// Scripted failures for transaction-count lookups.
    count_errors: Mutex<VecDeque<DispatchError>>,
    sent: Mutex<Vec<SubmittedTx>>,
    auto_mine: AtomicBool,
}

impl StubNode {
    pub fn new() -> Self {
        Self {
            tx_counts: DashMap::new(),
            receipts: DashMap::new(),
            receipt_gates: DashMap::new(),
            code: DashMap::new(),
            inspect: Mutex::new(None),
            content: Mutex::new(None),
            txpool_enabled: AtomicBool::new(true),
            send_script: Mutex::new(VecDeque::new()),
            count_errors: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            auto_mine: AtomicBool::new(true),
        }
    }

    pub fn set_transaction_count(&self, address: Address, count: u64) {
        self.tx_counts.insert(address, count);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.code.insert(address, code);
    }

    /// Deploy marker bytecode at the fixture contract addresses.
    pub fn deploy_fixture_contracts(&self) {
        self.set_code(TOKEN_ADDRESS, Bytes::from(vec![0x60, 0x00]));
        self.set_code(MARKET_ADDRESS, Bytes::from(vec![0x60, 0x00]));
    }

    pub fn disable_txpool(&self) {
        self.txpool_enabled.store(false, Ordering::SeqCst);
    }

    pub fn set_inspect(&self, inspect: MempoolInspect) {
        *self.inspect.lock().unwrap() = Some(inspect);
    }

    pub fn set_content(&self, content: MempoolContent) {
        *self.content.lock().unwrap() = Some(content);
    }

    pub fn insert_receipt(&self, receipt: Receipt) {
        self.receipts.insert(receipt.transaction_hash, receipt);
    }

    /// Make the receipt visible only after `polls` lookups.
    pub fn mine_after_polls(&self, receipt: Receipt, polls: u32) {
        self.receipt_gates.insert(receipt.transaction_hash, polls);
        self.insert_receipt(receipt);
    }

    pub fn set_auto_mine(&self, enabled: bool) {
        self.auto_mine.store(enabled, Ordering::SeqCst);
    }

    /// Accept the next `n` submissions.
    pub fn pass_sends(&self, n: usize) {
        let mut script = self.send_script.lock().unwrap();
        for _ in 0..n {
            script.push_back(None);
        }
    }

    /// Fail the next submission with `error`.
    pub fn fail_next_send(&self, error: DispatchError) {
        self.send_script.lock().unwrap().push_back(Some(error));
    }

    /// Fail the next transaction-count lookup with `error`.
    pub fn fail_next_count(&self, error: DispatchError) {
        self.count_errors.lock().unwrap().push_back(error);
    }

    pub fn sent(&self) -> Vec<SubmittedTx> {
        self.sent.lock().unwrap().clone()
    }

    fn scripted_outcome(&self) -> Result<(), DispatchError> {
        match self.send_script.lock().unwrap().pop_front() {
            Some(Some(error)) => Err(error),
            _ => Ok(()),
        }
    }

    fn record_submission(&self, hash: B256, from: Option<Address>, nonce: Option<u64>) {
        self.sent.lock().unwrap().push(SubmittedTx { hash, from, nonce });
        if self.auto_mine.load(Ordering::SeqCst) {
            let mut receipt = success_receipt(hash);
            if let Some(from) = from {
                receipt.from = from;
                // Mining advances the confirmed count past this nonce.
                if let Some(nonce) = nonce {
                    let mut count = self.tx_counts.entry(from).or_insert(0);
                    *count = (*count).max(nonce + 1);
                }
            }
            self.receipts.insert(hash, receipt);
        }
    }
}

impl Default for StubNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeClient for StubNode {
    async fn send_raw(&self, raw: Bytes) -> DispatchResult<B256> {
        self.scripted_outcome()?;
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| DispatchError::generic(format!("undecodable raw transaction: {e}")))?;
        let hash = *envelope.tx_hash();
        let from = envelope.recover_signer().ok();
        self.record_submission(hash, from, Some(envelope.nonce()));
        Ok(hash)
    }

    async fn send_tx(&self, tx: &RawTransaction) -> DispatchResult<B256> {
        self.scripted_outcome()?;
        let encoded = serde_json::to_vec(tx).expect("serializable transaction");
        let hash = keccak256(&encoded);
        let nonce = tx
            .nonce
            .or_else(|| self.tx_counts.get(&tx.from).map(|c| *c));
        self.record_submission(hash, Some(tx.from), nonce);
        Ok(hash)
    }

    async fn get_receipt(&self, hash: B256) -> DispatchResult<Option<Receipt>> {
        if let Some(mut gate) = self.receipt_gates.get_mut(&hash) {
            if *gate > 0 {
                *gate -= 1;
                return Ok(None);
            }
        }
        Ok(self.receipts.get(&hash).map(|r| r.clone()))
    }

    async fn transaction_count(&self, address: Address) -> DispatchResult<u64> {
        if let Some(error) = self.count_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.tx_counts.get(&address).map(|c| *c).unwrap_or(0))
    }

    async fn txpool_inspect(&self) -> DispatchResult<MempoolInspect> {
        if !self.txpool_enabled.load(Ordering::SeqCst) {
            return Err(DispatchError::generic(
                "Method txpool_inspect not supported.",
            ));
        }
        Ok(self.inspect.lock().unwrap().clone().unwrap_or_default())
    }

    async fn txpool_content(&self) -> DispatchResult<MempoolContent> {
        if !self.txpool_enabled.load(Ordering::SeqCst) {
            return Err(DispatchError::generic(
                "Method txpool_content not supported.",
            ));
        }
        Ok(self.content.lock().unwrap().clone().unwrap_or_default())
    }

    async fn get_code(&self, address: Address) -> DispatchResult<Bytes> {
        Ok(self
            .code
            .get(&address)
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}
