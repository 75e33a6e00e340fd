//! Core data model: raw transactions, mempool views, and status values.
//!
//! Quantities travel on the wire as `0x`-prefixed hex strings with no
//! leading-zero padding (`0` encodes as `0x0`). The serde helpers in
//! [`quantity`] implement that rule for the integer widths used here;
//! `Address`, `B256`, `U256` and `Bytes` already serialize that way natively.

use std::collections::BTreeMap;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Gas limit of a native-coin transfer on EVM chains.
pub const TRANSFER_GAS: u64 = 21_000;

// ============================================================================
// Wire quantity encoding
// ============================================================================

/// Serde adapters for JSON-RPC quantity fields (`0x`-prefixed, minimal hex).
pub mod quantity {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{v:x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub(crate) fn parse(raw: &str) -> Result<u64, String> {
        let digits = raw
            .strip_prefix("0x")
            .ok_or_else(|| format!("quantity {raw:?} missing 0x prefix"))?;
        u64::from_str_radix(digits, 16).map_err(|e| format!("bad quantity {raw:?}: {e}"))
    }

    /// `Option<u64>` quantities (`null` for absent fields).
    pub mod opt {
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            match v {
                Some(v) => s.serialize_str(&format!("0x{v:x}")),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            raw.map(|r| super::parse(&r).map_err(de::Error::custom))
                .transpose()
        }
    }

    /// `u128` quantities (gas prices).
    pub mod wide {
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&format!("0x{v:x}"))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
            let raw = String::deserialize(d)?;
            let digits = raw
                .strip_prefix("0x")
                .ok_or_else(|| de::Error::custom(format!("quantity {raw:?} missing 0x prefix")))?;
            u128::from_str_radix(digits, 16)
                .map_err(|e| de::Error::custom(format!("bad quantity {raw:?}: {e}")))
        }
    }
}

// ============================================================================
// RawTransaction
// ============================================================================

/// An unsigned transaction assembled by the builder.
///
/// `nonce` is `None` when the node is left to assign one; it is always
/// present when the nonce manager or an explicit override assigned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    #[serde(with = "quantity")]
    pub gas: u64,
    #[serde(with = "quantity::wide")]
    pub gas_price: u128,
    #[serde(with = "quantity")]
    pub chain_id: u64,
    #[serde(
        with = "quantity::opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub nonce: Option<u64>,
    pub data: Bytes,
}

// ============================================================================
// Per-call overrides
// ============================================================================

/// Caller-supplied overrides for a single send.
///
/// A present `nonce` bypasses the nonce manager entirely for that call:
/// nothing is acquired and nothing is released.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub nonce: Option<u64>,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub chain_id: Option<u64>,
    pub value: Option<U256>,
    pub wait_for_mine_timeout: Option<Duration>,
}

impl Overrides {
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

// ============================================================================
// Receipts
// ============================================================================

/// A mined transaction receipt as reported by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(with = "quantity::opt", default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    /// 1 on success, 0 on revert.
    #[serde(with = "quantity")]
    pub status: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

// ============================================================================
// Mempool views
// ============================================================================

/// Node-wide `txpool_inspect` reply: address → nonce → summary string.
///
/// Addresses are kept in the textual (checksummed) form the node keys by;
/// callers normalize before indexing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MempoolInspect {
    #[serde(default)]
    pub pending: BTreeMap<String, BTreeMap<u64, String>>,
    #[serde(default)]
    pub queued: BTreeMap<String, BTreeMap<u64, String>>,
}

/// Node-wide `txpool_content` reply: address → nonce → full transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MempoolContent {
    #[serde(default)]
    pub pending: BTreeMap<String, BTreeMap<u64, PooledTx>>,
    #[serde(default)]
    pub queued: BTreeMap<String, BTreeMap<u64, PooledTx>>,
}

/// A transaction body as it sits in the pool (content form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PooledTx {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "quantity")]
    pub nonce: u64,
    pub value: U256,
    #[serde(with = "quantity")]
    pub gas: u64,
    #[serde(with = "quantity::wide")]
    pub gas_price: u128,
    #[serde(default)]
    pub input: Bytes,
}

/// The mempool as seen from one account, after checksummed indexing.
///
/// `supported` is false when the node does not expose txpool methods; the
/// maps are then empty and callers degrade per their own rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MempoolView {
    pub pending: BTreeMap<u64, String>,
    pub queued: BTreeMap<u64, String>,
    pub supported: bool,
}

impl MempoolView {
    pub fn unsupported() -> Self {
        Self::default()
    }

    /// Union of pending and queued nonces.
    pub fn known_nonces(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.keys().chain(self.queued.keys()).copied()
    }
}

/// Content-form counterpart of [`MempoolView`]: full transaction bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentView {
    pub pending: BTreeMap<u64, PooledTx>,
    pub queued: BTreeMap<u64, PooledTx>,
    pub supported: bool,
}

impl ContentView {
    pub fn unsupported() -> Self {
        Self::default()
    }
}

// ============================================================================
// Transaction status
// ============================================================================

/// Resolved placement of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// In the dispatch-ready sublist of the pool.
    Pending,
    /// In the pool but gapped behind a missing nonce.
    Queued,
    /// Included in a block.
    Mined,
    /// Not visible anywhere we can look.
    Unknown,
    /// The node does not expose the pool; no answer is possible.
    Unsupported,
}
