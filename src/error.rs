//! Error taxonomy and node-error classification.
//!
//! Nodes disagree on numeric error codes, so classification works on the
//! textual message alone. Different RPC implementations word the same
//! condition differently; the pattern lists below cover the variants we
//! have to recognize. Classification is idempotent: an already-classified
//! error passes through unchanged.

use alloy::primitives::Address;
use thiserror::Error;

use crate::types::RawTransaction;

/// Result alias used across the crate.
pub type DispatchResult<T> = Result<T, DispatchError>;

// ============================================================================
// Error kinds
// ============================================================================

/// Every failure surfaced by the pipeline carries exactly one of these kinds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// The node rejected the transaction because of its nonce (too low,
    /// already known, or an underpriced replacement).
    #[error("invalid nonce: {message}")]
    InvalidNonce { message: String },

    /// The target address has no code.
    #[error("no contract code at {address}")]
    NotDeployed { address: Address },

    /// The contract artifact has no binding for the active network.
    #[error("contract {contract} has no binding for chain {chain_id}")]
    NoNetworkInContract { contract: String, chain_id: u64 },

    /// The signer recovered from a signed blob does not equal the declared
    /// sender.
    #[error("signer mismatch: expected {expected}, recovered {recovered}")]
    SignerMismatch { expected: Address, recovered: Address },

    /// One transaction in an ordered chain failed; `unsent` is the failing
    /// transaction plus everything after it, in submission order.
    #[error("transaction chain failed: {cause}")]
    FailedTxChain {
        cause: Box<DispatchError>,
        unsent: Vec<RawTransaction>,
    },

    /// Signing or receipt polling exceeded its budget.
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// A lookup resolved to an absence sentinel.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Everything else, carrying the original message.
    #[error("{message}")]
    Generic { message: String },
}

// ============================================================================
// Classification
// ============================================================================

/// Message patterns the nonce-rejection family is recognized by.
const INVALID_NONCE_PATTERNS: &[&str] = &[
    "nonce",
    "replacement transaction underpriced",
    "known transaction",
];

/// Message patterns of a node declining an optional RPC method.
const NOT_SUPPORTED_PATTERNS: &[&str] = &["not supported", "method not found", "does not exist"];

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    let lower = message.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

/// Check whether a node reply means the method itself is unavailable.
///
/// Unsupported txpool methods are an observable degraded mode, not an error.
pub fn is_not_supported(message: &str) -> bool {
    matches_any(message, NOT_SUPPORTED_PATTERNS)
}

impl DispatchError {
    /// Wrap and classify a raw node error.
    pub fn from_node<E: std::fmt::Display>(raw: E) -> Self {
        DispatchError::Generic {
            message: raw.to_string(),
        }
        .classify()
    }

    /// Classify `self`, promoting `Generic` messages that match a known
    /// pattern. Any other variant is already classified and passes through,
    /// so `e.classify().classify() == e.classify()` holds for every `e`.
    pub fn classify(self) -> Self {
        match self {
            DispatchError::Generic { message } if matches_any(&message, INVALID_NONCE_PATTERNS) => {
                DispatchError::InvalidNonce { message }
            }
            other => other,
        }
    }

    /// Whether a failed send should return its assigned nonce to the pool.
    ///
    /// A nonce rejection means the nonce itself is bad; handing it straight
    /// back would only repeat the failure. Every other kind (timeouts
    /// included) releases.
    pub fn releases_nonce(&self) -> bool {
        !matches!(self, DispatchError::InvalidNonce { .. })
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        DispatchError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        DispatchError::Generic {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        DispatchError::NotFound { what: what.into() }
    }
}
