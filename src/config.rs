//! Pipeline configuration.
//!
//! One `DispatchConfig` is shared by every component a [`crate::Dispatcher`]
//! wires together. Defaults follow the upstream contract: call gas limit
//! 300k, mining timeout 120s, signing timeout 60s, store lock budget 45s
//! with a 5s auto-release watchdog.

use std::time::Duration;

use crate::error::{DispatchError, DispatchResult};

/// Configuration for the transaction pipeline.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Default gas price for calls and transfers (wei).
    pub gas_price: u128,
    /// Default gas limit for contract calls.
    pub gas_limit: u64,
    /// Chain id stamped into built transactions.
    pub chain_id: u64,
    /// Budget for one receipt-polling wait.
    pub tx_mining_timeout: Duration,
    /// Budget for one external signing callback.
    pub tx_signing_timeout: Duration,
    /// How long a store `lock` waits for a contended key.
    pub lock_acquire_timeout: Duration,
    /// Poll interval while waiting on a contended key.
    pub lock_check_interval: Duration,
    /// Watchdog budget after which a held lock is force-released.
    pub lock_timeout: Duration,
    /// Resolve every registered contract once at construction so that a
    /// misconfigured catalog fails fast.
    pub preload_contracts: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            gas_price: 0,
            gas_limit: 300_000,
            chain_id: 0,
            tx_mining_timeout: Duration::from_secs(120),
            tx_signing_timeout: Duration::from_millis(60_000),
            lock_acquire_timeout: Duration::from_millis(45_000),
            lock_check_interval: Duration::from_millis(100),
            lock_timeout: Duration::from_millis(5_000),
            preload_contracts: true,
        }
    }
}

impl DispatchConfig {
    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_mining_timeout(mut self, timeout: Duration) -> Self {
        self.tx_mining_timeout = timeout;
        self
    }

    pub fn with_signing_timeout(mut self, timeout: Duration) -> Self {
        self.tx_signing_timeout = timeout;
        self
    }

    pub fn with_lock_timeouts(mut self, acquire: Duration, hold: Duration) -> Self {
        self.lock_acquire_timeout = acquire;
        self.lock_timeout = hold;
        self
    }

    pub fn with_lock_check_interval(mut self, interval: Duration) -> Self {
        self.lock_check_interval = interval;
        self
    }

    pub fn with_preload_contracts(mut self, preload: bool) -> Self {
        self.preload_contracts = preload;
        self
    }

    /// Reject configurations that would make a component spin or hang.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.tx_mining_timeout.is_zero()
            || self.tx_signing_timeout.is_zero()
            || self.lock_acquire_timeout.is_zero()
            || self.lock_check_interval.is_zero()
            || self.lock_timeout.is_zero()
        {
            return Err(DispatchError::generic("config timeouts must be non-zero"));
        }
        Ok(())
    }
}
