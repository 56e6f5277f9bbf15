//! Table-driven protocol executor.
//!
//! Gas estimates come from a static per-function table; ABI encoding and
//! on-chain submission live in an external execution service, so `execute`
//! surfaces a transient error until one is wired in.

use std::collections::HashMap;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::port::executor::{ExecutionReceipt, ExecutionRequest, GasEstimate, ProtocolExecutor};

pub struct TableGasExecutor {
    /// Gas limits keyed by `(protocol, function)`.
    table: HashMap<(String, String), u64>,
    default_gas_limit: u64,
    gas_price_wei: u64,
}

impl TableGasExecutor {
    #[must_use]
    pub fn new(default_gas_limit: u64, gas_price_wei: u64) -> Self {
        let mut table = HashMap::new();
        for (protocol, function, gas) in [
            ("aave", "supply", 220_000),
            ("aave", "withdraw", 250_000),
            ("aave", "borrow", 300_000),
            ("uniswap-v3", "swap", 180_000),
            ("uniswap-v3", "approve", 55_000),
        ] {
            table.insert((protocol.to_string(), function.to_string()), gas);
        }
        Self {
            table,
            default_gas_limit,
            gas_price_wei,
        }
    }

    fn gas_limit_for(&self, protocol: &str, function_name: &str) -> u64 {
        self.table
            .get(&(protocol.to_string(), function_name.to_string()))
            .copied()
            .unwrap_or(self.default_gas_limit)
    }
}

/// `gas_limit * gas_price` in wei, as a decimal string.
#[must_use]
pub fn total_cost_wei(gas_limit: u64, gas_price_wei: u64) -> String {
    (U256::from(gas_limit) * U256::from(gas_price_wei)).to_string()
}

#[async_trait]
impl ProtocolExecutor for TableGasExecutor {
    async fn estimate_gas(
        &self,
        protocol: &str,
        function_name: &str,
        _parameters: &Value,
        _network: &str,
    ) -> Result<GasEstimate> {
        let gas_limit = self.gas_limit_for(protocol, function_name);
        Ok(GasEstimate {
            gas_limit,
            total_cost: total_cost_wei(gas_limit, self.gas_price_wei),
        })
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt> {
        Err(Error::Transient(format!(
            "no execution backend configured for protocol '{}'",
            request.protocol
        )))
    }
}
