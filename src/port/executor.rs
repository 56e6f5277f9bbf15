//! Protocol executor port: gas estimation and trade submission.
//!
//! ABI encoding and gas math live behind this boundary; the core only sees
//! estimates and receipts.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::id::{Address, TxHash};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas_limit: u64,
    /// Estimated total cost in wei, as a decimal string.
    pub total_cost: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub protocol: String,
    pub function_name: String,
    pub parameters: Value,
    pub network: String,
    pub contract_address: Option<String>,
    pub consumer: Address,
}

#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub transaction_hash: TxHash,
    pub gas_used: u64,
    pub gas_price: Option<String>,
}

#[async_trait]
pub trait ProtocolExecutor: Send + Sync {
    /// Estimate gas for a protocol call. Callers bound this with a timeout
    /// and fall back to a configured estimate; it must never gate broadcast
    /// creation indefinitely.
    async fn estimate_gas(
        &self,
        protocol: &str,
        function_name: &str,
        parameters: &Value,
        network: &str,
    ) -> Result<GasEstimate>;

    /// Submit the trade on behalf of the consumer.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt>;
}
