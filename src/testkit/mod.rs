//! Scripted test doubles and fixture builders.
//!
//! Compiled for unit tests and behind the `testkit` feature for the
//! integration suites.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::domain::id::{Address, TxHash};
use crate::error::{Error, Result};
use crate::port::chain::{ChainClient, ChainEvent, TxDetails};
use crate::port::cipher::AddressCipher;
use crate::port::executor::{
    ExecutionReceipt, ExecutionRequest, GasEstimate, ProtocolExecutor,
};

/// Deterministic test address: `n` repeated over the 40 hex digits.
#[must_use]
pub fn addr(n: u8) -> Address {
    Address::from(format!("0x{}", format!("{n:02x}").repeat(20)))
}

#[must_use]
pub fn tx(n: u8) -> TxHash {
    TxHash::new(format!("0x{}", format!("{n:02x}").repeat(32)))
}

#[derive(Default)]
struct ChainScript {
    events: VecDeque<ChainEvent>,
    historical: Vec<ChainEvent>,
    transactions: HashMap<TxHash, TxDetails>,
    failing_connects: u32,
    probe_ok: bool,
    connects: u32,
    subscribes: u32,
    probes: u32,
}

/// Shared view into a [`ScriptedChainClient`] after the listener has taken
/// ownership of it.
#[derive(Clone)]
pub struct ChainScriptHandle {
    state: Arc<Mutex<ChainScript>>,
}

impl ChainScriptHandle {
    #[must_use]
    pub fn connects(&self) -> u32 {
        self.state.lock().connects
    }

    #[must_use]
    pub fn subscribes(&self) -> u32 {
        self.state.lock().subscribes
    }

    #[must_use]
    pub fn probes(&self) -> u32 {
        self.state.lock().probes
    }

    pub fn push_event(&self, event: ChainEvent) {
        self.state.lock().events.push_back(event);
    }

    /// Make the next `n` connect attempts fail, counting from now.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().failing_connects = n;
    }
}

/// Chain client driven entirely by a pre-loaded script.
pub struct ScriptedChainClient {
    state: Arc<Mutex<ChainScript>>,
}

impl Default for ScriptedChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChainClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainScript {
                probe_ok: true,
                ..ChainScript::default()
            })),
        }
    }

    #[must_use]
    pub fn with_event(self, event: ChainEvent) -> Self {
        self.state.lock().events.push_back(event);
        self
    }

    #[must_use]
    pub fn with_historical(self, events: Vec<ChainEvent>) -> Self {
        self.state.lock().historical = events;
        self
    }

    #[must_use]
    pub fn with_transaction(self, details: TxDetails) -> Self {
        self.state
            .lock()
            .transactions
            .insert(details.hash.clone(), details.clone());
        self
    }

    /// Make the next `n` connect attempts fail.
    #[must_use]
    pub fn failing_connects(self, n: u32) -> Self {
        self.state.lock().failing_connects = n;
        self
    }

    #[must_use]
    pub fn handle(&self) -> ChainScriptHandle {
        ChainScriptHandle {
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl ChainClient for ScriptedChainClient {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::Connection("scripted connect failure".to_string()));
        }
        Ok(())
    }

    async fn subscribe_events(&mut self) -> Result<()> {
        self.state.lock().subscribes += 1;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChainEvent> {
        self.state.lock().events.pop_front()
    }

    async fn transaction(&mut self, hash: &TxHash) -> Result<TxDetails> {
        self.state
            .lock()
            .transactions
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::not_found("transaction", hash.as_str()))
    }

    async fn probe(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.probes += 1;
        if state.probe_ok {
            Ok(())
        } else {
            Err(Error::Connection("scripted probe failure".to_string()))
        }
    }

    async fn historical_events(
        &mut self,
        _from_block: u64,
        _to_block: u64,
    ) -> Result<Vec<ChainEvent>> {
        Ok(self.state.lock().historical.clone())
    }

    fn endpoint(&self) -> &str {
        "scripted://chain"
    }
}

struct ExecutorScript {
    estimate: Result<GasEstimate>,
    estimate_delay: Option<Duration>,
    execution: Result<ExecutionReceipt>,
    executions: Vec<ExecutionRequest>,
}

/// Protocol executor with scripted estimate and execution outcomes.
pub struct ScriptedExecutor {
    state: Mutex<ExecutorScript>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExecutorScript {
                estimate: Ok(GasEstimate {
                    gas_limit: 210_000,
                    total_cost: "6300000000000000".to_string(),
                }),
                estimate_delay: None,
                execution: Ok(ExecutionReceipt {
                    transaction_hash: tx(0xee),
                    gas_used: 190_000,
                    gas_price: Some("30000000000".to_string()),
                }),
                executions: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_estimate(self, estimate: Result<GasEstimate>) -> Self {
        self.state.lock().estimate = estimate;
        self
    }

    /// Delay every estimate, for exercising the caller's timeout fallback.
    #[must_use]
    pub fn with_estimate_delay(self, delay: Duration) -> Self {
        self.state.lock().estimate_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_execution(self, execution: Result<ExecutionReceipt>) -> Self {
        self.state.lock().execution = execution;
        self
    }

    #[must_use]
    pub fn executions(&self) -> Vec<ExecutionRequest> {
        self.state.lock().executions.clone()
    }
}

fn clone_result<T: Clone>(result: &Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(e) => Err(Error::Transient(e.to_string())),
    }
}

#[async_trait]
impl ProtocolExecutor for ScriptedExecutor {
    async fn estimate_gas(
        &self,
        _protocol: &str,
        _function_name: &str,
        _parameters: &Value,
        _network: &str,
    ) -> Result<GasEstimate> {
        let delay = self.state.lock().estimate_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        clone_result(&self.state.lock().estimate)
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt> {
        let mut state = self.state.lock();
        state.executions.push(request.clone());
        clone_result(&state.execution)
    }
}

/// Reversible stand-in for the AES cipher.
pub struct StubCipher;

impl AddressCipher for StubCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(format!("enc:{plaintext}"))
    }

    fn decrypt(&self, opaque: &str) -> Result<String> {
        opaque
            .strip_prefix("enc:")
            .map(ToString::to_string)
            .ok_or_else(|| Error::Parse("not a stub ciphertext".to_string()))
    }
}
