//! WebSocket JSON-RPC chain client.
//!
//! Speaks the Ethereum JSON-RPC protocol over a single WebSocket:
//! `eth_subscribe` for live logs from the subscription-manager contract,
//! `eth_getLogs` for backfill, `eth_getTransactionByHash` to resolve event
//! senders, and `eth_blockNumber` as the liveness probe. Subscription
//! notifications that arrive while a request is in flight are buffered and
//! drained by [`ChainClient::next_event`].

use std::collections::VecDeque;
use std::sync::LazyLock;

use alloy_primitives::{keccak256, B256, U256};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::domain::id::{Address, TxHash};
use crate::error::{Error, Result};
use crate::port::chain::{ChainClient, ChainEvent, TxDetails};

static SUBSCRIPTION_CREATED: LazyLock<B256> =
    LazyLock::new(|| keccak256("SubscriptionCreated(address,string)"));
static SUBSCRIPTION_CANCELLED: LazyLock<B256> =
    LazyLock::new(|| keccak256("SubscriptionCancelled(address)"));
static GENERATOR_REGISTERED: LazyLock<B256> =
    LazyLock::new(|| keccak256("GeneratorRegistered(address)"));

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsChainClient {
    url: String,
    contract_address: String,
    stream: Option<WsStream>,
    next_request_id: u64,
    subscription_id: Option<String>,
    /// Notifications read while waiting for a request response.
    buffered: VecDeque<ChainEvent>,
}

impl WsChainClient {
    #[must_use]
    pub fn new(url: String, contract_address: String) -> Self {
        Self {
            url,
            contract_address,
            stream: None,
            next_request_id: 1,
            subscription_id: None,
            buffered: VecDeque::new(),
        }
    }

    fn stream_mut(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Connection("not connected".to_string()))
    }

    /// Send one JSON-RPC request and wait for its response, buffering any
    /// subscription notifications read in the meantime.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.stream_mut()?
            .send(Message::Text(payload.to_string()))
            .await?;

        loop {
            let message = match self.stream_mut()?.next().await {
                Some(msg) => msg?,
                None => {
                    self.stream = None;
                    return Err(Error::Connection("stream closed mid-request".to_string()));
                }
            };
            let Message::Text(text) = message else {
                continue;
            };
            let value: Value = serde_json::from_str(&text)?;

            if value.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(err) = value.get("error") {
                    return Err(Error::Transient(format!("rpc error from {method}: {err}")));
                }
                return Ok(value.get("result").cloned().unwrap_or(Value::Null));
            }

            if let Some(event) = self.handle_notification(&value) {
                self.buffered.push_back(event);
            }
        }
    }

    fn handle_notification(&self, value: &Value) -> Option<ChainEvent> {
        if value.get("method").and_then(Value::as_str) != Some("eth_subscription") {
            return None;
        }
        let log = value.get("params")?.get("result")?;
        match decode_log(log) {
            Some(event) => Some(event),
            None => {
                debug!("Ignoring undecodable log notification");
                None
            }
        }
    }
}

#[async_trait]
impl ChainClient for WsChainClient {
    async fn connect(&mut self) -> Result<()> {
        info!(url = %self.url, "Connecting to chain RPC");
        let (ws_stream, response) = connect_async(&self.url).await?;
        info!(status = %response.status(), "Chain RPC connected");

        self.stream = Some(ws_stream);
        self.subscription_id = None;
        self.buffered.clear();
        Ok(())
    }

    async fn subscribe_events(&mut self) -> Result<()> {
        let params = json!([
            "logs",
            {
                "address": self.contract_address,
                "topics": [[
                    format!("{:#x}", *SUBSCRIPTION_CREATED),
                    format!("{:#x}", *SUBSCRIPTION_CANCELLED),
                    format!("{:#x}", *GENERATOR_REGISTERED),
                ]],
            }
        ]);
        let result = self.request("eth_subscribe", params).await?;
        let subscription_id = result
            .as_str()
            .ok_or_else(|| Error::Parse(format!("bad eth_subscribe result: {result}")))?;

        info!(subscription = %subscription_id, contract = %self.contract_address, "Subscribed to contract logs");
        self.subscription_id = Some(subscription_id.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChainEvent> {
        if let Some(event) = self.buffered.pop_front() {
            return Some(event);
        }

        loop {
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        warn!("Dropping unparseable frame");
                        continue;
                    };
                    if let Some(event) = self.handle_notification(&value) {
                        return Some(event);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    self.stream = None;
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by peer".to_string());
                    return Some(ChainEvent::Disconnected { reason });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.stream = None;
                    return Some(ChainEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
                None => {
                    self.stream = None;
                    return Some(ChainEvent::Disconnected {
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn transaction(&mut self, hash: &TxHash) -> Result<TxDetails> {
        let result = self
            .request("eth_getTransactionByHash", json!([hash.as_str()]))
            .await?;
        if result.is_null() {
            return Err(Error::not_found("transaction", hash.as_str()));
        }

        let from = result
            .get("from")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("transaction missing 'from'".to_string()))?;
        let value_hex = result
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("transaction missing 'value'".to_string()))?;

        Ok(TxDetails {
            hash: hash.clone(),
            from: Address::from(from),
            value_wei: hex_quantity_to_decimal(value_hex)?,
        })
    }

    async fn probe(&mut self) -> Result<()> {
        self.request("eth_blockNumber", json!([])).await.map(|_| ())
    }

    async fn historical_events(
        &mut self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>> {
        let params = json!([{
            "address": self.contract_address,
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": format!("{to_block:#x}"),
            "topics": [[
                format!("{:#x}", *SUBSCRIPTION_CREATED),
                format!("{:#x}", *SUBSCRIPTION_CANCELLED),
                format!("{:#x}", *GENERATOR_REGISTERED),
            ]],
        }]);
        let result = self.request("eth_getLogs", params).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| Error::Parse(format!("bad eth_getLogs result: {result}")))?;

        Ok(logs.iter().filter_map(decode_log).collect())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Decode a raw JSON-RPC log into a tracked event. Returns `None` for logs
/// of other event types or with a malformed shape.
pub fn decode_log(log: &Value) -> Option<ChainEvent> {
    let topics = log.get("topics")?.as_array()?;
    let signature = topics.first()?.as_str()?;
    let tx_hash = TxHash::new(log.get("transactionHash")?.as_str()?);
    let generator = topic_address(topics.get(1)?.as_str()?)?;

    if signature.eq_ignore_ascii_case(&format!("{:#x}", *SUBSCRIPTION_CREATED)) {
        let data = log.get("data")?.as_str()?;
        Some(ChainEvent::SubscriptionCreated {
            generator,
            encrypted_subscriber: decode_abi_string(data)?,
            tx_hash,
        })
    } else if signature.eq_ignore_ascii_case(&format!("{:#x}", *SUBSCRIPTION_CANCELLED)) {
        Some(ChainEvent::SubscriptionCancelled { generator, tx_hash })
    } else if signature.eq_ignore_ascii_case(&format!("{:#x}", *GENERATOR_REGISTERED)) {
        Some(ChainEvent::GeneratorRegistered { generator, tx_hash })
    } else {
        None
    }
}

/// Extract the address packed into a 32-byte topic.
fn topic_address(topic: &str) -> Option<Address> {
    let hex_part = topic.strip_prefix("0x")?;
    if hex_part.len() != 64 {
        return None;
    }
    Address::parse(format!("0x{}", &hex_part[24..])).ok()
}

/// Decode a single ABI-encoded `string` from log data.
fn decode_abi_string(data: &str) -> Option<String> {
    let bytes = hex::decode(data.strip_prefix("0x")?).ok()?;
    if bytes.len() < 64 {
        return None;
    }
    let offset = usize::try_from(U256::from_be_slice(&bytes[..32])).ok()?;
    let len_end = offset.checked_add(32)?;
    let length = usize::try_from(U256::from_be_slice(bytes.get(offset..len_end)?)).ok()?;
    let content = bytes.get(len_end..len_end.checked_add(length)?)?;
    String::from_utf8(content.to_vec()).ok()
}

/// Convert a `0x`-prefixed hex quantity into a decimal wei string.
fn hex_quantity_to_decimal(value: &str) -> Result<String> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    U256::from_str_radix(digits, 16)
        .map(|v| v.to_string())
        .map_err(|e| Error::Parse(format!("bad hex quantity '{value}': {e}")))
}
