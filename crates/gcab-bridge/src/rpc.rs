//! # JSON-RPC Chain Client
//!
//! Minimal Ethereum JSON-RPC over HTTP: `eth_blockNumber`, `eth_getLogs`,
//! `eth_getCode` and an `eth_call` for ERC-20 `decimals()`.

use crate::error::ChainError;
use crate::source::ChainSource;
use async_trait::async_trait;
use gcab_core::units::parse_amount;
use gcab_core::{Address, TransferEvent};
use num_traits::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Selector of `decimals()`
pub const DECIMALS_SELECTOR: &str = "0x313ce567";

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

fn decode_response<T: DeserializeOwned>(body: Value) -> Result<T, ChainError> {
    let response: RpcResponse<T> =
        serde_json::from_value(body).map_err(|e| ChainError::Decode(e.to_string()))?;
    if let Some(err) = response.error {
        return Err(ChainError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    response
        .result
        .ok_or_else(|| ChainError::Decode("response carries neither result nor error".into()))
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(s: &str) -> Result<u64, ChainError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity without 0x prefix: {}", s)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|_| ChainError::Decode(format!("bad quantity: {}", s)))
}

fn to_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}

/// `None` for logs that are not a standard ERC-20 `Transfer`
fn decode_transfer(log: &RpcLog) -> Result<Option<TransferEvent>, ChainError> {
    if log.removed || log.topics.len() != 3 {
        return Ok(None);
    }
    if !log.topics[0].eq_ignore_ascii_case(TRANSFER_TOPIC) {
        return Ok(None);
    }
    let block_number = match &log.block_number {
        Some(n) => parse_quantity(n)?,
        None => return Ok(None),
    };
    Ok(Some(TransferEvent {
        block_number,
        from: Address::from_topic(&log.topics[1])?,
        to: Address::from_topic(&log.topics[2])?,
        value: parse_amount(&log.data)?,
    }))
}

/// Decode a batch of logs. A Transfer log that fails to decode is skipped
/// so one bad entry cannot pin the scan cursor.
fn decode_transfers(logs: &[RpcLog]) -> Vec<TransferEvent> {
    let mut events = Vec::with_capacity(logs.len());
    for log in logs {
        match decode_transfer(log) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "Skipping undecodable transfer log at block {} index {}: {}",
                log.block_number.as_deref().unwrap_or("?"),
                log.log_index.as_deref().unwrap_or("?"),
                e
            ),
        }
    }
    events
}

fn decode_decimals(word: &str) -> Result<u8, ChainError> {
    parse_amount(word)?
        .to_u8()
        .ok_or_else(|| ChainError::Decode(format!("decimals out of range: {}", word)))
}

/// HTTP JSON-RPC client
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let body: Value = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_response(body)
    }
}

#[async_trait]
impl ChainSource for JsonRpcClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let quantity: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }

    async fn transfer_logs(
        &self,
        token: &Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, ChainError> {
        let filter = json!([{
            "address": token.to_hex(),
            "topics": [TRANSFER_TOPIC],
            "fromBlock": to_quantity(from_block),
            "toBlock": to_quantity(to_block),
        }]);
        let logs: Vec<RpcLog> = self.call("eth_getLogs", filter).await?;
        let total = logs.len();

        let events = decode_transfers(&logs);
        if events.len() != total {
            tracing::debug!(
                "Skipped {} logs in blocks {}..={}",
                total - events.len(),
                from_block,
                to_block
            );
        }
        Ok(events)
    }

    async fn has_code(&self, address: &Address) -> Result<bool, ChainError> {
        let code: String = self
            .call("eth_getCode", json!([address.to_hex(), "latest"]))
            .await?;
        Ok(!code.is_empty() && code != "0x")
    }

    async fn decimals(&self, token: &Address) -> Result<u8, ChainError> {
        let call = json!([{ "to": token.to_hex(), "data": DECIMALS_SELECTOR }, "latest"]);
        let word: String = self.call("eth_call", call).await?;
        decode_decimals(&word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcab_core::prelude::BigUint;
    use sha3::{Digest, Keccak256};

    #[test]
    fn test_transfer_topic_is_event_hash() {
        let hash = Keccak256::digest(b"Transfer(address,address,uint256)");
        let expected: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(TRANSFER_TOPIC, format!("0x{}", expected));
    }

    #[test]
    fn test_decimals_selector() {
        let hash = Keccak256::digest(b"decimals()");
        let expected: String = hash[..4].iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(DECIMALS_SELECTOR, format!("0x{}", expected));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x2510cad").unwrap(), 38_866_093);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("1234").is_err());
        assert!(parse_quantity("0xzz").is_err());
        assert_eq!(to_quantity(38_866_093), "0x2510cad");
    }

    #[test]
    fn test_decode_transfer_log() {
        let log: RpcLog = serde_json::from_value(json!({
            "address": "0x6d0b8eb75e9d6735cc301c3a6e82adee43590b07",
            "topics": [
                TRANSFER_TOPIC,
                "0x0000000000000000000000000000000000000000000000000000000000000000",
                "0x000000000000000000000000000000000000000000000000000000000000dead"
            ],
            "data": "0x0000000000000000000000000000000000000000000000000de0b6b3a7640000",
            "blockNumber": "0x10",
            "logIndex": "0x0"
        }))
        .unwrap();

        let event = decode_transfer(&log).unwrap().unwrap();
        assert_eq!(event.block_number, 16);
        assert!(event.from.is_zero());
        assert_eq!(event.to, Address::DEAD);
        assert_eq!(event.value, BigUint::from(1_000_000_000_000_000_000u64));
    }

    #[test]
    fn test_decode_skips_non_erc20() {
        // ERC-721 transfers index the token id as a fourth topic
        let log: RpcLog = serde_json::from_value(json!({
            "topics": [
                TRANSFER_TOPIC,
                "0x0000000000000000000000000000000000000000000000000000000000000001",
                "0x0000000000000000000000000000000000000000000000000000000000000002",
                "0x0000000000000000000000000000000000000000000000000000000000000003"
            ],
            "data": "0x",
            "blockNumber": "0x1"
        }))
        .unwrap();
        assert!(decode_transfer(&log).unwrap().is_none());

        let removed: RpcLog = serde_json::from_value(json!({
            "topics": [
                TRANSFER_TOPIC,
                "0x0000000000000000000000000000000000000000000000000000000000000001",
                "0x0000000000000000000000000000000000000000000000000000000000000002"
            ],
            "data": "0x01",
            "blockNumber": "0x1",
            "removed": true
        }))
        .unwrap();
        assert!(decode_transfer(&removed).unwrap().is_none());
    }

    #[test]
    fn test_malformed_transfer_skipped_rest_of_batch_kept() {
        let logs: Vec<RpcLog> = serde_json::from_value(json!([
            {
                "topics": [
                    TRANSFER_TOPIC,
                    "0x12",
                    "0x0000000000000000000000000000000000000000000000000000000000000002"
                ],
                "data": "0x01",
                "blockNumber": "0x5",
                "logIndex": "0x0"
            },
            {
                "topics": [
                    TRANSFER_TOPIC,
                    "0x0000000000000000000000000000000000000000000000000000000000000001",
                    "0x0000000000000000000000000000000000000000000000000000000000000002"
                ],
                "data": "0xnot-hex",
                "blockNumber": "0x5",
                "logIndex": "0x1"
            },
            {
                "topics": [
                    TRANSFER_TOPIC,
                    "0x0000000000000000000000000000000000000000000000000000000000000001",
                    "0x0000000000000000000000000000000000000000000000000000000000000002"
                ],
                "data": "0x0a",
                "blockNumber": "0x6",
                "logIndex": "0x0"
            }
        ]))
        .unwrap();

        assert!(decode_transfer(&logs[0]).is_err());
        let events = decode_transfers(&logs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, 6);
        assert_eq!(events[0].value, BigUint::from(10u32));
    }

    #[test]
    fn test_decode_response_error() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "query returned more than 10000 results" }
        });
        let err = decode_response::<Vec<Value>>(body).unwrap_err();
        assert!(matches!(err, ChainError::Rpc { code: -32005, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_decode_decimals_word() {
        let word = "0x0000000000000000000000000000000000000000000000000000000000000012";
        assert_eq!(decode_decimals(word).unwrap(), 18);
        let huge = "0x0000000000000000000000000000000000000000000000000000000000000100";
        assert!(decode_decimals(huge).is_err());
    }
}
