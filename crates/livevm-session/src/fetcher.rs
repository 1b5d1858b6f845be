//! Block fetcher.
//!
//! Fetches a full block with `eth_getBlockByNumber(n, true)` and reduces it to
//! a [`BlockEvent`]. Upstream failures never abort ingestion: the caller gets
//! an empty block for the same number plus a degraded [`ErrorEvent`].

use alloy_primitives::{U256, U512};
use serde_json::{json, Value};
use tracing::{debug, warn};

use livevm_core::error::{DecodeError, RpcError};
use livevm_core::event::{BlockEvent, ErrorEvent, TxSummary, ViewerEvent};
use livevm_core::rpc::{parse_hex_u64, RpcConnection};

pub const GET_BLOCK_METHOD: &str = "eth_getBlockByNumber";

/// Result of fetching one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlock {
    pub block: BlockEvent,
    /// Set when the block could not be fetched or parsed.
    pub error: Option<ErrorEvent>,
}

impl FetchedBlock {
    /// The events a subscriber receives for this block, block first.
    pub fn into_events(self) -> Vec<ViewerEvent> {
        let mut events = vec![ViewerEvent::Block(self.block)];
        events.extend(self.error.map(ViewerEvent::Error));
        events
    }
}

/// Fetch block `number` over `conn`.
pub async fn fetch_block(conn: &dyn RpcConnection, number: u64) -> FetchedBlock {
    let params = vec![json!(format!("0x{number:x}")), json!(true)];
    let result = conn.call(GET_BLOCK_METHOD, params).await;
    parse_block_response(number, result)
}

/// Reduce a raw `eth_getBlockByNumber` result to a [`FetchedBlock`].
pub fn parse_block_response(number: u64, result: Result<Value, RpcError>) -> FetchedBlock {
    let raw = match result {
        Ok(value) => value,
        Err(e) => {
            warn!(block = number, error = %e, "block fetch failed");
            Value::Null
        }
    };

    let timestamp = match decode_timestamp(raw.get("timestamp")) {
        Ok(ts) => ts,
        Err(e) => {
            debug!(block = number, error = %e, "using local clock for block timestamp");
            chrono::Utc::now().timestamp()
        }
    };

    match parse_transactions(&raw, number) {
        Some((transactions, total_value_wei)) => FetchedBlock {
            block: BlockEvent {
                block_number: number,
                timestamp,
                transactions,
                total_value_wei,
            },
            error: None,
        },
        None => FetchedBlock {
            block: BlockEvent::empty(number, timestamp),
            error: Some(ErrorEvent::degraded(format!("failed to fetch block {number}"))),
        },
    }
}

fn decode_timestamp(raw: Option<&Value>) -> Result<i64, DecodeError> {
    let text = match raw {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => return Err(DecodeError::Timestamp(other.to_string())),
        None => return Err(DecodeError::Timestamp("missing".into())),
    };
    parse_hex_u64(text)
        .and_then(|ts| i64::try_from(ts).ok())
        .ok_or_else(|| DecodeError::Timestamp(text.to_string()))
}

/// `None` means the block is unusable; an absent transaction list is empty.
fn parse_transactions(raw: &Value, number: u64) -> Option<(Vec<TxSummary>, U512)> {
    let block = raw.as_object()?;
    let txs = match block.get("transactions") {
        None | Some(Value::Null) => return Some((Vec::new(), U512::ZERO)),
        Some(Value::Array(txs)) => txs,
        Some(_) => return None,
    };

    let mut total = U512::ZERO;
    let mut out = Vec::with_capacity(txs.len());
    for tx in txs {
        let tx = tx.as_object()?;
        let text = |key: &str| {
            tx.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let value = match tx.get("value").and_then(Value::as_str) {
            None => U256::ZERO,
            Some(raw_value) => decode_value(raw_value).unwrap_or_else(|e| {
                warn!(block = number, error = %e, "treating transaction value as zero");
                U256::ZERO
            }),
        };
        total += U512::from_be_slice(&value.to_be_bytes::<32>());

        out.push(TxSummary {
            from: text("from"),
            to: text("to"),
            gas: text("gas"),
            hash: text("hash"),
            value_wei: value.to_string(),
            block_number: number,
        });
    }
    Some((out, total))
}

/// Parse a wei amount given as a `0x` hex quantity or a decimal string.
///
/// Values are capped at 256 bits, the width of an EVM word; anything wider
/// is a [`DecodeError::Value`].
pub fn decode_value(raw: &str) -> Result<U256, DecodeError> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some("") => return Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|_| DecodeError::Value(raw.to_string()))
}
