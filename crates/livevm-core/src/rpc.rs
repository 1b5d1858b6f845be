//! The upstream RPC seam.
//!
//! A chain session needs only a handful of capabilities from a node:
//! dial, read the head number, make a call, and subscribe to new heads.
//! `livevm-ws` provides the WebSocket implementation; tests use in-memory mocks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RpcError;

/// A subscription ID returned by `eth_subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `newHeads` notification, reduced to what the session needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHead {
    pub number: u64,
    pub hash: Option<String>,
}

/// Terminal signals on a head subscription's error stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFault {
    /// The subscription was closed deliberately.
    Closed,
    /// The stream broke while live.
    Fault(String),
}

impl fmt::Display for SubscriptionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "subscription closed"),
            Self::Fault(reason) => write!(f, "subscription fault: {reason}"),
        }
    }
}

/// The two streams of an active `newHeads` subscription.
#[derive(Debug)]
pub struct HeadSubscription {
    pub id: SubscriptionId,
    pub headers: mpsc::UnboundedReceiver<NewHead>,
    pub errors: mpsc::UnboundedReceiver<SubscriptionFault>,
}

/// An open connection to one chain's node.
///
/// # Thread Safety
/// Shared as `Arc<dyn RpcConnection>` between the session and its ingestion loop.
#[async_trait]
pub trait RpcConnection: Send + Sync + 'static {
    /// Current head block number (`eth_blockNumber`).
    async fn head_number(&self) -> Result<u64, RpcError>;

    /// Call a method and return the raw `result` value (may be `null`).
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;

    /// Open a `newHeads` subscription.
    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, RpcError>;

    /// Cancel a subscription previously returned by `subscribe_new_heads`.
    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), RpcError>;

    /// The endpoint this connection was dialed to.
    fn endpoint(&self) -> &str;
}

/// Opens connections.
#[async_trait]
pub trait RpcConnector: Send + Sync + 'static {
    async fn dial(&self, endpoint: &str) -> Result<Arc<dyn RpcConnection>, RpcError>;
}

/// Parse a hex quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("1234"), Some(0x1234));
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn fault_display() {
        assert_eq!(SubscriptionFault::Closed.to_string(), "subscription closed");
        assert_eq!(
            SubscriptionFault::Fault("reset".into()).to_string(),
            "subscription fault: reset"
        );
    }
}
