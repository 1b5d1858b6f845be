//! Events fanned out from a chain session to its subscribers.

use std::fmt;

use alloy_primitives::U512;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

// ─── Block data ───────────────────────────────────────────────────────────────

/// One transaction of a block, reduced to what viewers display and match on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub from: String,
    /// Empty for contract creations.
    pub to: String,
    /// Gas limit, hex as received.
    pub gas: String,
    pub hash: String,
    /// Canonical decimal rendering of the transferred value in wei.
    pub value_wei: String,
    pub block_number: u64,
}

/// Structured summary of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub block_number: u64,
    /// Unix seconds.
    pub timestamp: i64,
    /// Transactions in upstream order.
    pub transactions: Vec<TxSummary>,
    /// Sum of all transaction values.
    pub total_value_wei: U512,
}

impl BlockEvent {
    /// A block with no transactions, used when the upstream fetch failed.
    pub fn empty(block_number: u64, timestamp: i64) -> Self {
        Self {
            block_number,
            timestamp,
            transactions: Vec::new(),
            total_value_wei: U512::ZERO,
        }
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

/// A failure report delivered in-band with block events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    /// `true` when the viewer must rejoin to receive further blocks.
    pub fatal: bool,
}

impl ErrorEvent {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.fatal { "fatal" } else { "error" };
        write!(f, "{kind}: {}", self.message)
    }
}

/// Everything a subscriber can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Block(BlockEvent),
    Error(ErrorEvent),
}

// ─── Subscribers ──────────────────────────────────────────────────────────────

/// Opaque identifier of one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SubscriberId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single non-blocking delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The subscriber is not keeping up; the event was dropped.
    Full,
    /// The receiving side is gone.
    Closed,
}

/// Non-blocking delivery endpoint for one subscriber.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ViewerEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the viewer reads from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ViewerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Deliver without waiting; never stalls the caller.
    pub fn deliver(&self, event: ViewerEvent) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
