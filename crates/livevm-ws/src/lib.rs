//! livevm-ws: WebSocket JSON-RPC connection for LivEvm chain sessions.
//!
//! # Features
//! - Eager dial: a bad endpoint fails the join immediately
//! - Request multiplexing over a single connection
//! - `newHeads` subscriptions with a separate fault stream
//! - No reconnect: a broken socket faults every live subscription

pub mod client;
pub mod subscriptions;

pub use client::{WsConfig, WsConnection, WsConnector};
pub use subscriptions::SubscriptionRegistry;
