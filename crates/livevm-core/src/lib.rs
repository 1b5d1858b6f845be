//! livevm-core: shared model for the live EVM block scanner.
//!
//! # Overview
//!
//! ```text
//! ChainRegistry ──► ChainSessionManager (livevm-session) ──► EventSink ──► Viewer
//!                         │                                              ├── SlidingWindow
//!                         └── RpcConnector / RpcConnection               └── ActivityTracker
//! ```
//!
//! This crate defines:
//!
//! - [`ChainRegistry`]: the immutable list of configured chains
//! - [`BlockEvent`] / [`ErrorEvent`]: what a chain session fans out
//! - [`RpcConnector`] / [`RpcConnection`]: the upstream RPC seam
//! - [`SlidingWindow`] and [`ActivityTracker`]: per-viewer derived state
//! - [`Viewer`]: one viewer's state across every chain it has looked at

pub mod activity;
pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod request;
pub mod rpc;
pub mod viewer;
pub mod window;

pub use activity::{Activity, ActivityTracker, WatchEntry};
pub use chain::{Chain, ChainRegistry};
pub use config::{LivevmConfig, LogConfig};
pub use error::{ConfigError, DecodeError, RegistryError, RpcError, ViewerError};
pub use event::{BlockEvent, Delivery, ErrorEvent, EventSink, SubscriberId, TxSummary, ViewerEvent};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use rpc::{
    parse_hex_u64, HeadSubscription, NewHead, RpcConnection, RpcConnector, SubscriptionFault,
    SubscriptionId,
};
pub use viewer::{ChainView, Health, LastBlock, Viewer, ViewerSnapshot};
pub use window::{SlidingWindow, WindowEntry, DEFAULT_WINDOW_SIZE};
