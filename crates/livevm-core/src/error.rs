//! Error types shared across the LivEvm crates.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors raised by an upstream RPC connection.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Dialing the endpoint failed.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// WebSocket send/receive error on an established connection.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The connection has been closed locally.
    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Errors building the chain registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no chains configured")]
    Empty,

    #[error("chain id '{0}' configured more than once")]
    DuplicateChain(String),
}

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("window size must be at least 1")]
    ZeroWindow,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors raised by viewer-side commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewerError {
    #[error("'{address}' is not a valid address for '{name}'")]
    InvalidAddress { name: String, address: String },

    #[error("window size must be at least 1")]
    ZeroWindow,
}

/// A single field of an upstream block could not be decoded.
///
/// Never fatal: the fetcher substitutes a fallback and keeps going.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("invalid value '{0}'")]
    Value(String),
}
