//! Errors surfaced by the session manager.

use livevm_core::error::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown chain id '{0}'")]
    UnknownChain(String),

    /// Dialing the chain's endpoint failed. Not retried.
    #[error("error creating eth client: {0}")]
    Connection(#[source] RpcError),

    /// The connection opened but `newHeads` could not be subscribed.
    #[error("error creating subscription: {0}")]
    Subscription(#[source] RpcError),
}
