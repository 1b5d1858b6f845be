//! Per-chain session manager.
//!
//! Each configured chain has one [`ChainSession`] guarded by its own mutex.
//! Every structural change (subscriber added or removed, connection opened or
//! torn down, broadcast) happens under that lock, so joins and leaves on the
//! same chain are linearizable while different chains never contend.
//!
//! # Lifecycle
//! ```text
//! Idle ──join──► Connecting ──ok──► Active ──last leave──► Idle
//!                     │                 │
//!                     └──dial/sub err──►│◄──stream fault (subscribers notified)
//!                                       ▼
//!                                      Idle
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use livevm_core::chain::{Chain, ChainRegistry};
use livevm_core::event::{Delivery, ErrorEvent, EventSink, SubscriberId, ViewerEvent};
use livevm_core::rpc::{
    HeadSubscription, RpcConnection, RpcConnector, SubscriptionFault, SubscriptionId,
};

use crate::error::SessionError;
use crate::fetcher::fetch_block;

pub const STREAM_ERROR_MESSAGE: &str = "stream error, rejoin required";
pub const STREAM_CLOSED_MESSAGE: &str = "stream closed, rejoin required";

/// Observable state of one chain's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Handles owned while a session is active.
struct Live {
    connection: Arc<dyn RpcConnection>,
    subscription: SubscriptionId,
    stop: oneshot::Sender<()>,
}

struct SessionInner {
    state: SessionState,
    subscribers: HashMap<SubscriberId, EventSink>,
    live: Option<Live>,
    /// Bumped on every successful connect; a loop whose generation no longer
    /// matches must not deliver.
    generation: u64,
}

struct ChainSession {
    chain: Chain,
    inner: Mutex<SessionInner>,
}

impl ChainSession {
    fn new(chain: Chain) -> Self {
        Self {
            chain,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                subscribers: HashMap::new(),
                live: None,
                generation: 0,
            }),
        }
    }
}

/// Owns one session per configured chain.
pub struct ChainSessionManager {
    registry: Arc<ChainRegistry>,
    connector: Arc<dyn RpcConnector>,
    sessions: HashMap<String, Arc<ChainSession>>,
}

impl ChainSessionManager {
    pub fn new(registry: ChainRegistry, connector: Arc<dyn RpcConnector>) -> Self {
        let sessions = registry
            .iter()
            .map(|chain| (chain.id.clone(), Arc::new(ChainSession::new(chain.clone()))))
            .collect();
        Self {
            registry: Arc::new(registry),
            connector,
            sessions,
        }
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    fn session(&self, chain_id: &str) -> Result<&Arc<ChainSession>, SessionError> {
        self.sessions
            .get(chain_id)
            .ok_or_else(|| SessionError::UnknownChain(chain_id.to_string()))
    }

    /// Add `subscriber` to `chain_id`, opening the upstream subscription if
    /// this is the first subscriber.
    ///
    /// The first joiner receives a bootstrap block for the current head. On a
    /// dial or subscribe failure the joiner alone receives a fatal
    /// [`ErrorEvent`], is removed again, and the session stays idle. Joining
    /// again with an id already present replaces its sink.
    pub async fn join(
        &self,
        chain_id: &str,
        subscriber: SubscriberId,
        sink: EventSink,
    ) -> Result<(), SessionError> {
        let session = self.session(chain_id)?;
        let chain = &session.chain;
        let mut inner = session.inner.lock().await;

        if inner.live.is_some() {
            if inner.subscribers.insert(subscriber, sink).is_some() {
                debug!(chain = %chain.id, %subscriber, "replaced subscriber sink");
            } else {
                info!(
                    chain = %chain.id,
                    %subscriber,
                    subscribers = inner.subscribers.len(),
                    "adding subscriber"
                );
            }
            return Ok(());
        }

        inner.subscribers.insert(subscriber, sink.clone());
        inner.state = SessionState::Connecting;
        info!(
            chain = %chain.id,
            endpoint = %chain.endpoint,
            %subscriber,
            "opening upstream connection"
        );

        match self.connect(chain, &sink).await {
            Ok((connection, subscription)) => {
                inner.generation += 1;
                let (stop_tx, stop_rx) = oneshot::channel();
                inner.live = Some(Live {
                    connection: Arc::clone(&connection),
                    subscription: subscription.id.clone(),
                    stop: stop_tx,
                });
                inner.state = SessionState::Active;
                info!(
                    chain = %chain.id,
                    endpoint = connection.endpoint(),
                    subscription = %subscription.id,
                    "head subscription active"
                );

                tokio::spawn(ingest(
                    Arc::clone(session),
                    connection,
                    subscription,
                    stop_rx,
                    inner.generation,
                ));
                Ok(())
            }
            Err(e) => {
                warn!(chain = %chain.id, %subscriber, error = %e, "join failed");
                inner.subscribers.remove(&subscriber);
                inner.state = SessionState::Idle;
                sink.deliver(ViewerEvent::Error(ErrorEvent::fatal(e.to_string())));
                Err(e)
            }
        }
    }

    /// Dial, bootstrap the joiner with the current head block, then subscribe.
    async fn connect(
        &self,
        chain: &Chain,
        sink: &EventSink,
    ) -> Result<(Arc<dyn RpcConnection>, HeadSubscription), SessionError> {
        let connection = self
            .connector
            .dial(&chain.endpoint)
            .await
            .map_err(SessionError::Connection)?;

        match connection.head_number().await {
            Ok(head) => {
                for event in fetch_block(connection.as_ref(), head).await.into_events() {
                    sink.deliver(event);
                }
            }
            Err(e) => {
                warn!(
                    chain = %chain.id,
                    error = %e,
                    "head number unavailable, skipping bootstrap block"
                );
                sink.deliver(ViewerEvent::Error(ErrorEvent::degraded(format!(
                    "failed to fetch head block: {e}"
                ))));
            }
        }

        let subscription = connection
            .subscribe_new_heads()
            .await
            .map_err(SessionError::Subscription)?;
        Ok((connection, subscription))
    }

    /// Remove `subscriber` from `chain_id`. Closes the upstream subscription
    /// when the last subscriber leaves.
    ///
    /// Returns whether the subscriber was present.
    pub async fn leave(
        &self,
        chain_id: &str,
        subscriber: SubscriberId,
    ) -> Result<bool, SessionError> {
        let session = self.session(chain_id)?;
        let mut inner = session.inner.lock().await;

        let removed = inner.subscribers.remove(&subscriber).is_some();
        if removed {
            info!(
                chain = %session.chain.id,
                %subscriber,
                subscribers = inner.subscribers.len(),
                "removing subscriber"
            );
        }
        if inner.subscribers.is_empty() {
            if let Some(live) = inner.live.take() {
                inner.state = SessionState::Idle;
                release(&session.chain, live).await;
            }
        }
        Ok(removed)
    }

    pub async fn state(&self, chain_id: &str) -> Result<SessionState, SessionError> {
        Ok(self.session(chain_id)?.inner.lock().await.state)
    }

    pub async fn subscriber_count(&self, chain_id: &str) -> Result<usize, SessionError> {
        Ok(self.session(chain_id)?.inner.lock().await.subscribers.len())
    }

    /// Drop every subscriber and close every upstream subscription.
    pub async fn shutdown(&self) {
        for session in self.sessions.values() {
            let mut inner = session.inner.lock().await;
            inner.subscribers.clear();
            inner.state = SessionState::Idle;
            if let Some(live) = inner.live.take() {
                release(&session.chain, live).await;
            }
        }
        info!("all chain sessions closed");
    }
}

/// Stop the ingestion loop and cancel the upstream subscription.
async fn release(chain: &Chain, live: Live) {
    let _ = live.stop.send(());
    if let Err(e) = live.connection.unsubscribe(&live.subscription).await {
        debug!(chain = %chain.id, error = %e, "unsubscribe failed");
    }
    info!(chain = %chain.id, "closing upstream connection");
}

/// Deliver `events` to every subscriber in order. Returns the subscribers
/// whose receiving side is gone.
fn broadcast(
    chain: &Chain,
    subscribers: &HashMap<SubscriberId, EventSink>,
    events: &[ViewerEvent],
) -> Vec<SubscriberId> {
    let mut gone = Vec::new();
    for (id, sink) in subscribers {
        for event in events {
            match sink.deliver(event.clone()) {
                Delivery::Delivered => {}
                Delivery::Full => {
                    warn!(
                        chain = %chain.id,
                        subscriber = %id,
                        "subscriber not keeping up, event dropped"
                    );
                }
                Delivery::Closed => {
                    debug!(chain = %chain.id, subscriber = %id, "subscriber gone");
                    gone.push(*id);
                    break;
                }
            }
        }
    }
    gone
}

/// Ingestion loop: one per active session.
async fn ingest(
    session: Arc<ChainSession>,
    connection: Arc<dyn RpcConnection>,
    mut subscription: HeadSubscription,
    mut stop: oneshot::Receiver<()>,
    generation: u64,
) {
    let chain = &session.chain;
    loop {
        tokio::select! {
            biased;

            _ = &mut stop => {
                debug!(chain = %chain.id, "ingestion loop stopped");
                return;
            }

            fault = subscription.errors.recv() => {
                on_fault(&session, generation, fault.unwrap_or(SubscriptionFault::Closed)).await;
                return;
            }

            head = subscription.headers.recv() => {
                let Some(head) = head else {
                    on_fault(&session, generation, SubscriptionFault::Closed).await;
                    return;
                };
                debug!(chain = %chain.id, block = head.number, "new head");
                let events = fetch_block(connection.as_ref(), head.number).await.into_events();

                let mut inner = session.inner.lock().await;
                if inner.generation != generation || inner.live.is_none() {
                    debug!(
                        chain = %chain.id,
                        block = head.number,
                        "discarding block after teardown"
                    );
                    return;
                }

                let gone = broadcast(chain, &inner.subscribers, &events);
                for id in &gone {
                    inner.subscribers.remove(id);
                }
                if inner.subscribers.is_empty() {
                    if let Some(live) = inner.live.take() {
                        inner.state = SessionState::Idle;
                        release(chain, live).await;
                    }
                    return;
                }
            }
        }
    }
}

/// Tear down after the upstream stream ended on its own, notifying and
/// dropping every remaining subscriber.
async fn on_fault(session: &ChainSession, generation: u64, fault: SubscriptionFault) {
    let chain = &session.chain;
    let mut inner = session.inner.lock().await;
    if inner.generation != generation || inner.live.is_none() {
        return;
    }
    inner.live = None;
    inner.state = SessionState::Idle;

    if inner.subscribers.is_empty() {
        info!(chain = %chain.id, "head subscription closed");
        return;
    }

    let message = match &fault {
        SubscriptionFault::Closed => STREAM_CLOSED_MESSAGE,
        SubscriptionFault::Fault(_) => STREAM_ERROR_MESSAGE,
    };
    warn!(
        chain = %chain.id,
        %fault,
        subscribers = inner.subscribers.len(),
        "head stream failed, dropping subscribers"
    );
    broadcast(chain, &inner.subscribers, &[ViewerEvent::Error(ErrorEvent::fatal(message))]);
    inner.subscribers.clear();
}
