//! WebSocket JSON-RPC connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use livevm_core::error::RpcError;
use livevm_core::request::{JsonRpcRequest, JsonRpcResponse};
use livevm_core::rpc::{
    parse_hex_u64, HeadSubscription, NewHead, RpcConnection, RpcConnector, SubscriptionFault,
    SubscriptionId,
};

use crate::subscriptions::SubscriptionRegistry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// How long a single call may wait for its response.
    pub request_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Dials WebSocket endpoints.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: WsConfig,
}

impl WsConnector {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RpcConnector for WsConnector {
    async fn dial(&self, endpoint: &str) -> Result<Arc<dyn RpcConnection>, RpcError> {
        let conn = WsConnection::connect(endpoint, self.config.clone()).await?;
        Ok(Arc::new(conn))
    }
}

/// Command sent from callers to the background connection task.
enum WsCommand {
    Call {
        req: JsonRpcRequest,
        tx: oneshot::Sender<Result<JsonRpcResponse, RpcError>>,
    },
    Subscribe {
        req: JsonRpcRequest,
        heads: mpsc::UnboundedSender<NewHead>,
        faults: mpsc::UnboundedSender<SubscriptionFault>,
        tx: oneshot::Sender<Result<SubscriptionId, RpcError>>,
    },
    Forget(SubscriptionId),
    /// The caller gave up waiting for request `id`.
    Cancel(u64),
    Close,
}

/// A request waiting for its response, keyed by request id.
enum Pending {
    Call(oneshot::Sender<Result<JsonRpcResponse, RpcError>>),
    Subscribe {
        heads: mpsc::UnboundedSender<NewHead>,
        faults: mpsc::UnboundedSender<SubscriptionFault>,
        tx: oneshot::Sender<Result<SubscriptionId, RpcError>>,
    },
}

impl Pending {
    fn fail(self, err: RpcError) {
        match self {
            Self::Call(tx) => {
                let _ = tx.send(Err(err));
            }
            Self::Subscribe { tx, .. } => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

/// One WebSocket connection to a node.
///
/// A background task owns the socket; this handle talks to it over a
/// command channel. Dropping the handle closes the socket.
pub struct WsConnection {
    endpoint: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl WsConnection {
    /// Complete the WebSocket handshake and start the connection task.
    pub async fn connect(endpoint: impl Into<String>, config: WsConfig) -> Result<Self, RpcError> {
        let endpoint = endpoint.into();
        tracing::info!(url = %endpoint, "connecting via WebSocket");

        let (ws_stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| RpcError::Connection {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(ws_task(endpoint.clone(), ws_stream, cmd_rx));

        Ok(Self {
            endpoint,
            cmd_tx,
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
        })
    }

    fn request(&self, method: &str, params: Vec<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params)
    }

    async fn await_reply<T>(
        &self,
        id: u64,
        rx: oneshot::Receiver<Result<T, RpcError>>,
    ) -> Result<T, RpcError> {
        match tokio::time::timeout(self.request_timeout, rx).await {
            Err(_) => {
                let _ = self.cmd_tx.send(WsCommand::Cancel(id));
                Err(RpcError::Timeout {
                    ms: self.request_timeout.as_millis() as u64,
                })
            }
            Ok(Err(_)) => Err(RpcError::Closed),
            Ok(Ok(result)) => result,
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl RpcConnection for WsConnection {
    async fn head_number(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", vec![]).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| RpcError::Other(format!("invalid block number: {result}")))
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let req = self.request(method, params);
        let id = req.id;
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Call { req, tx })
            .map_err(|_| RpcError::Closed)?;
        let resp = self.await_reply(id, rx).await?;
        resp.into_result().map_err(RpcError::Rpc)
    }

    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, RpcError> {
        let req = self.request("eth_subscribe", vec![Value::String("newHeads".into())]);
        let id = req.id;
        let (heads_tx, headers) = mpsc::unbounded_channel();
        let (faults_tx, errors) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Subscribe {
                req,
                heads: heads_tx,
                faults: faults_tx,
                tx,
            })
            .map_err(|_| RpcError::Closed)?;
        let sub = self.await_reply(id, rx).await?;
        tracing::debug!(url = %self.endpoint, subscription = %sub, "subscribed to newHeads");
        Ok(HeadSubscription {
            id: sub,
            headers,
            errors,
        })
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), RpcError> {
        // Stop routing first so the loop sees `Closed` even if the node is gone.
        let _ = self.cmd_tx.send(WsCommand::Forget(id.clone()));
        self.call("eth_unsubscribe", vec![Value::String(id.0.clone())])
            .await
            .map(|_| ())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    endpoint: String,
    ws_stream: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut pending: HashMap<u64, Pending> = HashMap::new();
    let mut subscriptions = SubscriptionRegistry::new();

    let reason = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match handle_command(cmd, &mut pending, &mut subscriptions) {
                    Outgoing::Frame(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break e.to_string();
                        }
                    }
                    Outgoing::Nothing => {}
                    Outgoing::Shutdown => {
                        let _ = sink.send(Message::Close(None)).await;
                        tracing::debug!(url = %endpoint, "WebSocket closed locally");
                        return;
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break "stream ended".to_string(),
                    Some(Err(e)) => break e.to_string(),
                    Some(Ok(Message::Text(text))) => {
                        handle_message(text.as_str(), &mut pending, &mut subscriptions);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => break "closed by server".to_string(),
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    tracing::warn!(url = %endpoint, %reason, "WebSocket disconnected");
    subscriptions.fault_all(&reason);
    for (_, waiter) in pending.drain() {
        waiter.fail(RpcError::WebSocket(reason.clone()));
    }
}

/// What the socket task does after handling a command.
enum Outgoing {
    Frame(String),
    Nothing,
    Shutdown,
}

fn handle_command(
    cmd: Option<WsCommand>,
    pending: &mut HashMap<u64, Pending>,
    subscriptions: &mut SubscriptionRegistry,
) -> Outgoing {
    let (req, waiter) = match cmd {
        None | Some(WsCommand::Close) => {
            subscriptions.close_all();
            for (_, waiter) in pending.drain() {
                waiter.fail(RpcError::Closed);
            }
            return Outgoing::Shutdown;
        }
        Some(WsCommand::Forget(id)) => {
            subscriptions.close(&id);
            return Outgoing::Nothing;
        }
        Some(WsCommand::Cancel(id)) => {
            if pending.remove(&id).is_some() {
                tracing::debug!(id, "dropping timed-out request");
            }
            return Outgoing::Nothing;
        }
        Some(WsCommand::Call { req, tx }) => (req, Pending::Call(tx)),
        Some(WsCommand::Subscribe { req, heads, faults, tx }) => {
            (req, Pending::Subscribe { heads, faults, tx })
        }
    };
    match serde_json::to_string(&req) {
        Ok(text) => {
            pending.insert(req.id, waiter);
            Outgoing::Frame(text)
        }
        Err(e) => {
            waiter.fail(RpcError::Deserialization(e));
            Outgoing::Nothing
        }
    }
}

fn handle_message(
    text: &str,
    pending: &mut HashMap<u64, Pending>,
    subscriptions: &mut SubscriptionRegistry,
) {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("failed to parse WS message as JSON");
        return;
    };

    if val.get("method").and_then(|m| m.as_str()) == Some("eth_subscription") {
        let params = &val["params"];
        let Some(id) = params["subscription"].as_str() else {
            return;
        };
        match parse_head(&params["result"]) {
            Some(head) => {
                if !subscriptions.dispatch(&SubscriptionId(id.to_string()), head) {
                    tracing::debug!(subscription = id, "notification for unknown subscription");
                }
            }
            None => tracing::debug!(subscription = id, "notification without a block number"),
        }
        return;
    }

    let resp = match serde_json::from_value::<JsonRpcResponse>(val) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(error = %e, "unrecognised WS message");
            return;
        }
    };
    let Some(id) = resp.id else {
        tracing::debug!("response without a request id");
        return;
    };
    match pending.remove(&id) {
        Some(Pending::Call(tx)) => {
            let _ = tx.send(Ok(resp));
        }
        Some(Pending::Subscribe { heads, faults, tx }) => {
            let outcome = match resp.into_result() {
                Ok(Value::String(sub)) => {
                    let sub = SubscriptionId(sub);
                    subscriptions.register(sub.clone(), heads, faults);
                    Ok(sub)
                }
                Ok(other) => Err(RpcError::Other(format!("unexpected subscription id: {other}"))),
                Err(e) => Err(RpcError::Rpc(e)),
            };
            let _ = tx.send(outcome);
        }
        None => tracing::debug!(id, "response for unknown request"),
    }
}

fn parse_head(result: &Value) -> Option<NewHead> {
    let number = parse_hex_u64(result.get("number")?.as_str()?)?;
    let hash = result.get("hash").and_then(|h| h.as_str()).map(String::from);
    Some(NewHead { number, hash })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_head_notification() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        let (htx, mut hrx) = mpsc::unbounded_channel();
        let (ftx, _frx) = mpsc::unbounded_channel();
        subs.register(SubscriptionId("0xabc".into()), htx, ftx);

        let msg = r#"{
            "jsonrpc":"2.0","method":"eth_subscription",
            "params":{"subscription":"0xabc","result":{"number":"0x1b4","hash":"0xfeed"}}
        }"#;
        handle_message(msg, &mut pending, &mut subs);

        let head = hrx.try_recv().unwrap();
        assert_eq!(head.number, 436);
        assert_eq!(head.hash.as_deref(), Some("0xfeed"));
    }

    #[test]
    fn subscribe_response_registers_before_reply() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        let (htx, mut hrx) = mpsc::unbounded_channel();
        let (ftx, _frx) = mpsc::unbounded_channel();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(3, Pending::Subscribe {
            heads: htx,
            faults: ftx,
            tx,
        });

        let reply = r#"{"jsonrpc":"2.0","id":3,"result":"0x9ce59a13"}"#;
        handle_message(reply, &mut pending, &mut subs);
        assert_eq!(rx.try_recv().unwrap().unwrap(), SubscriptionId("0x9ce59a13".into()));
        assert_eq!(subs.len(), 1);

        let note = r#"{"jsonrpc":"2.0","method":"eth_subscription",
            "params":{"subscription":"0x9ce59a13","result":{"number":"0x10"}}}"#;
        handle_message(note, &mut pending, &mut subs);
        assert_eq!(hrx.try_recv().unwrap().number, 16);
    }

    #[test]
    fn subscribe_error_is_reported() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        let (htx, _) = mpsc::unbounded_channel();
        let (ftx, _) = mpsc::unbounded_channel();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(1, Pending::Subscribe {
            heads: htx,
            faults: ftx,
            tx,
        });

        handle_message(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"notifications not supported"}}"#,
            &mut pending,
            &mut subs,
        );
        assert!(matches!(rx.try_recv().unwrap(), Err(RpcError::Rpc(_))));
        assert!(subs.is_empty());
    }

    #[test]
    fn call_response_routed_by_id() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        pending.insert(1, Pending::Call(tx1));
        pending.insert(2, Pending::Call(tx2));

        handle_message(r#"{"jsonrpc":"2.0","id":2,"result":"0x10"}"#, &mut pending, &mut subs);
        let resp = rx2.try_recv().unwrap().unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::String("0x10".into()));
        assert!(rx1.try_recv().is_err());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn ignores_garbage() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        handle_message("not json", &mut pending, &mut subs);
        handle_message(r#"{"jsonrpc":"2.0","id":99,"result":"0x1"}"#, &mut pending, &mut subs);
        assert!(pending.is_empty());
    }

    fn call_command(id: u64) -> (WsCommand, oneshot::Receiver<Result<JsonRpcResponse, RpcError>>) {
        let (tx, rx) = oneshot::channel();
        let req = JsonRpcRequest::new(id, "eth_blockNumber", vec![]);
        (WsCommand::Call { req, tx }, rx)
    }

    #[test]
    fn call_command_is_framed_and_tracked() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        let (cmd, _rx) = call_command(4);

        match handle_command(Some(cmd), &mut pending, &mut subs) {
            Outgoing::Frame(text) => assert!(text.contains("\"eth_blockNumber\"")),
            _ => panic!("expected a frame"),
        }
        assert!(pending.contains_key(&4));
    }

    #[test]
    fn cancelled_request_is_forgotten() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        let (first, mut first_rx) = call_command(1);
        let (second, _second_rx) = call_command(2);
        handle_command(Some(first), &mut pending, &mut subs);
        handle_command(Some(second), &mut pending, &mut subs);

        assert!(matches!(
            handle_command(Some(WsCommand::Cancel(1)), &mut pending, &mut subs),
            Outgoing::Nothing
        ));
        assert_eq!(pending.len(), 1);
        assert!(first_rx.try_recv().is_err());

        // A late reply to the cancelled id is dropped.
        handle_message(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#, &mut pending, &mut subs);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key(&2));
    }

    #[test]
    fn close_fails_every_waiter() {
        let mut pending = HashMap::new();
        let mut subs = SubscriptionRegistry::new();
        let (cmd, mut rx) = call_command(9);
        handle_command(Some(cmd), &mut pending, &mut subs);

        assert!(matches!(
            handle_command(Some(WsCommand::Close), &mut pending, &mut subs),
            Outgoing::Shutdown
        ));
        assert!(pending.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), Err(RpcError::Closed)));
    }

    #[tokio::test]
    async fn dial_failure_is_a_connection_error() {
        let err = WsConnector::default()
            .dial("ws://127.0.0.1:1")
            .await
            .err()
            .expect("dial should fail");
        assert!(matches!(err, RpcError::Connection { .. }));
    }
}
