//! One outbound socket per session id: a reader task that fans incoming
//! assistant-message events out to registered listeners, and a sender task
//! that serializes outbound `user_message` frames in strict FIFO order
//! (§4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use flowengine_protocol::event::{Event, EventKind, FlowExecutionState};
use flowengine_protocol::frames::{ClientMessage, PingFrame};

use crate::error::WsClientError;
use crate::types::ConnectionHealth;

const BACKOFF_SCHEDULE_SECS: &[u64] = &[1, 2, 4];
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum OutboundItem {
    UserMessage {
        message: String,
        flow_data: Option<Value>,
        done: oneshot::Sender<Result<(), WsClientError>>,
    },
    Pong,
}

type ListenerMap = std::sync::Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Option<String>>>>>;

/// One session's upstream socket plus the fan-out state around it.
pub struct SessionConnection {
    outbound_tx: mpsc::UnboundedSender<OutboundItem>,
    listeners: ListenerMap,
    next_listener_id: AtomicU64,
    health: std::sync::Arc<Mutex<ConnectionHealth>>,
    cached_flow_data: Mutex<Option<Value>>,
    reader_handle: JoinHandle<()>,
    sender_handle: JoinHandle<()>,
}

impl SessionConnection {
    pub async fn connect(url: &str, connect_timeout: Option<Duration>) -> Result<Self, WsClientError> {
        let timeout = connect_timeout.unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
        let socket = connect_with_retry(url, timeout).await?;
        let (write, read) = socket.split();

        let listeners: ListenerMap = std::sync::Arc::new(Mutex::new(HashMap::new()));
        let health = std::sync::Arc::new(Mutex::new(ConnectionHealth::new()));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<OutboundItem>();

        let reader_listeners = listeners.clone();
        let reader_health = health.clone();
        let reader_outbound_tx = outbound_tx.clone();
        let reader_handle = tokio::spawn(async move {
            reader_loop(read, reader_listeners, reader_health, reader_outbound_tx).await;
        });

        let sender_handle = tokio::spawn(async move {
            sender_loop(write, outbound_rx).await;
        });

        Ok(Self {
            outbound_tx,
            listeners,
            next_listener_id: AtomicU64::new(0),
            health,
            cached_flow_data: Mutex::new(None),
            reader_handle,
            sender_handle,
        })
    }

    /// Register a new listener and return its id plus the receiving half of
    /// its queue. A `None` item on the queue is the close sentinel.
    pub fn register_listener(&self) -> (u64, mpsc::UnboundedReceiver<Option<String>>) {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    pub fn unregister_listener(&self, id: u64) {
        self.listeners.lock().unwrap().remove(&id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.lock().unwrap().clone()
    }

    /// Enqueue a user message and await its send completion, guaranteeing
    /// FIFO dispatch even under concurrent callers (§4.8).
    ///
    /// `flow_data` is cached per connection; when the caller omits it on a
    /// later call the last known value is resent rather than dropped, since
    /// the sender is conservative about what the server has cached.
    pub async fn send_user_message(&self, message: String, flow_data: Option<Value>) -> Result<(), WsClientError> {
        let effective_flow_data = {
            let mut cache = self.cached_flow_data.lock().unwrap();
            if flow_data.is_some() {
                *cache = flow_data;
            }
            cache.clone()
        };

        let (done_tx, done_rx) = oneshot::channel();
        self.outbound_tx
            .send(OutboundItem::UserMessage {
                message,
                flow_data: effective_flow_data,
                done: done_tx,
            })
            .map_err(|_| WsClientError::Closed)?;

        done_rx.await.map_err(|_| WsClientError::Closed)?
    }

    /// Tear down the reader/sender tasks and notify every listener with the
    /// close sentinel.
    pub fn shutdown(&self) {
        self.reader_handle.abort();
        self.sender_handle.abort();
        let listeners = self.listeners.lock().unwrap();
        for tx in listeners.values() {
            let _ = tx.send(None);
        }
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn connect_with_retry(url: &str, connect_timeout: Duration) -> Result<WsStream, WsClientError> {
    let mut last_err = None;

    for (attempt, delay) in std::iter::once(0).chain(BACKOFF_SCHEDULE_SECS.iter().copied()).enumerate() {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
        match tokio::time::timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok((stream, _response))) => return Ok(stream),
            Ok(Err(e)) => {
                warn!(attempt, error = %e, "upstream connect attempt failed");
                last_err = Some(WsClientError::Transport(e));
            }
            Err(_) => {
                warn!(attempt, "upstream connect attempt timed out");
                last_err = Some(WsClientError::ConnectTimeout);
            }
        }
    }

    Err(last_err.unwrap_or(WsClientError::ConnectFailed(url.to_string())))
}

async fn reader_loop(
    mut read: futures_util::stream::SplitStream<WsStream>,
    listeners: std::sync::Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Option<String>>>>>,
    health: std::sync::Arc<Mutex<ConnectionHealth>>,
    outbound_tx: mpsc::UnboundedSender<OutboundItem>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                handle_incoming_text(&text, &listeners, &health, &outbound_tx);
            }
            Ok(WsMessage::Close(_)) => {
                debug!("upstream socket closed by peer");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "upstream socket read error");
                health.lock().unwrap().record_error();
                break;
            }
        }
    }

    for tx in listeners.lock().unwrap().values() {
        let _ = tx.send(None);
    }
}

fn handle_incoming_text(
    text: &str,
    listeners: &std::sync::Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Option<String>>>>>,
    health: &std::sync::Arc<Mutex<ConnectionHealth>>,
    outbound_tx: &mpsc::UnboundedSender<OutboundItem>,
) {
    if let Ok(ping) = serde_json::from_str::<PingFrame>(text) {
        if ping.frame_type == "ping" {
            health.lock().unwrap().record_ping();
            let _ = outbound_tx.send(OutboundItem::Pong);
            return;
        }
    }

    if let Ok(event) = serde_json::from_str::<Event>(text) {
        health.lock().unwrap().record_healthy();
        if let EventKind::AssistantMessage { content } = event.kind {
            let listeners = listeners.lock().unwrap();
            for tx in listeners.values() {
                let _ = tx.send(Some(content.clone()));
            }
        }
        return;
    }

    if serde_json::from_str::<FlowExecutionState>(text).is_ok() {
        health.lock().unwrap().record_healthy();
        return;
    }

    debug!(text, "upstream socket received unrecognized frame shape, ignoring");
}

async fn sender_loop(
    mut write: futures_util::stream::SplitSink<WsStream, WsMessage>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundItem>,
) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            OutboundItem::UserMessage { message, flow_data, done } => {
                let frame = ClientMessage::UserMessage { message, flow_data };
                let result = match serde_json::to_string(&frame) {
                    Ok(text) => write
                        .send(WsMessage::Text(text))
                        .await
                        .map_err(WsClientError::Transport),
                    Err(e) => Err(WsClientError::SendFailed(e.to_string())),
                };
                let _ = done.send(result);
            }
            OutboundItem::Pong => {
                let _ = write.send(WsMessage::Text("pong".to_string())).await;
            }
        }
    }
}
