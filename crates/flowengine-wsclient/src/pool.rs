//! WebSocket Client Pool (§4.8): one outbound connection per session id,
//! shared by every caller that wants to drive the engine's WS Hub from an
//! external process.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::connection::SessionConnection;
use crate::error::WsClientError;
use crate::types::{CleanupMode, ConnectionHealth};

const DEFAULT_CLEANUP_DELAY_SECS: u64 = 30;

/// Yields assistant-message texts for one session. Dropping it unregisters
/// the underlying queue and, if it was the last listener, schedules delayed
/// cleanup of the connection (§4.8).
pub struct AssistantMessageListener {
    session_id: String,
    listener_id: u64,
    rx: mpsc::UnboundedReceiver<Option<String>>,
    pool: WsClientPool,
}

impl AssistantMessageListener {
    pub async fn next(&mut self) -> Option<String> {
        match self.rx.recv().await {
            Some(Some(text)) => Some(text),
            Some(None) | None => None,
        }
    }
}

impl Drop for AssistantMessageListener {
    fn drop(&mut self) {
        if let Some(conn) = self.pool.connections.get(&self.session_id) {
            conn.unregister_listener(self.listener_id);
            if conn.listener_count() == 0 {
                self.pool.schedule_delayed_cleanup(self.session_id.clone());
            }
        }
    }
}

/// Cheaply cloneable handle to the shared pool state.
#[derive(Clone)]
pub struct WsClientPool {
    base_url: Arc<String>,
    connections: Arc<DashMap<String, Arc<SessionConnection>>>,
    connect_timeout: Duration,
    cleanup_delay: Duration,
}

impl WsClientPool {
    /// `base_url` is the WS Hub's base address, e.g. `ws://localhost:8088`;
    /// `ensure_connection` appends `/ws/session/{session_id}`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Arc::new(base_url.into()),
            connections: Arc::new(DashMap::new()),
            connect_timeout: Duration::from_secs(10),
            cleanup_delay: Duration::from_secs(DEFAULT_CLEANUP_DELAY_SECS),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// Return the existing open connection for `session_id`, or create one.
    pub async fn ensure_connection(&self, session_id: &str) -> Result<(), WsClientError> {
        if self.connections.contains_key(session_id) {
            return Ok(());
        }
        let url = format!("{}/ws/session/{}", self.base_url, session_id);
        let conn = SessionConnection::connect(&url, Some(self.connect_timeout)).await?;
        self.connections.insert(session_id.to_string(), Arc::new(conn));
        Ok(())
    }

    /// Register a new listener for `session_id`'s assistant-message texts.
    /// The caller must have called `ensure_connection` first.
    pub fn listen_for_assistant_messages(&self, session_id: &str) -> Option<AssistantMessageListener> {
        let conn = self.connections.get(session_id)?;
        let (listener_id, rx) = conn.register_listener();
        Some(AssistantMessageListener {
            session_id: session_id.to_string(),
            listener_id,
            rx,
            pool: self.clone(),
        })
    }

    /// Enqueue a user message on `session_id`'s outbound queue and await its
    /// send completion; this guarantees in-order dispatch under concurrent
    /// callers (§4.8).
    pub async fn send_user_message(
        &self,
        session_id: &str,
        message: String,
        flow_data: Option<Value>,
    ) -> Result<(), WsClientError> {
        let conn = self
            .connections
            .get(session_id)
            .map(|c| c.clone())
            .ok_or(WsClientError::Closed)?;
        conn.send_user_message(message, flow_data).await
    }

    pub fn health(&self, session_id: &str) -> Option<ConnectionHealth> {
        self.connections.get(session_id).map(|c| c.health())
    }

    /// Tear down a connection per `mode` (§4.8).
    pub fn cleanup(&self, session_id: &str, mode: CleanupMode) {
        match mode {
            CleanupMode::Immediate => {
                self.connections.remove(session_id);
            }
            CleanupMode::Delayed => self.schedule_delayed_cleanup(session_id.to_string()),
        }
    }

    fn schedule_delayed_cleanup(&self, session_id: String) {
        let pool = self.clone();
        let delay = self.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_idle = pool
                .connections
                .get(&session_id)
                .map(|c| c.listener_count() == 0)
                .unwrap_or(false);
            if still_idle {
                info!(session_id, "delayed cleanup: no listeners remain, tearing down connection");
                pool.connections.remove(&session_id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_empty() {
        let pool = WsClientPool::new("ws://localhost:9999");
        assert!(pool.health("s1").is_none());
    }
}
