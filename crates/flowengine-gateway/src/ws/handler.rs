//! Axum WS upgrade handler implementing the realtime session socket
//! (§4.7, §6 `/ws/session/{session_id}?flow_id=…`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use flowengine_core::config::{AUTO_ADVANCE_SENTINEL, HEARTBEAT_GRACE_SECS, MAX_AUTO_ADVANCE};
use flowengine_flow::canvas::flow_from_either;
use flowengine_flow::model::Flow;
use flowengine_protocol::event::{Event, EventKind, FlowExecutionState, HistoryEntry};
use flowengine_protocol::frames::{parse_client_message, ClientMessage, PingFrame, ServerMessage};
use flowengine_sessions::ChatSession;

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub flow_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, session_id, query.flow_id))
}

async fn handle_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: String,
    flow_id: Option<String>,
) {
    let (mut tx, mut rx) = socket.split();
    let mut hub_conn = state.hub.connect(&session_id);

    if send_server_message(
        &mut tx,
        &ServerMessage::Event(Event::new(EventKind::SessionStarted, session_id.clone())),
    )
    .await
    .is_err()
    {
        return;
    }

    if let Ok(Some(session)) = state.sessions.load(&session_id) {
        let snapshot = session_to_snapshot(&session);
        let _ = send_server_message(&mut tx, &ServerMessage::Snapshot(snapshot)).await;
    }

    let mut cached_flow: Option<Arc<Flow>> = match &flow_id {
        Some(path) => state.flows.get_or_load(path).ok(),
        None => None,
    };

    let mut last_pong = Instant::now();
    let heartbeat_interval = Duration::from_secs(state.config.gateway.heartbeat_interval_secs);
    let grace = Duration::from_secs(HEARTBEAT_GRACE_SECS);
    let mut ticker = tokio::time::interval(heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            inbound = rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound_text(
                            &text,
                            &state,
                            &session_id,
                            &mut cached_flow,
                            &mut last_pong,
                        );
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id, error = %e, "ws read error");
                        break;
                    }
                }
            }
            event = hub_conn.recv() => {
                match event {
                    Some(event) => {
                        if send_server_message(&mut tx, &ServerMessage::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if send_server_message(&mut tx, &ServerMessage::Ping(PingFrame::new())).await.is_err() {
                    break;
                }
                // Soft timeout (§5): read timeout is heartbeat + grace. We log
                // and continue rather than closing — TCP keepalive and write
                // failures are what actually tear the connection down.
                if last_pong.elapsed() > heartbeat_interval + grace {
                    warn!(session_id, "heartbeat grace exceeded, no pong received");
                }
            }
        }
    }

    info!(session_id, "ws connection closed");
}

fn handle_inbound_text(
    text: &str,
    state: &Arc<AppState>,
    session_id: &str,
    cached_flow: &mut Option<Arc<Flow>>,
    last_pong: &mut Instant,
) {
    match parse_client_message(text) {
        Some(ClientMessage::Pong) => {
            *last_pong = Instant::now();
        }
        Some(ClientMessage::UserMessage { message, flow_data }) => {
            let flow = resolve_flow(state, cached_flow, flow_data, session_id);
            let Some(flow) = flow else {
                warn!(session_id, "no flow available for user_message, dropping");
                return;
            };
            let state = state.clone();
            let session_id = session_id.to_string();
            tokio::spawn(async move {
                run_turn(state, session_id, message, flow).await;
            });
        }
        None => {
            warn!(session_id, "ignoring unrecognized inbound WS frame");
        }
    }
}

fn resolve_flow(
    state: &Arc<AppState>,
    cached_flow: &mut Option<Arc<Flow>>,
    flow_data: Option<serde_json::Value>,
    session_id: &str,
) -> Option<Arc<Flow>> {
    if let Some(value) = flow_data {
        return match flow_from_either(value) {
            Ok(flow) => {
                let flow = Arc::new(flow);
                *cached_flow = Some(flow.clone());
                Some(flow)
            }
            Err(e) => {
                warn!(session_id, error = %e, "inline flow_data failed to parse");
                cached_flow.clone()
            }
        };
    }
    cached_flow.clone()
}

/// Runs the turn-bounded auto-advance loop (§4.6 step 11), fanning every
/// emitted event out through the hub, then persists the session.
async fn run_turn(state: Arc<AppState>, session_id: String, user_message: String, flow: Arc<Flow>) {
    let mut session = match state.sessions.load(&session_id) {
        Ok(Some(session)) => session,
        Ok(None) => ChatSession::new(session_id.clone(), flow.first_node_id.clone()),
        Err(e) => {
            warn!(session_id, error = %e, "failed to load session");
            return;
        }
    };

    let mut current_message = user_message;
    let mut advances = 0u32;
    loop {
        let (_, _timings, events) = state.orchestrator.run_step(&flow, &mut session, &current_message).await;
        for event in events {
            state.hub.send_event(event);
        }

        let should_advance = state.orchestrator.current_node_skips_user_response(&flow, &session);
        if should_advance && advances < MAX_AUTO_ADVANCE {
            advances += 1;
            current_message = AUTO_ADVANCE_SENTINEL.to_string();
            continue;
        }
        break;
    }

    if let Err(e) = state.sessions.save(&session) {
        warn!(session_id, error = %e, "failed to persist session");
    }
    state.hub.send_event(Event::new(EventKind::MessageProcessingComplete, session_id));
}

fn session_to_snapshot(session: &ChatSession) -> FlowExecutionState {
    let mut variables = serde_json::Map::new();
    for (k, v) in &session.extracted_variables {
        variables.insert(k.clone(), v.clone());
    }
    FlowExecutionState {
        session_id: session.session_id.clone(),
        current_node_id: session.current_node_id.clone(),
        variables,
        message_history: session
            .history
            .iter()
            .map(|m| HistoryEntry {
                role: role_str(m.role).to_string(),
                content: m.content.clone(),
            })
            .collect(),
        is_active: !session.status.is_closed(),
    }
}

fn role_str(role: flowengine_sessions::Role) -> &'static str {
    match role {
        flowengine_sessions::Role::User => "user",
        flowengine_sessions::Role::Assistant => "assistant",
        flowengine_sessions::Role::System => "system",
    }
}

async fn send_server_message(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}
