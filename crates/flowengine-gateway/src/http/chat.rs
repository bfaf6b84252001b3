//! Single-turn chat contract (§6 `/chat/message`, `/chat/message-with-flow`):
//! callers without a realtime socket can drive one turn per HTTP request.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use flowengine_core::config::{AUTO_ADVANCE_SENTINEL, MAX_AUTO_ADVANCE};
use flowengine_core::error::EngineError;
use flowengine_flow::canvas::flow_from_either;
use flowengine_flow::model::Flow;
use flowengine_sessions::ChatSession;

use super::ApiError;
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    pub flow_path: String,
    pub user_message: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageWithFlowRequest {
    pub session_id: String,
    pub flow: serde_json::Value,
    pub user_message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
    pub current_node_id: String,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub model_name: String,
}

pub async fn message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let flow = state.flows.get_or_load(&req.flow_path)?;
    let response = run_turn(&state, req.session_id, &flow, req.user_message).await?;
    Ok(Json(response))
}

pub async fn message_with_flow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageWithFlowRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let flow = Arc::new(
        flow_from_either(req.flow).map_err(|e| EngineError::InvalidInput(e.to_string()))?,
    );
    let response = run_turn(&state, req.session_id, &flow, req.user_message).await?;
    Ok(Json(response))
}

/// Runs the bounded auto-advance loop (§4.6 step 11) for one HTTP turn,
/// returning only the final reply — the caller has no socket to stream
/// intermediate turns over, so every skip-user-response hop happens inside
/// this one request.
async fn run_turn(
    state: &Arc<AppState>,
    session_id: String,
    flow: &Arc<Flow>,
    user_message: String,
) -> Result<MessageResponse, EngineError> {
    let mut session = match state.sessions.load(&session_id)? {
        Some(session) => session,
        None => ChatSession::new(session_id.clone(), flow.first_node_id.clone()),
    };

    let mut current_message = user_message;
    let mut advances = 0u32;
    let mut reply = String::new();
    let mut tokens_used = 0u64;
    let mut cost_usd = 0.0;
    let mut model_name = String::new();

    loop {
        let (step_reply, timings, events) = state
            .orchestrator
            .run_step(flow, &mut session, &current_message)
            .await;
        reply = step_reply;
        tokens_used += timings.tokens_used;
        cost_usd += timings.cost_usd;
        if !timings.model_name.is_empty() {
            model_name = timings.model_name;
        }
        for event in events {
            state.hub.send_event(event);
        }

        let should_advance = state.orchestrator.current_node_skips_user_response(flow, &session);
        if should_advance && advances < MAX_AUTO_ADVANCE {
            advances += 1;
            current_message = AUTO_ADVANCE_SENTINEL.to_string();
            continue;
        }
        break;
    }

    state.sessions.save(&session)?;

    Ok(MessageResponse {
        reply,
        current_node_id: session.current_node_id,
        tokens_used,
        cost_usd,
        model_name,
    })
}
