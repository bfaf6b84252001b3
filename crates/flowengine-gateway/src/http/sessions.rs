//! Session admin endpoints (§6 `/sessions`): list, inspect, delete, close,
//! and reset conversations independent of any chat platform.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use flowengine_core::error::EngineError;
use flowengine_core::types::SessionId;
use flowengine_sessions::ConversationStatus;

use super::ApiError;
use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub current_node_id: String,
    pub status: ConversationStatus,
    pub message_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub old_session_id: String,
    pub new_session_id: String,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let sessions = state.sessions.list()?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionSummary {
                session_id: s.session_id,
                current_node_id: s.current_node_id,
                status: s.status,
                message_count: s.history.len(),
            })
            .collect(),
    ))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<flowengine_sessions::ChatSession>, ApiError> {
    let session = state
        .sessions
        .load(&id)?
        .ok_or_else(|| EngineError::NotFound(format!("session {id}")))?;
    Ok(Json(session))
}

pub async fn delete_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.clear(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Marks a session `Inactive` without purging its history (§3
/// `ConversationStatus`), e.g. for an operator ending a conversation by hand.
pub async fn close(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut session = state
        .sessions
        .load(&id)?
        .ok_or_else(|| EngineError::NotFound(format!("session {id}")))?;
    session.status = ConversationStatus::Inactive;
    state.sessions.save(&session)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mints a new session id and purges history/extracted variables, keeping
/// the conversation positioned at its current node (§9 open question: there
/// is no flow reference on this admin path to fall back to the flow's start
/// node, so reset renews identity rather than restarting the flow).
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ResetResponse>, ApiError> {
    let mut session = state
        .sessions
        .load(&id)?
        .ok_or_else(|| EngineError::NotFound(format!("session {id}")))?;

    let new_session_id = SessionId::new().to_string();
    state.sessions.clear(&id)?;

    session.session_id = new_session_id.clone();
    session.previous_node_id = None;
    session.history.clear();
    session.extracted_variables.clear();
    session.status = ConversationStatus::Active;
    state.sessions.save(&session)?;

    Ok(Json(ResetResponse {
        old_session_id: id,
        new_session_id,
    }))
}
