//! HTTP admin/control surface (§6 External Interfaces): Bot CRUD, the
//! single-turn chat contract, session admin, and the Telegram webhook.

pub mod bots;
pub mod chat;
pub mod flow;
pub mod health;
pub mod sessions;
pub mod variables;
pub mod webhooks;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use flowengine_core::error::EngineError;

/// Shared HTTP error mapping: every handler returns `Result<_, ApiError>` so
/// the `EngineError -> (status, json body)` translation lives in one place.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl From<flowengine_sessions::SessionError> for ApiError {
    fn from(e: flowengine_sessions::SessionError) -> Self {
        Self(EngineError::StoreFailure(e.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
