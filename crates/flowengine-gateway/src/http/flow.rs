//! `GET /flow/load?file_path=…` (§6): read back a parsed flow as engine-form
//! JSON, regardless of whether the file on disk was authored in canvas form.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiError;
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct LoadQuery {
    pub file_path: String,
}

pub async fn load(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let flow = state.flows.get_or_load(&query.file_path)?;
    let value = serde_json::to_value(&*flow)
        .map_err(flowengine_core::error::EngineError::Serialization)?;
    Ok(Json(value))
}
