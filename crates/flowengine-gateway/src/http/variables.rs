//! Extracted-variable inspection endpoints (§6 `/variables/*`): these read
//! the control-plane's `extracted_variables` table, independent of the
//! session store's per-turn `ChatSession.extracted_variables` snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct VariableEntry {
    pub conversation_id: String,
    pub name: String,
    pub value: serde_json::Value,
}

fn to_entries(rows: Vec<(String, String, String)>) -> Vec<VariableEntry> {
    rows.into_iter()
        .map(|(conversation_id, name, value)| VariableEntry {
            conversation_id,
            name,
            value: serde_json::from_str(&value).unwrap_or(serde_json::Value::Null),
        })
        .collect()
}

pub async fn by_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let vars = crate::storage::load_variables(&conn, &id)?;
    Ok(Json(serde_json::Value::Object(vars)))
}

pub async fn by_bot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VariableEntry>>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let rows = crate::storage::variables_by_bot(&conn, &id)?;
    Ok(Json(to_entries(rows)))
}

/// Per-bot rollup: how many distinct conversations populated each variable
/// name, a cheap signal of which prompts/extractions are actually firing.
pub async fn bot_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HashMap<String, usize>>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let rows = crate::storage::variables_by_bot(&conn, &id)?;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (_, name, _) in rows {
        *counts.entry(name).or_insert(0) += 1;
    }
    Ok(Json(counts))
}

pub async fn by_flow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VariableEntry>>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let rows = crate::storage::variables_by_flow(&conn, &id)?;
    Ok(Json(to_entries(rows)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub variable_name: Option<String>,
    pub variable_value: Option<String>,
    pub bot_id: Option<String>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<VariableEntry>>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let rows = crate::storage::search_variables(
        &conn,
        query.variable_name.as_deref(),
        query.variable_value.as_deref(),
        query.bot_id.as_deref(),
    )?;
    Ok(Json(to_entries(rows)))
}
