//! Bot CRUD (§6 `/bots`) — thin HTTP wrappers over [`crate::bots`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use teloxide::prelude::Requester;
use teloxide::Bot;
use tracing::warn;

use flowengine_core::error::EngineError;

use super::ApiError;
use crate::app::AppState;
use crate::bots::{BotConfig, BotConfigPatch, NewBotConfig};

#[derive(Debug, Serialize)]
pub struct BotSummary {
    pub id: String,
    pub platform: String,
    pub name: String,
    pub is_active: bool,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewBotConfig>,
) -> Result<Json<BotConfig>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let created = crate::bots::create(&conn, &state.cipher, new)?;
    Ok(Json(created))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<BotSummary>>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let rows = crate::bots::list(&conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(id, platform, name, is_active)| BotSummary {
                id,
                platform,
                name,
                is_active,
            })
            .collect(),
    ))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BotConfig>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let bot = crate::bots::get(&conn, &state.cipher, &id)?
        .ok_or_else(|| EngineError::NotFound(format!("bot {id}")))?;
    Ok(Json(bot))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<BotConfigPatch>,
) -> Result<Json<BotConfig>, ApiError> {
    let conn = state.control_db.lock().unwrap();
    let bot = crate::bots::update(&conn, &state.cipher, &id, patch)?
        .ok_or_else(|| EngineError::NotFound(format!("bot {id}")))?;
    Ok(Json(bot))
}

pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let conn = state.control_db.lock().unwrap();
    crate::bots::deactivate(&conn, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-registers the Telegram webhook URL for every active bot, using
/// `config.webhooks.base_url` as the externally reachable address (§6).
pub async fn update_webhooks(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let base_url = state
        .config
        .webhooks
        .base_url
        .clone()
        .ok_or_else(|| EngineError::Config("webhooks.base_url is not configured".to_string()))?;

    let bots = {
        let conn = state.control_db.lock().unwrap();
        crate::bots::list(&conn)?
    };

    let mut updated = Vec::new();
    for (id, _platform, _name, is_active) in bots {
        if !is_active {
            continue;
        }
        let bot = {
            let conn = state.control_db.lock().unwrap();
            crate::bots::get(&conn, &state.cipher, &id)?
        };
        let Some(bot) = bot else { continue };

        let url: teloxide::types::Url = match format!("{base_url}/webhooks/telegram/{id}").parse() {
            Ok(url) => url,
            Err(e) => {
                warn!(bot_id = %id, error = %e, "invalid webhook URL, skipping");
                continue;
            }
        };
        let client = Bot::new(&bot.bot_token);
        match client
            .set_webhook(url)
            .secret_token(bot.webhook_secret.clone())
            .await
        {
            Ok(_) => updated.push(id),
            Err(e) => warn!(bot_id = %id, error = %e, "failed to set Telegram webhook"),
        }
    }

    Ok(Json(serde_json::json!({ "updated": updated })))
}
