//! `POST /webhooks/telegram/{bot_config_id}` (§4.9 step 1): Telegram's
//! webhook delivery endpoint. Always answers 200 immediately and processes
//! the update on a spawned task — a slow or failing turn must never make
//! Telegram retry delivery.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use teloxide::types::Update;
use teloxide::Bot;
use tracing::warn;

use flowengine_telegram::TelegramAdapter;
use flowengine_wsclient::WsClientPool;

use crate::app::AppState;
use crate::conversation_store::GatewayConversationStore;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub async fn telegram(
    State(state): State<Arc<AppState>>,
    Path(bot_config_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let bot_config = {
        let conn = state.control_db.lock().unwrap();
        match crate::bots::get(&conn, &state.cipher, &bot_config_id) {
            Ok(bot) => bot,
            Err(e) => {
                warn!(bot_config_id, error = %e, "failed to load bot config for webhook");
                return StatusCode::OK;
            }
        }
    };

    let Some(bot_config) = bot_config else {
        warn!(bot_config_id, "webhook for unknown bot config");
        return StatusCode::OK;
    };

    if !bot_config.is_active {
        return StatusCode::OK;
    }

    let provided_secret = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided_secret != bot_config.webhook_secret {
        warn!(bot_config_id, "webhook secret mismatch, ignoring update");
        return StatusCode::OK;
    }

    let update: Update = match serde_json::from_str(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(bot_config_id, error = %e, "malformed Telegram update, ignoring");
            return StatusCode::OK;
        }
    };

    let flow = match state.flows.get_or_load(&bot_config.flow_file_path) {
        Ok(flow) => flow,
        Err(e) => {
            warn!(bot_config_id, error = %e, "failed to load flow for webhook");
            return StatusCode::OK;
        }
    };
    let flow_data = match serde_json::to_value(&*flow) {
        Ok(value) => value,
        Err(e) => {
            warn!(bot_config_id, error = %e, "failed to serialize flow for webhook");
            return StatusCode::OK;
        }
    };

    let adapter = adapter_for(&state, &bot_config_id, &bot_config.bot_token);

    tokio::spawn(async move {
        adapter.handle_update(update, flow_data).await;
    });

    StatusCode::OK
}

/// Returns the cached [`TelegramAdapter`] for this bot, building one on
/// first use. The WS pool points at this same process's own realtime hub
/// (§4.9: the adapter drives the engine purely over the socket contract).
fn adapter_for(state: &Arc<AppState>, bot_config_id: &str, bot_token: &str) -> Arc<TelegramAdapter> {
    if let Some(existing) = state.telegram_adapters.get(bot_config_id) {
        return existing.clone();
    }

    let bot = Bot::new(bot_token);
    let ws_base_url = format!("ws://{}:{}", state.config.gateway.bind, state.config.gateway.port);
    let ws_pool = WsClientPool::new(ws_base_url)
        .with_cleanup_delay(std::time::Duration::from_secs(state.config.gateway.cleanup_delay_secs));
    let store = Arc::new(GatewayConversationStore::new(state.control_db.clone(), "telegram"));
    let adapter = Arc::new(TelegramAdapter::new(
        bot,
        bot_config_id.to_string(),
        vec!["*".to_string()],
        store,
        ws_pool,
    ));

    state
        .telegram_adapters
        .entry(bot_config_id.to_string())
        .or_insert_with(|| adapter)
        .clone()
}
