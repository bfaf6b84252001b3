//! Shared application state and router assembly.

use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use flowengine_core::config::EngineConfig;
use flowengine_core::error::Result;
use flowengine_engine::Orchestrator;
use flowengine_llm::LlmClient;
use flowengine_sessions::SessionStore;

use crate::crypto::CredentialCipher;
use crate::flows::FlowCache;
use crate::ws::hub::EventHub;

pub struct AppState {
    pub config: EngineConfig,
    pub control_db: Arc<Mutex<Connection>>,
    pub sessions: Arc<SessionStore>,
    pub flows: Arc<FlowCache>,
    pub llm: Arc<dyn LlmClient>,
    pub orchestrator: Arc<Orchestrator>,
    pub hub: EventHub,
    pub cipher: Arc<CredentialCipher>,
    /// One [`flowengine_telegram::TelegramAdapter`] per active bot config,
    /// built lazily on first webhook delivery and reused across updates so
    /// the adapter's single-flight map and WS pool stay warm per bot.
    pub telegram_adapters: dashmap::DashMap<String, Arc<flowengine_telegram::TelegramAdapter>>,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let control_path = control_db_path(&config.sessions.path);
        let control_db = crate::storage::open(&control_path)?;

        let session_conn = rusqlite::Connection::open(&config.sessions.path)
            .map_err(|e| flowengine_core::error::EngineError::StoreFailure(e.to_string()))?;
        flowengine_sessions::db::init_db(&session_conn)
            .map_err(|e| flowengine_core::error::EngineError::StoreFailure(e.to_string()))?;
        let sessions = Arc::new(SessionStore::new(session_conn, config.sessions.ttl_secs));

        let llm = flowengine_llm::build_client(&config)?;
        let orchestrator = Arc::new(Orchestrator::new(llm.clone()));

        let key_hex = config
            .telegram
            .as_ref()
            .and_then(|t| t.credential_encryption_key.clone())
            .unwrap_or_else(|| {
                tracing::warn!("no credential_encryption_key configured; generating an ephemeral key for this process");
                CredentialCipher::generate_key_hex()
            });
        let cipher = Arc::new(CredentialCipher::from_hex(&key_hex).map_err(|e| {
            flowengine_core::error::EngineError::Config(format!("invalid credential_encryption_key: {e}"))
        })?);

        Ok(Self {
            config,
            control_db: Arc::new(Mutex::new(control_db)),
            sessions,
            flows: Arc::new(FlowCache::new()),
            llm,
            orchestrator,
            hub: EventHub::new(),
            cipher,
            telegram_adapters: dashmap::DashMap::new(),
        })
    }
}

/// Derives the control-plane database path as a sibling of the sessions
/// database, e.g. `~/.flowengine/flowengine.db` → `~/.flowengine/control.db`.
fn control_db_path(sessions_path: &str) -> String {
    let path = std::path::Path::new(sessions_path);
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join("control.db").to_string_lossy().into_owned()
        }
        _ => "control.db".to_string(),
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health/", get(crate::http::health::health))
        .route("/chat/message", post(crate::http::chat::message))
        .route(
            "/chat/message-with-flow",
            post(crate::http::chat::message_with_flow),
        )
        .route("/flow/load", get(crate::http::flow::load))
        .route("/bots", post(crate::http::bots::create).get(crate::http::bots::list))
        .route(
            "/bots/{id}",
            get(crate::http::bots::get_one)
                .put(crate::http::bots::update)
                .delete(crate::http::bots::deactivate),
        )
        .route(
            "/bots/update-webhooks",
            post(crate::http::bots::update_webhooks),
        )
        .route("/sessions", get(crate::http::sessions::list))
        .route("/sessions/{id}", get(crate::http::sessions::get_one).delete(crate::http::sessions::delete_one))
        .route("/sessions/{id}/close", post(crate::http::sessions::close))
        .route("/sessions/{id}/reset", post(crate::http::sessions::reset))
        .route(
            "/variables/conversations/{id}",
            get(crate::http::variables::by_conversation),
        )
        .route("/variables/bots/{id}", get(crate::http::variables::by_bot))
        .route(
            "/variables/bots/{id}/summary",
            get(crate::http::variables::bot_summary),
        )
        .route("/variables/flows/{id}", get(crate::http::variables::by_flow))
        .route("/variables/search", get(crate::http::variables::search))
        .route(
            "/webhooks/telegram/{bot_config_id}",
            post(crate::http::webhooks::telegram),
        )
        .route("/ws/session/{session_id}", get(crate::ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
