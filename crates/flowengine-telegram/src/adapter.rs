//! Messaging-Platform Adapter (§4.9): the concrete Telegram bridge.
//!
//! Per-update processing follows the original source's webhook handler
//! shape (stale filter → lookup/create → persist → single-flight → stream
//! → fallback) but drives the engine purely over the realtime socket via
//! [`flowengine_wsclient::WsClientPool`] — this crate never talks to the
//! orchestrator, the flow model, or the session store directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use teloxide::prelude::*;
use teloxide::types::{Update, UpdateKind};
use tracing::{info, warn};

use flowengine_core::config::{SINGLE_FLIGHT_WAIT_SECS, STREAMING_INACTIVITY_BUDGET_SECS};
use flowengine_wsclient::WsClientPool;

use crate::allow::is_allowed;
use crate::dedup::{split_parts, DedupState};
use crate::send::send_response;
use crate::store::ConversationStore;
use crate::typing::TypingHandle;

const CLOSED_CONVERSATION_NOTICE: &str =
    "Esta conversa foi encerrada. Entre em contato novamente para iniciar uma nova.";

pub struct TelegramAdapter {
    bot: Bot,
    bot_config_id: String,
    allow_users: Vec<String>,
    store: Arc<dyn ConversationStore>,
    ws_pool: WsClientPool,
    process_started_at: DateTime<Utc>,
    /// Single-flight guard per session id (§4.9 step 4): presence in the
    /// map means a streaming task is currently processing that session.
    active: Arc<DashMap<String, ()>>,
}

impl TelegramAdapter {
    pub fn new(
        bot: Bot,
        bot_config_id: impl Into<String>,
        allow_users: Vec<String>,
        store: Arc<dyn ConversationStore>,
        ws_pool: WsClientPool,
    ) -> Self {
        Self {
            bot,
            bot_config_id: bot_config_id.into(),
            allow_users,
            store,
            ws_pool,
            process_started_at: Utc::now(),
            active: Arc::new(DashMap::new()),
        }
    }

    /// Handle one inbound Telegram `Update`. `flow_data` is the flow JSON
    /// (engine or canvas form) to attach to the first `user_message` frame
    /// sent for a session (the realtime contract caches it after that).
    pub async fn handle_update(&self, update: Update, flow_data: Value) {
        let Some((chat_id, user_id, username, text, sent_at)) = extract_message(&update) else {
            return;
        };

        if sent_at < self.process_started_at {
            info!(user_id, "Telegram: ignoring stale message from before process start");
            return;
        }

        if !is_allowed(&self.allow_users, &username, &user_id) {
            warn!(user_id, username, "Telegram: rejecting message from disallowed user");
            return;
        }

        let conversation = match self.store.find_or_create(&self.bot_config_id, &user_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Telegram: failed to resolve conversation");
                return;
            }
        };

        if conversation.is_closed {
            send_response(&self.bot, chat_id, CLOSED_CONVERSATION_NOTICE).await;
            return;
        }

        if let Err(e) = self.store.append_message(&conversation.id, "user", &text).await {
            warn!(error = %e, "Telegram: failed to persist user message");
        }

        self.wait_for_single_flight(&conversation.session_id).await;
        self.active.insert(conversation.session_id.clone(), ());

        // One dedup state for the whole turn: the fallback path (§4.9 step
        // 6) must see everything streaming already sent, or a partially
        // streamed reply followed by an overlapping fallback reply would
        // duplicate content (§8 scenario 5).
        let mut dedup = DedupState::new();
        let emitted = self
            .run_streaming(
                chat_id,
                &conversation.id,
                &conversation.session_id,
                &text,
                flow_data.clone(),
                &mut dedup,
            )
            .await;

        if emitted == 0 {
            self.run_fallback(
                chat_id,
                &conversation.id,
                &conversation.session_id,
                &text,
                flow_data,
                &mut dedup,
            )
            .await;
        }

        self.active.remove(&conversation.session_id);
    }

    async fn wait_for_single_flight(&self, session_id: &str) {
        let deadline = Instant::now() + Duration::from_secs(SINGLE_FLIGHT_WAIT_SECS);
        while self.active.contains_key(session_id) {
            if Instant::now() >= deadline {
                warn!(session_id, "Telegram: single-flight wait exhausted, proceeding anyway");
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Streams assistant-message parts as they arrive over the socket.
    /// Returns the number of parts actually emitted.
    async fn run_streaming(
        &self,
        chat_id: ChatId,
        conversation_id: &str,
        session_id: &str,
        text: &str,
        flow_data: Value,
        dedup: &mut DedupState,
    ) -> usize {
        if let Err(e) = self.ws_pool.ensure_connection(session_id).await {
            warn!(session_id, error = %e, "Telegram: failed to connect to realtime hub");
            return 0;
        }
        let Some(mut listener) = self.ws_pool.listen_for_assistant_messages(session_id) else {
            return 0;
        };
        if let Err(e) = self
            .ws_pool
            .send_user_message(session_id, text.to_string(), Some(flow_data))
            .await
        {
            warn!(session_id, error = %e, "Telegram: failed to send user message upstream");
            return 0;
        }

        let typing = TypingHandle::start(self.bot.clone(), chat_id);
        let mut emitted = 0usize;
        let budget = Duration::from_secs(STREAMING_INACTIVITY_BUDGET_SECS);

        loop {
            match tokio::time::timeout(budget, listener.next()).await {
                Ok(Some(chunk)) => {
                    for part in split_parts(&chunk) {
                        let now = Instant::now();
                        if dedup.is_duplicate(&part, now) {
                            continue;
                        }
                        typing.pause();
                        send_response(&self.bot, chat_id, &part).await;
                        typing.resume();
                        dedup.record(&part, now);
                        emitted += 1;
                        if let Err(e) = self.store.append_message(conversation_id, "assistant", &part).await {
                            warn!(error = %e, "Telegram: failed to persist streamed assistant message");
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(session_id, "Telegram: streaming inactivity budget exceeded");
                    break;
                }
            }
        }

        typing.stop();
        emitted
    }

    /// Non-streaming fallback (§4.9 step 6): used only when streaming
    /// produced no output. Shares the turn's [`DedupState`] with the
    /// streaming path so overlapping content already sent is never
    /// repeated (§8 scenario 5).
    async fn run_fallback(
        &self,
        chat_id: ChatId,
        conversation_id: &str,
        session_id: &str,
        text: &str,
        flow_data: Value,
        dedup: &mut DedupState,
    ) {
        if let Err(e) = self.ws_pool.ensure_connection(session_id).await {
            warn!(session_id, error = %e, "Telegram: fallback connect failed");
            return;
        }
        let Some(mut listener) = self.ws_pool.listen_for_assistant_messages(session_id) else {
            return;
        };
        if let Err(e) = self
            .ws_pool
            .send_user_message(session_id, text.to_string(), Some(flow_data))
            .await
        {
            warn!(session_id, error = %e, "Telegram: fallback send failed");
            return;
        }

        if let Ok(Some(chunk)) = tokio::time::timeout(Duration::from_secs(30), listener.next()).await {
            for part in split_parts(&chunk) {
                let now = Instant::now();
                if dedup.is_duplicate(&part, now) {
                    continue;
                }
                send_response(&self.bot, chat_id, &part).await;
                dedup.record(&part, now);
                if let Err(e) = self.store.append_message(conversation_id, "assistant", &part).await {
                    warn!(error = %e, "Telegram: failed to persist fallback assistant message");
                }
            }
        }
    }
}

fn extract_message(update: &Update) -> Option<(ChatId, String, String, String, DateTime<Utc>)> {
    let UpdateKind::Message(msg) = &update.kind else {
        return None;
    };
    let text = msg.text()?.to_string();
    let from = msg.from()?;
    Some((
        msg.chat.id,
        from.id.0.to_string(),
        from.username.clone().unwrap_or_default(),
        text,
        msg.date,
    ))
}
