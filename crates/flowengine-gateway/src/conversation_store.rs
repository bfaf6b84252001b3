//! Glue implementing [`flowengine_telegram::ConversationStore`] over the
//! control-plane database, so [`flowengine_telegram::TelegramAdapter`] never
//! needs to know this binary's schema.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use flowengine_telegram::store::{ConversationStore, PlatformConversation};
use flowengine_telegram::TelegramError;

pub struct GatewayConversationStore {
    conn: Arc<Mutex<Connection>>,
    platform: String,
}

impl GatewayConversationStore {
    pub fn new(conn: Arc<Mutex<Connection>>, platform: impl Into<String>) -> Self {
        Self {
            conn,
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl ConversationStore for GatewayConversationStore {
    async fn find_or_create(
        &self,
        bot_config_id: &str,
        platform_user_id: &str,
    ) -> Result<PlatformConversation, TelegramError> {
        let conn = self.conn.lock().unwrap();
        let (id, session_id, is_closed) =
            crate::storage::find_or_create_conversation(&conn, bot_config_id, &self.platform, platform_user_id)
                .map_err(|e| TelegramError::Store(e.to_string()))?;
        Ok(PlatformConversation {
            id,
            session_id,
            is_closed,
        })
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), TelegramError> {
        let conn = self.conn.lock().unwrap();
        crate::storage::append_message(&conn, conversation_id, role, content)
            .map_err(|e| TelegramError::Store(e.to_string()))
    }
}
