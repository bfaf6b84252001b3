//! Conversation persistence contract for the Telegram adapter.
//!
//! Kept as a trait (rather than a direct `rusqlite` dependency) so this
//! crate never needs to know the gateway's control-plane schema (§6
//! `platform_conversations` / `conversation_messages`) — the gateway
//! binary supplies the concrete implementation over its own database
//! connection, grounded on the original source's `PlatformConversation`
//! model.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct PlatformConversation {
    pub id: String,
    pub session_id: String,
    pub is_closed: bool,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Find the conversation for `(bot_config_id, platform_user_id)`,
    /// creating one with a freshly-minted session id if absent (§4.9 step
    /// 2).
    async fn find_or_create(
        &self,
        bot_config_id: &str,
        platform_user_id: &str,
    ) -> Result<PlatformConversation, crate::error::TelegramError>;

    /// Persist one message and bump `last_message_at` (§4.9 step 3).
    async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), crate::error::TelegramError>;
}
