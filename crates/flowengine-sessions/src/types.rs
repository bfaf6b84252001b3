use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single turn in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// The mutable, per-conversation record the orchestrator owns for the
/// duration of one turn and the session store persists between turns
/// (§3 ChatSession).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub current_node_id: String,
    #[serde(default)]
    pub previous_node_id: Option<String>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub extracted_variables: HashMap<String, Value>,
    /// Conversation lifecycle state (§9 open question: canonical enum,
    /// `"closed"` accepted as a read-time synonym of `Inactive`).
    #[serde(default)]
    pub status: ConversationStatus,
}

impl ChatSession {
    /// Create a fresh session positioned at the flow's first node.
    pub fn new(session_id: impl Into<String>, first_node_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_node_id: first_node_id.into(),
            previous_node_id: None,
            history: Vec::new(),
            extracted_variables: HashMap::new(),
            status: ConversationStatus::Active,
        }
    }
}

/// Canonical conversation lifecycle state.
///
/// The original source mixes a `status = "closed"` string convention with a
/// separate `INACTIVE` enum value for the same concept; this type picks the
/// enum as canonical and accepts `"closed"` only when reading legacy data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Inactive,
    Archived,
    /// Legacy spelling, read-only: deserializes to `Inactive` in practice
    /// via `deserialize_status`; kept here only so `Display`/matching stay
    /// exhaustive if a caller constructs it directly from old data.
    #[serde(rename = "closed")]
    Closed,
}

impl ConversationStatus {
    /// Normalize the legacy `Closed` spelling to `Inactive`. Called after
    /// deserializing any externally-sourced status value.
    pub fn normalized(self) -> Self {
        match self {
            ConversationStatus::Closed => ConversationStatus::Inactive,
            other => other,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(
            self.normalized(),
            ConversationStatus::Inactive | ConversationStatus::Archived
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_closed_normalizes_to_inactive() {
        assert_eq!(
            ConversationStatus::Closed.normalized(),
            ConversationStatus::Inactive
        );
    }

    #[test]
    fn fresh_session_starts_active_at_first_node() {
        let session = ChatSession::new("sess-1", "start");
        assert_eq!(session.current_node_id, "start");
        assert!(session.history.is_empty());
        assert_eq!(session.status, ConversationStatus::Active);
    }
}
