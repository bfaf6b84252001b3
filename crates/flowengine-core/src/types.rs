use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session identifier.
///
/// The spec treats `session_id` as an opaque string; this newtype exists so
/// call sites can't accidentally pass a node id or variable name where a
/// session id is expected, matching the rest of the crate family's newtype
/// idiom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh opaque id (random v4 — session ids are not meant to
    /// be time-sortable, unlike the durable row ids in the session store).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Build the adapter-style id `"<platform>-<bot_id>-<user_id>-<uuid8>"`.
    pub fn for_platform_conversation(platform: &str, bot_id: &str, user_id: &str) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self(format!("{platform}-{bot_id}-{user_id}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection identifier (random UUID, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_conversation_id_has_expected_shape() {
        let id = SessionId::for_platform_conversation("telegram", "7", "12345");
        let s = id.as_str();
        assert!(s.starts_with("telegram-7-12345-"));
        assert_eq!(s.rsplit('-').next().unwrap().len(), 8);
    }
}
