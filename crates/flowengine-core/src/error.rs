use thiserror::Error;

/// Error kinds that can cross a component boundary documented as returning
/// a result type. Every variant maps to a stable `.code()` string used both
/// in HTTP JSON error bodies and WS `error` events.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("LLM call failed: {0}")]
    LlmFailure(String),

    #[error("failed to parse response: {0}")]
    ParseFailure(String),

    #[error("session store error: {0}")]
    StoreFailure(String),

    #[error("upstream socket error: {0}")]
    UpstreamSocketFailure(String),

    #[error("chat platform error: {0}")]
    ChatPlatformFailure(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Short machine-readable code sent to clients in HTTP/WS error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::LlmFailure(_) => "LLM_FAILURE",
            EngineError::ParseFailure(_) => "PARSE_FAILURE",
            EngineError::StoreFailure(_) => "STORE_FAILURE",
            EngineError::UpstreamSocketFailure(_) => "UPSTREAM_SOCKET_FAILURE",
            EngineError::ChatPlatformFailure(_) => "CHAT_PLATFORM_FAILURE",
            EngineError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
