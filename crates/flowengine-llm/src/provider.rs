//! The low-level, provider-specific half of the contract. A [`RawProvider`]
//! speaks one vendor's wire format and returns token counts; [`crate::client`]
//! wraps any `RawProvider` into the uniform, never-fails `LlmClient`.

use async_trait::async_trait;

use crate::error::ProviderError;

/// A single message role, mirroring §3's `Message.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub role: RawRole,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One vendor's chat-completion call. Implementations own their own HTTP
/// client and credentials; they never retry (§4.1: "no retries are
/// performed here" — retrying is the Variable Extractor's job, §4.3).
#[async_trait]
pub trait RawProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Model identifier this provider instance is configured to call —
    /// used both for the request and for `LLMResult.model_name`.
    fn model(&self) -> &str;

    async fn send(
        &self,
        system: &str,
        messages: &[RawMessage],
        temperature: f32,
    ) -> Result<RawResponse, ProviderError>;
}
