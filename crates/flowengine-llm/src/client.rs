//! The uniform LLM client contract (§4.1): `chat(messages, temperature) ->
//! LLMResult`. Every LLM-assisted component in the engine (pathway
//! selector, variable extractor, loop evaluator, response generation) talks
//! to exactly this trait, never to a provider directly.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::pricing::estimate_cost_usd;
use crate::provider::{RawMessage, RawProvider, RawRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Value type returned by every `chat` call. Never a `Result` — failures are
/// represented in-band via `success=false` so callers never need to unwrap
/// an exception across this boundary (§4.1, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub success: bool,
    pub response: Option<String>,
    pub error_message: Option<String>,
    pub timing_ms: f64,
    pub model_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl LlmResult {
    fn failure(model_name: &str, error_message: String, timing_ms: f64) -> Self {
        Self {
            success: false,
            response: None,
            error_message: Some(error_message),
            timing_ms,
            model_name: model_name.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            estimated_cost_usd: 0.0,
        }
    }
}

/// The uniform contract every LLM-assisted component depends on.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> LlmResult;
}

/// Wraps any [`RawProvider`] into the uniform, never-failing [`LlmClient`].
///
/// Concatenates all `system` messages into a single directive prepended to
/// the call (§4.1). Timing wraps the wall-clock duration of the outbound
/// call only; cost is derived from the returned token counts via
/// [`crate::pricing`].
pub struct ProviderClient<P: RawProvider> {
    provider: P,
}

impl<P: RawProvider> ProviderClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl<P: RawProvider> LlmClient for ProviderClient<P> {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> LlmResult {
        let model = self.provider.model().to_string();

        let system: String = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let raw_messages: Vec<RawMessage> = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| RawMessage {
                role: match m.role {
                    ChatRole::User => RawRole::User,
                    ChatRole::Assistant => RawRole::Assistant,
                    ChatRole::System => unreachable!("system messages filtered above"),
                },
                content: m.content.clone(),
            })
            .collect();

        let started = Instant::now();
        let result = self.provider.send(&system, &raw_messages, temperature).await;
        let timing_ms = round1(started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(resp) => {
                let total_tokens = resp.input_tokens + resp.output_tokens;
                let cost = estimate_cost_usd(
                    self.provider.name(),
                    &resp.model,
                    resp.input_tokens,
                    resp.output_tokens,
                );
                LlmResult {
                    success: true,
                    response: Some(resp.text),
                    error_message: None,
                    timing_ms,
                    model_name: resp.model,
                    input_tokens: resp.input_tokens,
                    output_tokens: resp.output_tokens,
                    total_tokens,
                    estimated_cost_usd: cost,
                }
            }
            Err(e) => LlmResult::failure(&model, e.to_string(), timing_ms),
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::RawResponse;

    struct AlwaysFail;
    #[async_trait::async_trait]
    impl RawProvider for AlwaysFail {
        fn name(&self) -> &'static str {
            "test"
        }
        fn model(&self) -> &str {
            "test-model"
        }
        async fn send(
            &self,
            _system: &str,
            _messages: &[RawMessage],
            _temperature: f32,
        ) -> Result<RawResponse, ProviderError> {
            Err(ProviderError::MissingCredentials("no key configured".into()))
        }
    }

    struct AlwaysOk;
    #[async_trait::async_trait]
    impl RawProvider for AlwaysOk {
        fn name(&self) -> &'static str {
            "test"
        }
        fn model(&self) -> &str {
            "test-model"
        }
        async fn send(
            &self,
            _system: &str,
            _messages: &[RawMessage],
            _temperature: f32,
        ) -> Result<RawResponse, ProviderError> {
            Ok(RawResponse {
                text: "ok".to_string(),
                model: "test-model".to_string(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    #[tokio::test]
    async fn failure_never_panics_and_reports_success_false() {
        let client = ProviderClient::new(AlwaysFail);
        let result = client.chat(&[ChatMessage::user("hi")], 0.1).await;
        assert!(!result.success);
        assert!(result.response.is_none());
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn success_reports_tokens_and_response() {
        let client = ProviderClient::new(AlwaysOk);
        let result = client.chat(&[ChatMessage::user("hi")], 0.1).await;
        assert!(result.success);
        assert_eq!(result.response.as_deref(), Some("ok"));
        assert_eq!(result.total_tokens, 15);
    }
}
