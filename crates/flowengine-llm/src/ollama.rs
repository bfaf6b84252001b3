use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::{RawMessage, RawProvider, RawResponse, RawRole};

/// Local, unauthenticated provider — no API key required (§9's `TokenType::None`
/// case in the design notes this crate grew from).
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
        }
    }
}

#[async_trait]
impl RawProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        system: &str,
        messages: &[RawMessage],
        temperature: f32,
    ) -> Result<RawResponse, ProviderError> {
        let body = build_request_body(&self.model, system, messages, temperature);
        let url = format!("{}/api/chat", self.base_url);

        debug!(model = %self.model, "sending request to Ollama");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::MissingCredentials(format!("ollama unreachable: {e}"))
                } else {
                    ProviderError::Transport(e)
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(parse_response(api_resp))
    }
}

fn build_request_body(
    model: &str,
    system: &str,
    messages: &[RawMessage],
    temperature: f32,
) -> serde_json::Value {
    let mut body_messages = vec![serde_json::json!({
        "role": "system",
        "content": system,
    })];
    for m in messages {
        if m.role == RawRole::System {
            continue;
        }
        body_messages.push(serde_json::json!({
            "role": match m.role {
                RawRole::User => "user",
                RawRole::Assistant => "assistant",
                RawRole::System => unreachable!("system messages filtered above"),
            },
            "content": m.content,
        }));
    }

    serde_json::json!({
        "model": model,
        "messages": body_messages,
        "stream": false,
        "options": { "temperature": temperature },
    })
}

fn parse_response(resp: ApiResponse) -> RawResponse {
    RawResponse {
        text: resp.message.content,
        model: resp.model,
        input_tokens: resp.prompt_eval_count.unwrap_or(0),
        output_tokens: resp.eval_count.unwrap_or(0),
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    message: OllamaMessage,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}
