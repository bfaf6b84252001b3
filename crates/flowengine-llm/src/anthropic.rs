use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::{RawMessage, RawProvider, RawResponse, RawRole};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl RawProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model, "sending request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("anthropic-version", API_VERSION)
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API error");
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
    let messages: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != RawRole::System)
        .map(|m| {
            serde_json::json!({
                "role": match m.role {
                    RawRole::User => "user",
                    RawRole::Assistant => "assistant",
                    RawRole::System => unreachable!("system messages filtered above"),
                },
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": model,
        "max_tokens": 1024,
        "temperature": temperature,
        "system": system,
        "messages": messages,
    })
}

fn parse_response(resp: ApiResponse) -> RawResponse {
    let text = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Unknown => None,
        })
        .collect::<Vec<_>>()
        .join("");

    RawResponse {
        text,
        model: resp.model,
        input_tokens: resp.usage.input_tokens,
        output_tokens: resp.usage.output_tokens,
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
