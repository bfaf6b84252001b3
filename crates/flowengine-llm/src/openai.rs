use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::{RawMessage, RawProvider, RawResponse, RawRole};

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
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
impl RawProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %self.model, "sending request to OpenAI");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI API error");
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
    let mut msgs = vec![serde_json::json!({
        "role": "system",
        "content": system,
    })];
    for m in messages {
        if m.role == RawRole::System {
            continue;
        }
        msgs.push(serde_json::json!({
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
        "messages": msgs,
        "temperature": temperature,
    })
}

fn parse_response(resp: ApiResponse) -> RawResponse {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    RawResponse {
        text: content,
        model: resp.model,
        input_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        output_tokens: resp
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0),
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
