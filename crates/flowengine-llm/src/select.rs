//! Provider selection at startup (§9: "providers are tagged-variant
//! constructors selected at startup from configuration").

use std::sync::Arc;

use flowengine_core::config::EngineConfig;
use flowengine_core::error::{EngineError, Result};

use crate::anthropic::AnthropicProvider;
use crate::client::{LlmClient, ProviderClient};
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Build the configured [`LlmClient`] from `[llm]` config. The `provider`
/// field names which `Option` slot must be populated.
pub fn build_client(config: &EngineConfig) -> Result<Arc<dyn LlmClient>> {
    match config.llm.provider.as_str() {
        "anthropic" => {
            let cfg = config.llm.anthropic.as_ref().ok_or_else(|| {
                EngineError::Config("llm.provider=anthropic requires [llm.anthropic]".into())
            })?;
            Ok(Arc::new(ProviderClient::new(AnthropicProvider::new(
                cfg.api_key.clone(),
                cfg.base_url.clone(),
                cfg.model.clone(),
            ))))
        }
        "openai" => {
            let cfg = config.llm.openai.as_ref().ok_or_else(|| {
                EngineError::Config("llm.provider=openai requires [llm.openai]".into())
            })?;
            Ok(Arc::new(ProviderClient::new(OpenAiProvider::new(
                cfg.api_key.clone(),
                cfg.base_url.clone(),
                cfg.model.clone(),
            ))))
        }
        "ollama" => Ok(Arc::new(ProviderClient::new(OllamaProvider::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
        )))),
        other => Err(EngineError::Config(format!(
            "unknown llm.provider: {other}"
        ))),
    }
}
