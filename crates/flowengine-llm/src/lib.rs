//! Uniform LLM client contract used by every LLM-assisted component
//! (pathway selector, variable extractor, loop evaluator, response
//! generation) so none of them needs to know which provider is behind it.

pub mod anthropic;
pub mod client;
pub mod error;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod provider;
pub mod select;

pub use client::{ChatMessage, ChatRole, LlmClient, LlmResult};
pub use error::ProviderError;
pub use select::build_client;
