use thiserror::Error;

/// Transport/provider-level failures. Never crosses the [`crate::LlmClient`]
/// contract directly — [`crate::client::LlmClient::chat`] always catches
/// these and folds them into a `success=false` [`crate::LlmResult`] (§4.1:
/// "no exception crosses the contract").
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response body: {0}")]
    Malformed(String),
}
