/// Errors produced by the Telegram adapter.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("teloxide error: {0}")]
    Teloxide(#[from] teloxide::RequestError),

    #[error("no bot token configured")]
    NoToken,

    #[error("conversation store error: {0}")]
    Store(String),

    #[error("upstream socket error: {0}")]
    Upstream(#[from] flowengine_wsclient::error::WsClientError),
}
