use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsClientError {
    #[error("failed to connect after retries: {0}")]
    ConnectFailed(String),

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
