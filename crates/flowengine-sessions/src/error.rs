use thiserror::Error;

/// Errors that can occur during session-store operations.
///
/// `load`/`clear` never error on a missing key — absence is `Ok(None)`/
/// `Ok(())` per §4.2's contract — so this enum only carries genuine I/O or
/// data-corruption failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The stored JSON blob for a session failed to deserialize.
    #[error("stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<SessionError> for flowengine_core::error::EngineError {
    fn from(e: SessionError) -> Self {
        flowengine_core::error::EngineError::StoreFailure(e.to_string())
    }
}
