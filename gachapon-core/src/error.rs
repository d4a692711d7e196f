use thiserror::Error;

pub type Result<T> = std::result::Result<T, GachaponError>;

#[derive(Error, Debug)]
pub enum GachaponError {
    #[error("Validation error: {0}")]
    Validation(String),

    // Bad signature and expired replay window render identically on purpose.
    #[error("Authentication failed")]
    Authentication,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Prize supply exhausted")]
    SupplyExhausted,

    // Never reveals whether the key, the framing or the ciphertext was bad.
    #[error("Unable to decrypt shipping data")]
    Decryption,

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Play not found for signature: {0}")]
    PlayNotFound(String),

    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GachaponError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors an at-least-once event source should redeliver.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PlayNotFound(_) | Self::ExternalService(_) | Self::Timeout(_)
        )
    }
}
