use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Gateway request failed: {0}")]
    Gateway(#[from] reqwest::Error),

    #[error("Gateway returned status {0}")]
    Upstream(u16),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown id: {0}")]
    UnknownId(String),
}
