/// Shared error type used across all wayfarer crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already saved: {0}")]
    SessionAlreadySaved(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tool loop limit reached after {0} model calls")]
    ToolLoopLimit(usize),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
