use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    /// Agent, directory or queue could not be reached, or the call timed out.
    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A compare-and-swap lost against a concurrent writer.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Partial failure: {failed} of {total} nodes failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for FleetError {
    fn from(e: redis::RedisError) -> Self {
        FleetError::Unreachable(format!("directory: {}", e))
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(reqwest::StatusCode::NOT_FOUND) => FleetError::NotFound(e.to_string()),
            _ => FleetError::Unreachable(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
