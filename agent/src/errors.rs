//! Error types for the Shipwright agent

use thiserror::Error;

/// Main error type for the Shipwright agent
#[derive(Error, Debug)]
pub enum ShipwrightError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Verification error: {0}")]
    VerifyError(String),

    #[error("Monitor error: {0}")]
    MonitorError(String),

    #[error("Notification error: {0}")]
    NotifyError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ShipwrightError {
    fn from(err: anyhow::Error) -> Self {
        ShipwrightError::Internal(err.to_string())
    }
}
