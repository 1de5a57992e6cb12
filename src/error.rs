//! Error types for the ledger assistant

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("Invalid currency pair: {0}")]
    InvalidCurrencyPair(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Transport-agnostic failure classes.
/// The HTTP layer maps these onto status codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Storage,
    RateUnavailable,
    InvalidCurrencyPair,
    Oracle,
    Config,
    Internal,
}

impl AssistantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssistantError::Validation(_) | AssistantError::UnknownOperation(_) => {
                ErrorKind::Validation
            }
            AssistantError::Storage(_) => ErrorKind::Storage,
            AssistantError::RateUnavailable(_) => ErrorKind::RateUnavailable,
            AssistantError::InvalidCurrencyPair(_) => ErrorKind::InvalidCurrencyPair,
            AssistantError::Oracle(_) | AssistantError::OracleUnavailable(_) => ErrorKind::Oracle,
            AssistantError::Config(_) => ErrorKind::Config,
            AssistantError::SerializationError(_)
            | AssistantError::HttpError(_)
            | AssistantError::IoError(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistantError::Storage(_)
                | AssistantError::RateUnavailable(_)
                | AssistantError::OracleUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for AssistantError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => {
                AssistantError::Storage("timed out waiting for a pooled connection".to_string())
            }
            other => AssistantError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AssistantError::Storage("disk".into()).is_retryable());
        assert!(AssistantError::RateUnavailable("timeout".into()).is_retryable());
        assert!(AssistantError::OracleUnavailable("timeout".into()).is_retryable());
        assert!(!AssistantError::Validation("amount".into()).is_retryable());
        assert!(!AssistantError::InvalidCurrencyPair("XXX".into()).is_retryable());
        assert!(!AssistantError::Oracle("garbage".into()).is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_storage() {
        let err: AssistantError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.is_retryable());
    }
}
