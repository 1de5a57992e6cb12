//! Environment-driven configuration
//!
//! Read once at startup (after `dotenv`) and passed down explicitly.

use crate::error::AssistantError;
use crate::retry::RetryPolicy;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EXCHANGE_BASE_URL: &str = "https://api.exchangerate.host";

#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// `None` selects the offline keyword oracle
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub access_key: Option<String>,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `None` selects the in-memory ledger
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub operation_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(3),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub exchange: ExchangeConfig,
    pub storage: StorageConfig,
    /// Currency label used when rendering ledger amounts
    pub display_currency: String,
    /// Most recent caller-supplied turns forwarded to the oracle
    pub history_limit: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let oracle = OracleConfig {
            api_key: non_empty_var("GEMINI_API_KEY")
                .filter(|key| key != "your_gemini_api_key_here"),
            model: non_empty_var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: non_empty_var("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            policy: RetryPolicy::new(
                Duration::from_secs(parse_var("ORACLE_TIMEOUT_SECS", 20)?),
                parse_var("ORACLE_MAX_RETRIES", 1)?,
            ),
        };

        let exchange = ExchangeConfig {
            base_url: non_empty_var("EXCHANGE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_EXCHANGE_BASE_URL.to_string()),
            access_key: non_empty_var("EXCHANGE_API_KEY"),
            policy: RetryPolicy::new(
                Duration::from_secs(parse_var("EXCHANGE_TIMEOUT_SECS", 10)?),
                parse_var("EXCHANGE_MAX_RETRIES", 1)?,
            ),
        };

        let storage = StorageConfig {
            database_url: non_empty_var("DATABASE_URL"),
            max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            acquire_timeout: Duration::from_secs(parse_var("DB_ACQUIRE_TIMEOUT_SECS", 3)?),
            operation_timeout: Duration::from_secs(parse_var("DB_OPERATION_TIMEOUT_SECS", 5)?),
        };

        if storage.max_connections == 0 {
            return Err(AssistantError::Config(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        let port = match non_empty_var("PORT").or_else(|| non_empty_var("API_PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| AssistantError::Config(format!("invalid port: {}", raw)))?,
            None => 8080,
        };

        Ok(Self {
            oracle,
            exchange,
            storage,
            display_currency: non_empty_var("DISPLAY_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| "USD".to_string()),
            history_limit: parse_var("HISTORY_LIMIT", 6)?,
            port,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AssistantError::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default_and_invalid() {
        assert_eq!(parse_var::<u64>("LEDGER_ASSISTANT_TEST_UNSET_VAR", 7).unwrap(), 7);

        env::set_var("LEDGER_ASSISTANT_TEST_BAD_NUMBER", "seven");
        let err = parse_var::<u64>("LEDGER_ASSISTANT_TEST_BAD_NUMBER", 7).unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
        env::remove_var("LEDGER_ASSISTANT_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_blank_var_is_unset() {
        env::set_var("LEDGER_ASSISTANT_TEST_BLANK", "   ");
        assert!(non_empty_var("LEDGER_ASSISTANT_TEST_BLANK").is_none());
        env::remove_var("LEDGER_ASSISTANT_TEST_BLANK");
    }
}
