//! Intent oracle
//!
//! The language-model boundary: maps free text to either a direct answer or
//! a proposed call of one catalog operation. Proposals are untrusted until
//! the dispatcher validates them against the catalog.

use crate::config::OracleConfig;
use crate::models::ConversationTurn;
use crate::operations::OperationCatalog;
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

pub mod gemini;
pub mod keyword;

pub use gemini::{GeminiClient, GeminiOracle};
pub use keyword::KeywordOracle;

pub struct OracleRequest<'a> {
    pub user_text: &'a str,
    pub catalog: &'a OperationCatalog,
    /// Caller-supplied recent turns, oldest first
    pub history: &'a [ConversationTurn],
    /// Lets the model resolve "this month" and similar phrases
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleDecision {
    NoOperation(String),
    Invoke {
        operation: String,
        arguments: Map<String, Value>,
    },
}

/// Trait for intent classification (LLM controlled)
#[async_trait]
pub trait IntentOracle: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, request: &OracleRequest<'_>) -> Result<OracleDecision>;
}

/// Gemini when an API key is configured, keyword routing otherwise.
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn IntentOracle>> {
    match &config.api_key {
        Some(key) => {
            let client = GeminiClient::new(key.clone(), &config.base_url, &config.model)?;
            info!(model = %config.model, "Intent oracle: gemini");
            Ok(Arc::new(GeminiOracle::new(client)))
        }
        None => {
            info!("Intent oracle: keyword (GEMINI_API_KEY not set)");
            Ok(Arc::new(KeywordOracle::new()))
        }
    }
}
