//! Intent dispatcher - one pass per request
//!
//! RECEIVE → CLASSIFY → VALIDATE → EXECUTE → RENDER → RESPOND
//!
//! The oracle only proposes. Nothing runs until the proposal has been
//! validated into a typed [`Invocation`], and every failure becomes a reply.

use crate::config::AppConfig;
use crate::error::AssistantError;
use crate::exchange::{ConversionRequest, ExchangeRateGateway, HttpExchangeRateGateway};
use crate::ledger::{build_ledger_store, LedgerStore};
use crate::models::{ConversationTurn, DispatchOutcome, DispatchReply, DispatchRequest, UserScope};
use crate::operations::{FinancialOperations, Invocation, OperationCatalog, OperationResult};
use crate::oracle::{build_oracle, IntentOracle, OracleDecision, OracleRequest};
use crate::retry::RetryPolicy;
use crate::Result;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub mod render;

use render::{render_failure, render_result, EMPTY_MESSAGE_REPLY, NOT_UNDERSTOOD_REPLY};

pub const DEFAULT_HISTORY_LIMIT: usize = 6;

pub struct IntentDispatcher {
    oracle: Arc<dyn IntentOracle>,
    catalog: OperationCatalog,
    operations: FinancialOperations,
    gateway: Arc<dyn ExchangeRateGateway>,
    oracle_policy: RetryPolicy,
    history_limit: usize,
    display_currency: String,
}

impl IntentDispatcher {
    pub fn new(
        oracle: Arc<dyn IntentOracle>,
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn ExchangeRateGateway>,
        oracle_policy: RetryPolicy,
    ) -> Self {
        Self {
            oracle,
            catalog: OperationCatalog::standard(),
            operations: FinancialOperations::new(ledger),
            gateway,
            oracle_policy,
            history_limit: DEFAULT_HISTORY_LIMIT,
            display_currency: "USD".to_string(),
        }
    }

    /// Wire up every collaborator from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let ledger = build_ledger_store(&config.storage).await?;
        let oracle = build_oracle(&config.oracle)?;
        let gateway = Arc::new(HttpExchangeRateGateway::new(&config.exchange)?);

        Ok(Self::new(oracle, ledger, gateway, config.oracle.policy)
            .with_history_limit(config.history_limit)
            .with_display_currency(&config.display_currency))
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_display_currency(mut self, currency: &str) -> Self {
        self.display_currency = currency.to_string();
        self
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    /// Handle one message. Never fails: errors are folded into the reply.
    pub async fn handle(&self, request: DispatchRequest) -> DispatchReply {
        let start = Instant::now();
        let message = request.message.trim();

        // ===== Receive =====
        if message.is_empty() {
            return reply(message, None, None, EMPTY_MESSAGE_REPLY.to_string(), DispatchOutcome::Clarification);
        }

        let skip = request.history.len().saturating_sub(self.history_limit);
        let oracle_request = OracleRequest {
            user_text: message,
            catalog: &self.catalog,
            history: &request.history[skip..],
            today: Utc::now().date_naive(),
        };

        // ===== Classify =====
        let decision = self
            .oracle_policy
            .run("intent_oracle", AssistantError::OracleUnavailable, || {
                self.oracle.classify(&oracle_request)
            })
            .await;

        let (operation, arguments) = match decision {
            Ok(OracleDecision::NoOperation(text)) => {
                debug!(user_scope = %request.user_scope, "Oracle answered without an operation");
                return reply(message, None, None, text, DispatchOutcome::Completed);
            }
            Ok(OracleDecision::Invoke { operation, arguments }) => (operation, arguments),
            Err(AssistantError::Oracle(detail)) => {
                warn!(oracle = self.oracle.name(), detail = %detail, "Malformed oracle output");
                return reply(
                    message,
                    None,
                    None,
                    NOT_UNDERSTOOD_REPLY.to_string(),
                    DispatchOutcome::Clarification,
                );
            }
            Err(e) => {
                warn!(oracle = self.oracle.name(), error = %e, "Intent oracle failed");
                return failure(message, None, None, &e);
            }
        };

        // ===== Validate =====
        let invocation = match self.catalog.validate(&operation, &arguments) {
            Ok(invocation) => invocation,
            Err(e) => {
                info!(
                    user_scope = %request.user_scope,
                    operation = %operation,
                    error = %e,
                    "Rejected oracle proposal"
                );
                return reply(
                    message,
                    Some(operation),
                    None,
                    render_failure(&e),
                    DispatchOutcome::Clarification,
                );
            }
        };

        info!(
            user_scope = %request.user_scope,
            operation = invocation.name(),
            "Dispatching operation"
        );

        // ===== Execute + Render =====
        let name = invocation.name().to_string();
        let canonical = invocation.arguments();

        match self.execute(&request.user_scope, invocation).await {
            Ok(result) => {
                debug!(
                    operation = %name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Operation completed"
                );
                let text = render_result(&result, &self.display_currency);
                reply(message, Some(name), Some(canonical), text, DispatchOutcome::Completed)
            }
            Err(e) => {
                if matches!(e, AssistantError::Storage(_)) {
                    error!(user_scope = %request.user_scope, operation = %name, error = %e, "Ledger operation failed");
                } else {
                    warn!(user_scope = %request.user_scope, operation = %name, error = %e, "Operation failed");
                }
                failure(message, Some(name), Some(canonical), &e)
            }
        }
    }

    async fn execute(&self, scope: &UserScope, invocation: Invocation) -> Result<OperationResult> {
        let ops = &self.operations;

        let result = match invocation {
            Invocation::RecordExpense { amount, category } => {
                OperationResult::Recorded(ops.record_expense(scope, amount, &category).await?)
            }
            Invocation::RecordIncome { amount, category } => {
                OperationResult::Recorded(ops.record_income(scope, amount, &category).await?)
            }
            Invocation::MonthlySummary { year, month } => {
                OperationResult::Summary(ops.monthly_summary(scope, year, month).await?)
            }
            Invocation::GetBalance { as_of } => {
                OperationResult::Balance(ops.get_balance(scope, as_of).await?)
            }
            Invocation::RecentEntries { kind, limit } => OperationResult::Entries {
                kind,
                entries: ops.recent_entries(scope, kind, limit).await?,
            },
            Invocation::ConvertCurrency { base, quote, amount, on } => {
                let conversion = self
                    .gateway
                    .convert(&ConversionRequest { base, quote, amount, on })
                    .await?;
                OperationResult::Conversion(conversion)
            }
            Invocation::ListCurrencies => {
                OperationResult::Currencies(self.gateway.list_currencies().await?)
            }
        };

        Ok(result)
    }
}

fn reply(
    message: &str,
    operation: Option<String>,
    arguments: Option<Value>,
    text: String,
    outcome: DispatchOutcome,
) -> DispatchReply {
    DispatchReply {
        turn: ConversationTurn {
            user_text: message.to_string(),
            operation,
            arguments,
            reply: text.clone(),
        },
        reply: text,
        outcome,
    }
}

fn failure(
    message: &str,
    operation: Option<String>,
    arguments: Option<Value>,
    error: &AssistantError,
) -> DispatchReply {
    let outcome = DispatchOutcome::Failed {
        kind: error.kind(),
        retryable: error.is_retryable(),
    };
    reply(message, operation, arguments, render_failure(error), outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Conversion, CurrencyInfo};
    use crate::ledger::InMemoryLedgerStore;
    use crate::models::EntryFilter;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns a fixed decision and remembers how much history it saw
    struct FixedOracle {
        decision: OracleDecision,
        seen_history: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl IntentOracle for FixedOracle {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn classify(&self, request: &OracleRequest<'_>) -> Result<OracleDecision> {
            self.seen_history.lock().unwrap().push(request.history.len());
            Ok(self.decision.clone())
        }
    }

    struct NoGateway;

    #[async_trait]
    impl ExchangeRateGateway for NoGateway {
        async fn convert(&self, _request: &ConversionRequest) -> Result<Conversion> {
            Err(AssistantError::RateUnavailable("offline".into()))
        }

        async fn list_currencies(&self) -> Result<Vec<CurrencyInfo>> {
            Err(AssistantError::RateUnavailable("offline".into()))
        }
    }

    fn setup(decision: OracleDecision) -> (IntentDispatcher, Arc<FixedOracle>, Arc<InMemoryLedgerStore>) {
        let oracle = Arc::new(FixedOracle {
            decision,
            seen_history: Mutex::new(Vec::new()),
        });
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let dispatcher = IntentDispatcher::new(
            oracle.clone(),
            ledger.clone(),
            Arc::new(NoGateway),
            RetryPolicy::new(Duration::from_secs(1), 0),
        )
        .with_history_limit(2);
        (dispatcher, oracle, ledger)
    }

    fn scope() -> UserScope {
        UserScope::parse("alice").unwrap()
    }

    fn turn(i: usize) -> ConversationTurn {
        ConversationTurn {
            user_text: format!("message {}", i),
            operation: None,
            arguments: None,
            reply: format!("reply {}", i),
        }
    }

    #[tokio::test]
    async fn test_empty_message_skips_oracle() {
        let (dispatcher, oracle, _) = setup(OracleDecision::NoOperation("hi".into()));
        let result = dispatcher.handle(DispatchRequest::new("   ", scope())).await;

        assert_eq!(result.outcome, DispatchOutcome::Clarification);
        assert!(oracle.seen_history.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let (dispatcher, oracle, _) = setup(OracleDecision::NoOperation("ok".into()));
        let mut request = DispatchRequest::new("hello", scope());
        request.history = (0..5).map(turn).collect();

        let result = dispatcher.handle(request).await;
        assert_eq!(result.outcome, DispatchOutcome::Completed);
        assert_eq!(result.reply, "ok");
        assert_eq!(*oracle.seen_history.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_scope_comes_from_request_not_arguments() {
        let mut arguments = Map::new();
        arguments.insert("amount".into(), json!(42));
        arguments.insert("category".into(), json!("books"));
        arguments.insert("user_id".into(), json!("mallory"));

        let (dispatcher, _, ledger) = setup(OracleDecision::Invoke {
            operation: "record_expense".into(),
            arguments,
        });
        let result = dispatcher.handle(DispatchRequest::new("bought books", scope())).await;
        assert_eq!(result.outcome, DispatchOutcome::Completed);
        assert_eq!(result.turn.operation.as_deref(), Some("record_expense"));

        let mine = ledger.query(&scope(), &EntryFilter::default()).await.unwrap();
        assert_eq!(mine.len(), 1);
        let theirs = ledger
            .query(&UserScope::parse("mallory").unwrap(), &EntryFilter::default())
            .await
            .unwrap();
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_is_retryable_failure() {
        let mut arguments = Map::new();
        arguments.insert("base".into(), json!("USD"));
        arguments.insert("quote".into(), json!("EUR"));

        let (dispatcher, _, _) = setup(OracleDecision::Invoke {
            operation: "convert_currency".into(),
            arguments,
        });
        let result = dispatcher.handle(DispatchRequest::new("usd to eur", scope())).await;
        assert_eq!(
            result.outcome,
            DispatchOutcome::Failed {
                kind: crate::error::ErrorKind::RateUnavailable,
                retryable: true
            }
        );
    }
}
