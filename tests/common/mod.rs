// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use async_trait::async_trait;
use ledger_assistant::config::{ExchangeConfig, StorageConfig};
use ledger_assistant::error::AssistantError;
use ledger_assistant::exchange::{
    Conversion, ConversionRequest, CurrencyInfo, ExchangeRateGateway, HttpExchangeRateGateway,
};
use ledger_assistant::ledger::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore};
use ledger_assistant::oracle::{IntentOracle, OracleDecision, OracleRequest};
use ledger_assistant::retry::RetryPolicy;
use ledger_assistant::{IntentDispatcher, Result, UserScope};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn scope(name: &str) -> UserScope {
    UserScope::parse(name).unwrap()
}

pub fn invoke(operation: &str, arguments: Value) -> OracleDecision {
    let arguments: Map<String, Value> = arguments.as_object().cloned().unwrap_or_default();
    OracleDecision::Invoke {
        operation: operation.to_string(),
        arguments,
    }
}

/// Plays back decisions in order, one per request
pub struct ScriptedOracle {
    script: Mutex<VecDeque<OracleDecision>>,
    pub calls: AtomicU32,
}

impl ScriptedOracle {
    pub fn new(script: Vec<OracleDecision>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl IntentOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn classify(&self, _request: &OracleRequest<'_>) -> Result<OracleDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| OracleDecision::NoOperation("nothing scripted".into())))
    }
}

/// Always produces output that can't be interpreted
pub struct MalformedOracle;

#[async_trait]
impl IntentOracle for MalformedOracle {
    fn name(&self) -> &'static str {
        "malformed"
    }

    async fn classify(&self, _request: &OracleRequest<'_>) -> Result<OracleDecision> {
        Err(AssistantError::Oracle("functionCall args are not an object".into()))
    }
}

/// Never answers within any reasonable timeout
pub struct StalledOracle {
    pub calls: AtomicU32,
}

impl StalledOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl IntentOracle for StalledOracle {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn classify(&self, _request: &OracleRequest<'_>) -> Result<OracleDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(OracleDecision::NoOperation("too late".into()))
    }
}

/// Fixed-rate gateway
pub struct StubGateway {
    pub rate: Decimal,
}

#[async_trait]
impl ExchangeRateGateway for StubGateway {
    async fn convert(&self, request: &ConversionRequest) -> Result<Conversion> {
        Ok(Conversion {
            base: request.base.clone(),
            quote: request.quote.clone(),
            rate: self.rate,
            amount: request.amount,
            converted: request.amount.map(|a| a * self.rate),
            date: None,
        })
    }

    async fn list_currencies(&self) -> Result<Vec<CurrencyInfo>> {
        Ok(["EUR", "USD"]
            .iter()
            .map(|code| CurrencyInfo {
                code: code.to_string(),
                description: String::new(),
            })
            .collect())
    }
}

/// Accepts connections and never answers
pub async fn spawn_silent_provider() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// Real HTTP gateway pointed at a provider that never responds
pub async fn stalled_http_gateway(timeout: Duration) -> Arc<HttpExchangeRateGateway> {
    let gateway = HttpExchangeRateGateway::new(&ExchangeConfig {
        base_url: spawn_silent_provider().await,
        access_key: None,
        policy: RetryPolicy::new(timeout, 1),
    })
    .unwrap();
    Arc::new(gateway)
}

/// Helper to create a SQLite-backed store in a temporary directory
pub async fn temp_sqlite_store() -> (Arc<SqliteLedgerStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", temp_dir.path().join("ledger.db").display());
    let store = SqliteLedgerStore::connect(&url, &StorageConfig::default())
        .await
        .unwrap();
    (Arc::new(store), temp_dir)
}

pub fn memory_store() -> Arc<InMemoryLedgerStore> {
    Arc::new(InMemoryLedgerStore::new())
}

pub fn dispatcher(
    oracle: Arc<dyn IntentOracle>,
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn ExchangeRateGateway>,
) -> IntentDispatcher {
    IntentDispatcher::new(
        oracle,
        ledger,
        gateway,
        RetryPolicy::new(Duration::from_millis(200), 1),
    )
}
