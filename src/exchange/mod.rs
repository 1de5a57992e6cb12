//! Exchange-rate gateway
//!
//! Point-in-time conversion rates from an exchangerate.host-compatible API.
//! Rates are never cached or persisted; the converted amount is computed
//! locally so the figure in a reply always comes from our own arithmetic.

use crate::config::ExchangeConfig;
use crate::error::AssistantError;
use crate::models::decimal_from_json;
use crate::retry::RetryPolicy;
use crate::Result;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionRequest {
    pub base: String,
    pub quote: String,
    pub amount: Option<Decimal>,
    /// Historical rate for this day; latest when `None`
    pub on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversion {
    pub base: String,
    pub quote: String,
    pub rate: Decimal,
    pub amount: Option<Decimal>,
    pub converted: Option<Decimal>,
    /// Rate date reported by the provider
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrencyInfo {
    pub code: String,
    pub description: String,
}

/// Trait for rate providers
#[async_trait::async_trait]
pub trait ExchangeRateGateway: Send + Sync {
    async fn convert(&self, request: &ConversionRequest) -> Result<Conversion>;

    /// Currencies the provider can quote, sorted by code
    async fn list_currencies(&self) -> Result<Vec<CurrencyInfo>>;
}

/// Three ASCII letters, upper-cased. Anything else is an unsupported code.
pub fn normalize_currency(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(AssistantError::InvalidCurrencyPair(format!(
            "'{}' is not a currency code",
            code
        )))
    }
}

/// HTTP-backed gateway (connection-pooled client with a request timeout)
pub struct HttpExchangeRateGateway {
    client: Client,
    base_url: String,
    access_key: Option<String>,
    policy: RetryPolicy,
}

impl HttpExchangeRateGateway {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(config.policy.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            policy: config.policy,
        })
    }

    /// GET `{base}{path}` and decode the JSON body. Transport failures,
    /// throttling and 5xx are `RateUnavailable`; the caller classifies the rest.
    async fn get_json(&self, path: &str, mut params: Vec<(&str, String)>) -> Result<(StatusCode, Value)> {
        let url = format!("{}{}", self.base_url, path);
        if let Some(key) = &self.access_key {
            params.push(("access_key", key.clone()));
        }

        // The access key travels in the query string; errors must not echo the URL.
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                warn!(path, error = %e, "Exchange rate request failed");
                AssistantError::RateUnavailable(if e.is_timeout() {
                    "exchange rate provider timed out".to_string()
                } else {
                    format!("exchange rate provider unreachable: {}", e)
                })
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AssistantError::RateUnavailable(format!(
                "exchange rate provider returned {}",
                status
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AssistantError::RateUnavailable(format!(
                "malformed exchange rate response: {}",
                e.without_url()
            ))
        })?;

        Ok((status, body))
    }

    async fn fetch_rate(
        &self,
        base: &str,
        quote: &str,
        on: Option<NaiveDate>,
    ) -> Result<(Decimal, Option<String>)> {
        let mut params = vec![
            ("from", base.to_string()),
            ("to", quote.to_string()),
            ("amount", "1".to_string()),
        ];
        if let Some(day) = on {
            params.push(("date", day.format("%Y-%m-%d").to_string()));
        }

        let (status, body) = self.get_json("/convert", params).await?;

        if !status.is_success() || body.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(classify_provider_error(status, &body, base, quote));
        }

        let rate = body
            .get("result")
            .and_then(decimal_from_json)
            .or_else(|| body.pointer("/info/rate").and_then(decimal_from_json))
            .or_else(|| body.pointer("/info/quote").and_then(decimal_from_json))
            .ok_or_else(|| {
                AssistantError::RateUnavailable("exchange rate missing from response".to_string())
            })?;

        let date = body
            .get("date")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        Ok((rate, date))
    }

    async fn fetch_symbols(&self) -> Result<Vec<CurrencyInfo>> {
        let (status, body) = self.get_json("/symbols", Vec::new()).await?;

        if !status.is_success() || body.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(AssistantError::RateUnavailable(format!(
                "currency list unavailable ({})",
                status
            )));
        }

        let symbols = body
            .get("symbols")
            .or_else(|| body.get("currencies"))
            .and_then(Value::as_object)
            .ok_or_else(|| {
                AssistantError::RateUnavailable("currency list missing from response".to_string())
            })?;

        Ok(parse_symbols(symbols))
    }
}

/// Accepts both `{"USD": {"description": ..}}` and `{"USD": "United States Dollar"}`.
/// Entries whose key is not a currency code are skipped.
fn parse_symbols(symbols: &Map<String, Value>) -> Vec<CurrencyInfo> {
    let mut currencies: Vec<CurrencyInfo> = symbols
        .iter()
        .filter_map(|(code, info)| {
            let code = normalize_currency(code).ok()?;
            let description = match info {
                Value::String(name) => name.clone(),
                other => other
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
            Some(CurrencyInfo { code, description })
        })
        .collect();

    currencies.sort_by(|a, b| a.code.cmp(&b.code));
    currencies
}

fn classify_provider_error(status: StatusCode, body: &Value, base: &str, quote: &str) -> AssistantError {
    let detail = body
        .get("error")
        .map(|e| e.to_string())
        .unwrap_or_else(|| body.to_string())
        .to_lowercase();

    let bad_request = matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY
    );

    if detail.contains("currency") || detail.contains("symbol") || bad_request {
        AssistantError::InvalidCurrencyPair(format!("{}/{} is not supported", base, quote))
    } else {
        AssistantError::RateUnavailable(format!("exchange rate provider error: {}", detail))
    }
}

#[async_trait::async_trait]
impl ExchangeRateGateway for HttpExchangeRateGateway {
    async fn convert(&self, request: &ConversionRequest) -> Result<Conversion> {
        let base = normalize_currency(&request.base)?;
        let quote = normalize_currency(&request.quote)?;

        let (rate, date) = if base == quote {
            (Decimal::ONE, request.on.map(|d| d.to_string()))
        } else {
            self.policy
                .run("exchange_rate", AssistantError::RateUnavailable, || {
                    self.fetch_rate(&base, &quote, request.on)
                })
                .await?
        };

        info!(base = %base, quote = %quote, rate = %rate, "Exchange rate retrieved");

        let converted = request
            .amount
            .map(|amount| {
                amount.checked_mul(rate).ok_or_else(|| {
                    AssistantError::Validation("amount too large to convert".to_string())
                })
            })
            .transpose()?;

        Ok(Conversion {
            converted,
            amount: request.amount,
            base,
            quote,
            rate,
            date,
        })
    }

    async fn list_currencies(&self) -> Result<Vec<CurrencyInfo>> {
        let currencies = self
            .policy
            .run("currency_list", AssistantError::RateUnavailable, || {
                self.fetch_symbols()
            })
            .await?;

        info!(count = currencies.len(), "Currency list retrieved");
        Ok(currencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;

    async fn fake_convert(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        match params.get("to").map(String::as_str) {
            Some("EUR") => (
                StatusCode::OK,
                Json(json!({ "success": true, "result": 0.92, "date": "2024-05-01" })),
            ),
            Some("ETB") => (
                StatusCode::OK,
                Json(json!({ "success": true, "result": 57.5, "date": "2024-05-01" })),
            ),
            Some("XXX") => (
                StatusCode::OK,
                Json(json!({ "success": false, "error": { "type": "invalid_to_currency" } })),
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" }))),
        }
    }

    async fn fake_symbols() -> Json<Value> {
        Json(json!({
            "success": true,
            "symbols": {
                "USD": { "description": "United States Dollar", "code": "USD" },
                "ETB": { "description": "Ethiopian Birr", "code": "ETB" },
                "EUR": { "description": "Euro", "code": "EUR" },
                "bogus-key": { "description": "ignored" }
            }
        }))
    }

    async fn spawn_provider() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new()
            .route("/convert", get(fake_convert))
            .route("/symbols", get(fake_symbols));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Accepts connections and never answers
    async fn spawn_silent_provider() -> String {
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

    fn gateway(base_url: String, timeout: Duration) -> HttpExchangeRateGateway {
        HttpExchangeRateGateway::new(&ExchangeConfig {
            base_url,
            access_key: None,
            policy: RetryPolicy::new(timeout, 1),
        })
        .unwrap()
    }

    fn request(base: &str, quote: &str, amount: Option<Decimal>) -> ConversionRequest {
        ConversionRequest {
            base: base.to_string(),
            quote: quote.to_string(),
            amount,
            on: None,
        }
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(" usd ").unwrap(), "USD");
        assert!(matches!(
            normalize_currency("US"),
            Err(AssistantError::InvalidCurrencyPair(_))
        ));
        assert!(normalize_currency("12A").is_err());
    }

    #[tokio::test]
    async fn test_convert_computes_amount_locally() {
        let gw = gateway(spawn_provider().await, Duration::from_secs(5));
        let conversion = gw
            .convert(&request("usd", "eur", Some(dec!(100))))
            .await
            .unwrap();

        assert_eq!(conversion.base, "USD");
        assert_eq!(conversion.rate, dec!(0.92));
        assert_eq!(conversion.converted, Some(dec!(92.00)));
        assert_eq!(conversion.date.as_deref(), Some("2024-05-01"));
    }

    #[tokio::test]
    async fn test_unsupported_currency_is_not_retryable() {
        let gw = gateway(spawn_provider().await, Duration::from_secs(5));
        let err = gw.convert(&request("USD", "XXX", None)).await.unwrap_err();
        assert!(matches!(err, AssistantError::InvalidCurrencyPair(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_provider_failure_is_rate_unavailable() {
        let gw = gateway(spawn_provider().await, Duration::from_secs(5));
        let err = gw.convert(&request("USD", "GBP", None)).await.unwrap_err();
        assert!(matches!(err, AssistantError::RateUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_rate_unavailable() {
        let gw = gateway(spawn_silent_provider().await, Duration::from_millis(100));
        let err = gw.convert(&request("USD", "EUR", Some(dec!(5)))).await.unwrap_err();
        assert!(matches!(err, AssistantError::RateUnavailable(_)));
    }

    #[tokio::test]
    async fn test_conversion_overflow_is_validation_error() {
        let gw = gateway(spawn_provider().await, Duration::from_secs(5));
        let err = gw
            .convert(&request("USD", "ETB", Some(dec!(10000000000000000000000000000))))
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Validation(_)));
        assert!(!err.is_retryable());

        let ok = gw.convert(&request("USD", "ETB", Some(dec!(2)))).await.unwrap();
        assert_eq!(ok.converted, Some(dec!(115.0)));
    }

    #[tokio::test]
    async fn test_list_currencies_sorted_by_code() {
        let gw = gateway(spawn_provider().await, Duration::from_secs(5));
        let currencies = gw.list_currencies().await.unwrap();

        let codes: Vec<&str> = currencies.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["ETB", "EUR", "USD"]);
        assert_eq!(currencies[0].description, "Ethiopian Birr");
    }

    #[test]
    fn test_parse_symbols_accepts_plain_names() {
        let body = json!({ "gbp": "British Pound", "JPY": "Japanese Yen" });
        let currencies = parse_symbols(body.as_object().unwrap());
        assert_eq!(
            currencies,
            vec![
                CurrencyInfo { code: "GBP".into(), description: "British Pound".into() },
                CurrencyInfo { code: "JPY".into(), description: "Japanese Yen".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_currencies_failures_are_rate_unavailable() {
        let silent = gateway(spawn_silent_provider().await, Duration::from_millis(100));
        let err = silent.list_currencies().await.unwrap_err();
        assert!(matches!(err, AssistantError::RateUnavailable(_)));
        assert!(err.is_retryable());

        // A provider without the endpoint answers 404.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let router = Router::new().route("/convert", get(fake_convert));
            axum::serve(listener, router).await.unwrap();
        });
        let gw = gateway(format!("http://{}", addr), Duration::from_secs(5));
        assert!(matches!(
            gw.list_currencies().await,
            Err(AssistantError::RateUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_access_key() {
        let gw = HttpExchangeRateGateway::new(&ExchangeConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            access_key: Some("sekret-key".to_string()),
            policy: RetryPolicy::new(Duration::from_secs(2), 0),
        })
        .unwrap();

        let err = gw.convert(&request("USD", "EUR", None)).await.unwrap_err();
        assert!(!err.to_string().contains("sekret-key"), "{}", err);
    }

    #[tokio::test]
    async fn test_same_currency_needs_no_call() {
        let gw = gateway("http://127.0.0.1:9".to_string(), Duration::from_millis(100));
        let conversion = gw
            .convert(&request("EUR", "eur", Some(dec!(12.34))))
            .await
            .unwrap();
        assert_eq!(conversion.rate, Decimal::ONE);
        assert_eq!(conversion.converted, Some(dec!(12.34)));
    }
}
