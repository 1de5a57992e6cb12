//! Gemini-backed intent oracle
//!
//! Uses Gemini function calling: the operation catalog is sent as
//! `functionDeclarations` and a `functionCall` part in the answer becomes
//! an `Invoke` decision. Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AssistantError;
use crate::oracle::{IntentOracle, OracleDecision, OracleRequest};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!(
                "{}/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
        })
    }

    /// Raw `generateContent` call; the caller interprets the body.
    async fn generate_content(&self, request: &GeminiRequest) -> Result<Value> {
        if self.api_key.is_empty() {
            return Err(AssistantError::Config("GEMINI_API_KEY not configured".to_string()));
        }

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                AssistantError::OracleUnavailable(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AssistantError::OracleUnavailable(format!("Gemini API returned {}", status))
            } else {
                AssistantError::Oracle(format!("Gemini API returned {}: {}", status, error_text))
            });
        }

        response.json::<Value>().await.map_err(|e| {
            let e = e.without_url();
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::Oracle(format!("Gemini parse error: {}", e))
        })
    }
}

pub struct GeminiOracle {
    client: GeminiClient,
}

impl GeminiOracle {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    fn build_request(request: &OracleRequest<'_>) -> GeminiRequest {
        let mut contents = Vec::with_capacity(request.history.len() * 2 + 1);
        for turn in request.history {
            contents.push(Content::text("user", &turn.user_text));
            contents.push(Content::text("model", &turn.reply));
        }
        contents.push(Content::text("user", request.user_text));

        GeminiRequest {
            contents,
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: build_system_prompt(request),
                }],
            },
            tools: vec![Tool {
                function_declarations: request.catalog.function_declarations(),
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: 512,
            },
        }
    }
}

#[async_trait]
impl IntentOracle for GeminiOracle {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn classify(&self, request: &OracleRequest<'_>) -> Result<OracleDecision> {
        let body = Self::build_request(request);
        let response = self.client.generate_content(&body).await?;
        let decision = parse_decision(&response)?;

        debug!(decision = ?decision, "Gemini decision");
        Ok(decision)
    }
}

fn build_system_prompt(request: &OracleRequest<'_>) -> String {
    format!(
        r#"You are a personal finance assistant that keeps the user's income and expense ledger.
Today is {}.

Guidelines:
- When the user wants to record, summarize, list, check a balance or convert currency, call exactly ONE of the available functions
- Use the amounts, categories and dates the user actually gave; resolve "this month" or "last month" from today's date
- Never state amounts, totals, balances or exchange rates yourself; the application reports them
- Never include a user id; the application knows who the user is
- If the request is unclear or unrelated to personal finances, reply briefly in plain text

Available functions:
- {}"#,
        request.today,
        request.catalog.describe()
    )
}

/// Interpret a `generateContent` body. Anything that doesn't fit the
/// expected shape is an `Oracle` error, never a panic.
pub fn parse_decision(response: &Value) -> Result<OracleDecision> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| AssistantError::Oracle("No candidate content in Gemini response".to_string()))?;

    if let Some(call) = parts.iter().find_map(|p| p.get("functionCall")) {
        let operation = call
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AssistantError::Oracle("functionCall without a name".to_string()))?
            .to_string();

        let arguments = match call.get("args") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                _ => {
                    return Err(AssistantError::Oracle(format!(
                        "functionCall args are not an object: {}",
                        raw
                    )))
                }
            },
            Some(other) => {
                return Err(AssistantError::Oracle(format!(
                    "functionCall args are not an object: {}",
                    other
                )))
            }
        };

        return Ok(OracleDecision::Invoke { operation, arguments });
    }

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(AssistantError::Oracle("Empty response from Gemini".to_string()));
    }

    Ok(OracleDecision::NoOperation(text))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}
