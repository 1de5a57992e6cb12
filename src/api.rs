//! REST API server for the ledger assistant
//!
//! Exposes the intent dispatcher over HTTP. Identity is the caller-supplied
//! `user_id`; there is no authorization model.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::dispatcher::IntentDispatcher;
use crate::models::{ConversationTurn, DispatchOutcome, DispatchRequest, UserScope};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub user_id: Option<String>,
    /// Recent turns returned by earlier calls, oldest first
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Failed request that still carries a reply payload
    pub fn failure<T: Serialize>(data: T, message: String) -> Self {
        Self {
            data: serde_json::to_value(data).ok(),
            ..Self::error(message)
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<IntentDispatcher>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "oracle": state.dispatcher.oracle_name(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let Some(user_scope) = req
        .user_id
        .as_deref()
        .and_then(|id| UserScope::parse(id).ok())
    else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("user_id is required".into())),
        );
    };

    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("message must not be empty".into())),
        );
    }

    info!(user_scope = %user_scope, history = req.history.len(), "Received chat message");

    let request = DispatchRequest {
        message: req.message,
        user_scope,
        history: req.history,
    };

    let result = state.dispatcher.handle(request).await;

    let data = serde_json::json!({
        "reply": result.reply,
        "outcome": result.outcome,
        "operation": result.turn.operation,
        "arguments": result.turn.arguments,
        "turn": result.turn,
    });

    match result.outcome {
        DispatchOutcome::Completed | DispatchOutcome::Clarification => {
            (StatusCode::OK, Json(ApiResponse::success(data)))
        }
        DispatchOutcome::Failed { retryable, .. } => {
            let status = if retryable {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            (status, Json(ApiResponse::failure(data, result.reply)))
        }
    }
}

/// =============================
/// User Endpoint
/// =============================

/// Allocates a fresh opaque scope id for a new profile.
async fn create_user(Json(req): Json<CreateUserRequest>) -> (StatusCode, Json<ApiResponse>) {
    let name = req.name.trim();
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("name must not be empty".into())),
        );
    }

    let user_id = uuid::Uuid::new_v4().to_string();
    info!(user_id = %user_id, "Created user profile");

    (
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!({
            "user_id": user_id,
            "name": name,
        }))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(dispatcher: Arc<IntentDispatcher>) -> Router {
    let state = ApiState { dispatcher };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/users", post(create_user))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    dispatcher: Arc<IntentDispatcher>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(dispatcher);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
