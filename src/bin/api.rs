use ledger_assistant::{api::start_server, AppConfig, IntentDispatcher};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    if config.oracle.api_key.is_none() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env, using keyword routing");
    }

    info!("🚀 Ledger Assistant - API Server");
    info!("📍 Port: {}", config.port);

    let dispatcher = Arc::new(IntentDispatcher::from_config(&config).await?);

    info!(oracle = dispatcher.oracle_name(), "✅ Dispatcher initialized");
    info!("📡 Starting API server...");

    start_server(dispatcher, config.port).await?;

    Ok(())
}
