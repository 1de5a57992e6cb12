use ledger_assistant::{
    AppConfig, ConversationTurn, DispatchOutcome, DispatchRequest, IntentDispatcher, UserScope,
};
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// One-shot: `assistant [--user ID] <message...>`
/// Interactive when no message is given.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing (stderr, so replies stay clean on stdout)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut user = std::env::var("LEDGER_USER").unwrap_or_else(|_| "local".to_string());
    if let Some(pos) = args.iter().position(|a| a == "--user") {
        if pos + 1 < args.len() {
            user = args.remove(pos + 1);
        }
        args.remove(pos);
    }

    let scope = UserScope::parse(&user)?;
    let config = AppConfig::from_env()?;
    let dispatcher = IntentDispatcher::from_config(&config).await?;

    info!(user_scope = %scope, oracle = dispatcher.oracle_name(), "Ledger assistant starting");

    if !args.is_empty() {
        let result = dispatcher
            .handle(DispatchRequest::new(&args.join(" "), scope))
            .await;
        println!("{}", result.reply);
        if matches!(result.outcome, DispatchOutcome::Failed { .. }) {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("Ledger assistant ({}). Type 'exit' to quit.", dispatcher.oracle_name());

    let mut history: Vec<ConversationTurn> = Vec::new();
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let request = DispatchRequest {
            message: line.to_string(),
            user_scope: scope.clone(),
            history: history.clone(),
        };
        let result = dispatcher.handle(request).await;
        println!("{}", result.reply);

        history.push(result.turn);
        if history.len() > config.history_limit {
            history.remove(0);
        }
    }

    Ok(())
}
