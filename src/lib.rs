//! Ledger Assistant
//!
//! A conversational personal-finance assistant that:
//! - Turns free text into calls of a fixed catalog of ledger operations
//! - Validates every proposed call before anything executes (LLM never touches the ledger)
//! - Keeps an isolated income/expense ledger per user scope
//! - Converts currencies through an external rate provider
//! - Bounds every remote and storage call with a timeout
//!
//! PIPELINE:
//! MESSAGE → CLASSIFY → VALIDATE → EXECUTE → RENDER → REPLY

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod models;
pub mod operations;
pub mod oracle;
pub mod retry;

pub use error::Result;

// Re-export common types
pub use config::AppConfig;
pub use dispatcher::IntentDispatcher;
pub use models::*;
