//! Ledger store
//!
//! Owns income/expense records. Writes go through a single writer gate,
//! reads run concurrently and only ever see committed entries.

use crate::config::StorageConfig;
use crate::models::{Aggregate, AggregateWindow, EntryFilter, EntryId, LedgerEntry, NewEntry, UserScope};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

/// Trait for ledger persistence
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Validate and durably commit one entry
    async fn append(&self, entry: NewEntry) -> Result<EntryId>;

    /// Entries of one scope matching `filter`, newest first
    async fn query(&self, scope: &UserScope, filter: &EntryFilter) -> Result<Vec<LedgerEntry>>;

    /// Totals over one consistent snapshot of the scope's entries
    async fn aggregate(&self, scope: &UserScope, window: AggregateWindow) -> Result<Aggregate>;
}

/// Pick the backend from configuration: SQLite when a database URL is set,
/// otherwise the in-memory ledger.
pub async fn build_ledger_store(config: &StorageConfig) -> Result<Arc<dyn LedgerStore>> {
    match &config.database_url {
        Some(url) => {
            let store = SqliteLedgerStore::connect(url, config).await?;
            info!(
                max_connections = config.max_connections,
                "Ledger backend: sqlite"
            );
            Ok(Arc::new(store))
        }
        None => {
            info!("Ledger backend: in-memory");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}
