//! In-memory ledger for development and tests

use crate::ledger::LedgerStore;
use crate::models::{
    Aggregate, AggregateWindow, EntryFilter, EntryId, LedgerEntry, NewEntry, UserScope,
};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct LedgerState {
    next_id: i64,
    entries_by_scope: HashMap<UserScope, Vec<LedgerEntry>>, // insertion (= id) order
}

/// Ledger held behind one RwLock: the write guard is the writer gate,
/// read guards give each query a consistent snapshot.
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                next_id: 1,
                entries_by_scope: HashMap::new(),
            })),
        }
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, entry: NewEntry) -> Result<EntryId> {
        let entry = entry.validate()?;

        let mut state = self.state.write().await;
        let id = EntryId(state.next_id);
        state.next_id += 1;

        let committed = LedgerEntry {
            id,
            user_scope: entry.user_scope.clone(),
            kind: entry.kind,
            amount: entry.amount,
            category: entry.category,
            timestamp: Utc::now(),
        };

        state
            .entries_by_scope
            .entry(entry.user_scope)
            .or_insert_with(Vec::new)
            .push(committed);

        debug!(entry_id = id.0, "Entry appended (memory)");
        Ok(id)
    }

    async fn query(&self, scope: &UserScope, filter: &EntryFilter) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;

        let Some(entries) = state.entries_by_scope.get(scope) else {
            return Ok(Vec::new());
        };

        let limit = filter.limit.unwrap_or(usize::MAX);

        Ok(entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn aggregate(&self, scope: &UserScope, window: AggregateWindow) -> Result<Aggregate> {
        let (from, until) = window.bounds()?;
        let filter = EntryFilter {
            from,
            until,
            ..EntryFilter::default()
        };

        let state = self.state.read().await;
        let mut aggregate = Aggregate::default();

        if let Some(entries) = state.entries_by_scope.get(scope) {
            for entry in entries.iter().filter(|e| filter.matches(e)) {
                aggregate.add(entry.kind, &entry.category, entry.amount)?;
            }
        }

        Ok(aggregate)
    }
}
