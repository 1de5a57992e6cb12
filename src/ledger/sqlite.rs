//! SQLite-backed ledger on an sqlx connection pool
//!
//! Every operation checks a connection out of the pool for its own duration
//! only; the `PoolConnection` guard hands it back on every exit path.
//! Amounts are stored as decimal text and summed with `Decimal`.

use crate::config::StorageConfig;
use crate::error::AssistantError;
use crate::ledger::LedgerStore;
use crate::models::{
    Aggregate, AggregateWindow, EntryFilter, EntryId, EntryKind, LedgerEntry, NewEntry, UserScope,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const SCHEMA_LEDGER_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_scope TEXT NOT NULL,
  kind TEXT NOT NULL CHECK (kind IN ('expense', 'income')),
  amount TEXT NOT NULL,
  category TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#;

const INDEX_SCOPE_TIME_KIND: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ledger_entries_scope_time_kind
ON ledger_entries (user_scope, created_at, kind);
"#;

pub struct SqliteLedgerStore {
    pool: SqlitePool,
    /// Single-writer gate; readers never take it
    write_gate: Mutex<()>,
    operation_timeout: Duration,
}

impl SqliteLedgerStore {
    /// Wrap an existing pool. The caller owns pool sizing and acquire timeout.
    pub fn new(pool: SqlitePool, operation_timeout: Duration) -> Self {
        Self {
            pool,
            write_gate: Mutex::new(()),
            operation_timeout,
        }
    }

    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str, config: &StorageConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.operation_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let store = Self::new(pool, config.operation_timeout);
        store.migrate().await?;
        Ok(store)
    }

    /// Create the ledger table and its index (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        self.bounded("migrate", async {
            let mut conn = self.pool.acquire().await?;
            sqlx::query(SCHEMA_LEDGER_ENTRIES).execute(&mut *conn).await?;
            sqlx::query(INDEX_SCOPE_TIME_KIND).execute(&mut *conn).await?;
            Ok(())
        })
        .await
    }

    async fn bounded<T>(&self, label: &str, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(AssistantError::Storage(format!(
                "ledger {} timed out after {} ms",
                label,
                self.operation_timeout.as_millis()
            ))),
        }
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        let kind_str: String = row.try_get("kind")?;
        let amount_str: String = row.try_get("amount")?;
        let created_at_str: String = row.try_get("created_at")?;
        let scope_str: String = row.try_get("user_scope")?;

        Ok(LedgerEntry {
            id: EntryId(row.try_get("id")?),
            user_scope: UserScope::parse(&scope_str)
                .map_err(|_| corrupt_row("user_scope", &scope_str))?,
            kind: EntryKind::from_str(&kind_str).ok_or_else(|| corrupt_row("kind", &kind_str))?,
            amount: Decimal::from_str(&amount_str)
                .map_err(|_| corrupt_row("amount", &amount_str))?,
            category: row.try_get("category")?,
            timestamp: DateTime::parse_from_rfc3339(&created_at_str)
                .map_err(|_| corrupt_row("created_at", &created_at_str))?
                .with_timezone(&Utc),
        })
    }
}

/// Fixed-width UTC form so text order equals time order
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn corrupt_row(column: &str, value: &str) -> AssistantError {
    AssistantError::Storage(format!("corrupt ledger row: {}={}", column, value))
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn append(&self, entry: NewEntry) -> Result<EntryId> {
        let entry = entry.validate()?;

        let (_writer, mut conn) = self
            .bounded("append", async {
                let writer = self.write_gate.lock().await;
                let conn = self.pool.acquire().await?;
                Ok((writer, conn))
            })
            .await?;

        // The INSERT runs outside the operation timeout: cancelling it could
        // report a committed write as failed and invite a duplicate on retry.
        // Lock waits are still bounded by the connection's busy_timeout.
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (user_scope, kind, amount, category, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_scope.as_str())
        .bind(entry.kind.as_str())
        .bind(entry.amount.to_string())
        .bind(&entry.category)
        .bind(format_timestamp(Utc::now()))
        .execute(&mut *conn)
        .await?;

        let id = EntryId(result.last_insert_rowid());
        debug!(entry_id = id.0, "Entry appended (sqlite)");
        Ok(id)
    }

    async fn query(&self, scope: &UserScope, filter: &EntryFilter) -> Result<Vec<LedgerEntry>> {
        let from = filter.from.map(format_timestamp);
        let until = filter.until.map(format_timestamp);

        self.bounded("query", async {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT id, user_scope, kind, amount, category, created_at \
                 FROM ledger_entries WHERE user_scope = ",
            );
            qb.push_bind(scope.as_str());

            if let Some(kind) = filter.kind {
                qb.push(" AND kind = ").push_bind(kind.as_str());
            }
            if let Some(category) = &filter.category {
                qb.push(" AND category = ")
                    .push_bind(category.as_str())
                    .push(" COLLATE NOCASE");
            }
            if let Some(from) = &from {
                qb.push(" AND created_at >= ").push_bind(from.as_str());
            }
            if let Some(until) = &until {
                qb.push(" AND created_at < ").push_bind(until.as_str());
            }
            qb.push(" ORDER BY id DESC");
            if let Some(limit) = filter.limit {
                qb.push(" LIMIT ").push_bind(limit as i64);
            }

            let mut conn = self.pool.acquire().await?;
            let rows = qb.build().fetch_all(&mut *conn).await?;

            rows.iter().map(Self::row_to_entry).collect()
        })
        .await
    }

    async fn aggregate(&self, scope: &UserScope, window: AggregateWindow) -> Result<Aggregate> {
        let (from, until) = window.bounds()?;
        let from = from.map(format_timestamp);
        let until = until.map(format_timestamp);

        self.bounded("aggregate", async {
            // One statement: one read snapshot.
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT kind, amount, category FROM ledger_entries WHERE user_scope = ",
            );
            qb.push_bind(scope.as_str());
            if let Some(from) = &from {
                qb.push(" AND created_at >= ").push_bind(from.as_str());
            }
            if let Some(until) = &until {
                qb.push(" AND created_at < ").push_bind(until.as_str());
            }

            let mut conn = self.pool.acquire().await?;
            let rows = qb.build().fetch_all(&mut *conn).await?;

            let mut aggregate = Aggregate::default();
            for row in &rows {
                let kind_str: String = row.try_get("kind")?;
                let amount_str: String = row.try_get("amount")?;
                let category: String = row.try_get("category")?;

                let kind = EntryKind::from_str(&kind_str)
                    .ok_or_else(|| corrupt_row("kind", &kind_str))?;
                let amount = Decimal::from_str(&amount_str)
                    .map_err(|_| corrupt_row("amount", &amount_str))?;

                aggregate.add(kind, &category, amount)?;
            }

            Ok(aggregate)
        })
        .await
    }
}
