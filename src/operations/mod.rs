//! Financial operations library
//!
//! Business operations over the ledger store. Reads are idempotent; writes
//! are not (recording the same expense twice creates two entries).

use crate::exchange::{Conversion, CurrencyInfo};
use crate::ledger::LedgerStore;
use crate::models::{
    Aggregate, AggregateWindow, EntryFilter, EntryId, EntryKind, LedgerEntry, NewEntry, UserScope,
};
use crate::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub mod catalog;
pub use catalog::{Invocation, OperationCatalog, OperationSpec, ParamSpec, ParamType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub totals: Aggregate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceReport {
    pub as_of: Option<NaiveDate>,
    pub totals: Aggregate,
}

/// Structured result of one executed operation; the only source of the
/// figures that appear in a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationResult {
    Recorded(RecordedEntry),
    Summary(MonthlySummary),
    Balance(BalanceReport),
    Entries {
        kind: Option<EntryKind>,
        entries: Vec<LedgerEntry>,
    },
    Conversion(Conversion),
    Currencies(Vec<CurrencyInfo>),
}

pub struct FinancialOperations {
    ledger: Arc<dyn LedgerStore>,
}

impl FinancialOperations {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn record_expense(
        &self,
        scope: &UserScope,
        amount: Decimal,
        category: &str,
    ) -> Result<RecordedEntry> {
        self.record(scope, EntryKind::Expense, amount, category).await
    }

    pub async fn record_income(
        &self,
        scope: &UserScope,
        amount: Decimal,
        category: &str,
    ) -> Result<RecordedEntry> {
        self.record(scope, EntryKind::Income, amount, category).await
    }

    async fn record(
        &self,
        scope: &UserScope,
        kind: EntryKind,
        amount: Decimal,
        category: &str,
    ) -> Result<RecordedEntry> {
        let entry = NewEntry::new(scope.clone(), kind, amount, category).validate()?;
        let category = entry.category.clone();

        let id = self.ledger.append(entry).await?;

        info!(
            user_scope = %scope,
            entry_id = id.0,
            kind = %kind,
            amount = %amount,
            category = %category,
            "Ledger entry recorded"
        );

        Ok(RecordedEntry {
            id,
            kind,
            amount,
            category,
        })
    }

    /// Totals for one calendar month; an empty month is all zeros.
    pub async fn monthly_summary(
        &self,
        scope: &UserScope,
        year: i32,
        month: u32,
    ) -> Result<MonthlySummary> {
        let totals = self
            .ledger
            .aggregate(scope, AggregateWindow::Month { year, month })
            .await?;

        Ok(MonthlySummary { year, month, totals })
    }

    /// Balance over all history, up to and including `as_of` when given.
    pub async fn get_balance(
        &self,
        scope: &UserScope,
        as_of: Option<NaiveDate>,
    ) -> Result<BalanceReport> {
        let window = match as_of {
            Some(day) => AggregateWindow::through_day(day)?,
            None => AggregateWindow::Through { until: None },
        };

        let totals = self.ledger.aggregate(scope, window).await?;
        Ok(BalanceReport { as_of, totals })
    }

    pub async fn recent_entries(
        &self,
        scope: &UserScope,
        kind: Option<EntryKind>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let filter = EntryFilter {
            kind,
            limit: Some(limit),
            ..EntryFilter::default()
        };
        self.ledger.query(scope, &filter).await
    }
}
