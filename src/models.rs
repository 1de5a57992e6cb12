//! Core data models for the ledger assistant

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AssistantError, ErrorKind};
use crate::Result;

/// Longest accepted category name (in characters)
pub const MAX_CATEGORY_LEN: usize = 64;

/// Longest accepted user scope identifier
pub const MAX_SCOPE_LEN: usize = 128;

/// Largest amount a single entry may carry (one quadrillion). Keeps any
/// realistic number of entries summable without overflowing `Decimal`.
pub const MAX_ENTRY_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

//
// ================= Identity =================
//

/// Opaque profile boundary; every read and aggregate is isolated by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserScope(String);

impl UserScope {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AssistantError::Validation(
                "user scope must not be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_SCOPE_LEN {
            return Err(AssistantError::Validation(format!(
                "user scope exceeds {} characters",
                MAX_SCOPE_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonically assigned ledger entry id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ================= Ledger =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Expense,
    Income,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Expense => "expense",
            EntryKind::Income => "income",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "expense" | "expenses" => Some(EntryKind::Expense),
            "income" | "incomes" => Some(EntryKind::Income),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed, immutable ledger record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_scope: UserScope,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

/// Write request before validation; id and timestamp are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub user_scope: UserScope,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category: String,
}

impl NewEntry {
    pub fn new(user_scope: UserScope, kind: EntryKind, amount: Decimal, category: &str) -> Self {
        Self {
            user_scope,
            kind,
            amount,
            category: category.to_string(),
        }
    }

    /// Check amount and category, normalizing the category in place.
    pub fn validate(mut self) -> Result<Self> {
        if self.amount <= Decimal::ZERO {
            return Err(AssistantError::Validation(format!(
                "amount must be greater than zero (got {})",
                self.amount
            )));
        }
        if self.amount > MAX_ENTRY_AMOUNT {
            return Err(AssistantError::Validation(format!(
                "amount must not exceed {} (got {})",
                MAX_ENTRY_AMOUNT, self.amount
            )));
        }

        let category = self.category.trim();
        if category.is_empty() {
            return Err(AssistantError::Validation(
                "category must not be empty".to_string(),
            ));
        }
        if category.chars().count() > MAX_CATEGORY_LEN {
            return Err(AssistantError::Validation(format!(
                "category exceeds {} characters",
                MAX_CATEGORY_LEN
            )));
        }

        self.category = category.to_string();
        Ok(self)
    }
}

/// Query filter: `from` inclusive, `until` exclusive, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    pub kind: Option<EntryKind>,
    pub category: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !entry.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp >= until {
                return false;
            }
        }
        true
    }
}

//
// ================= Aggregates =================
//

/// Time window an aggregate is computed over
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregateWindow {
    Month { year: i32, month: u32 },
    /// All history strictly before `until` (or everything when `None`)
    Through { until: Option<DateTime<Utc>> },
}

impl AggregateWindow {
    /// Whole history up to and including the given calendar day
    pub fn through_day(day: NaiveDate) -> Result<Self> {
        let next = day.succ_opt().ok_or_else(|| {
            AssistantError::Validation(format!("date {} is out of range", day))
        })?;
        Ok(AggregateWindow::Through {
            until: Some(start_of_day(next)),
        })
    }

    /// `[from, until)` bounds in UTC
    pub fn bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        match *self {
            AggregateWindow::Month { year, month } => {
                let start = month_start(year, month)?;
                let (next_year, next_month) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                let end = month_start(next_year, next_month)?;
                Ok((Some(start), Some(end)))
            }
            AggregateWindow::Through { until } => Ok((None, until)),
        }
    }
}

/// Exact decimal from a JSON number or numeric string. Goes through the
/// number's textual form so `100` stays `100` and `0.1` stays `0.1`.
pub fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| AssistantError::Validation(format!("invalid month {}-{:02}", year, month)))
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryTotals {
    pub income: Decimal,
    pub expense: Decimal,
}

/// Read-only projection over committed entries; never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Aggregate {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub by_category: BTreeMap<String, CategoryTotals>,
    pub entry_count: u64,
}

impl Aggregate {
    /// Fold one entry into the totals. Overflow leaves the aggregate
    /// untouched and surfaces as a `Storage` error.
    pub fn add(&mut self, kind: EntryKind, category: &str, amount: Decimal) -> Result<()> {
        let current = self.by_category.get(category).cloned().unwrap_or_default();
        let (total, by_category) = match kind {
            EntryKind::Expense => (&self.total_expense, &current.expense),
            EntryKind::Income => (&self.total_income, &current.income),
        };
        let (Some(total), Some(by_category)) =
            (total.checked_add(amount), by_category.checked_add(amount))
        else {
            return Err(AssistantError::Storage(format!(
                "{} totals overflow while adding {}",
                kind, amount
            )));
        };

        let totals = self.by_category.entry(category.to_string()).or_default();
        match kind {
            EntryKind::Expense => {
                self.total_expense = total;
                totals.expense = by_category;
            }
            EntryKind::Income => {
                self.total_income = total;
                totals.income = by_category;
            }
        }
        self.entry_count += 1;
        Ok(())
    }

    pub fn balance(&self) -> Decimal {
        self.total_income - self.total_expense
    }
}

//
// ================= Dispatch I/O =================
//

/// One exchange of the chat transcript. Owned by the caller, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_text: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
    pub reply: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub message: String,
    pub user_scope: UserScope,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

impl DispatchRequest {
    pub fn new(message: &str, user_scope: UserScope) -> Self {
        Self {
            message: message.to_string(),
            user_scope,
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// An operation ran, or the oracle answered directly
    Completed,
    /// Nothing was executed; the user needs to rephrase or add detail
    Clarification,
    Failed { kind: ErrorKind, retryable: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReply {
    pub reply: String,
    pub outcome: DispatchOutcome,
    pub turn: ConversationTurn,
}
