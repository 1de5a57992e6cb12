//! Deterministic reply templates
//!
//! Every figure in a reply is the `Display` of a value taken from the
//! structured operation result.

use crate::error::AssistantError;
use crate::models::{Aggregate, LedgerEntry};
use crate::operations::{BalanceReport, MonthlySummary, OperationResult, RecordedEntry};
use crate::exchange::{Conversion, CurrencyInfo};

const MONTH_NAMES: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August",
    "September", "October", "November", "December",
];

pub const EMPTY_MESSAGE_REPLY: &str =
    "Please tell me what you'd like to do, for example \"I spent 20 on lunch\".";

pub const NOT_UNDERSTOOD_REPLY: &str =
    "Sorry, I didn't understand that. Could you rephrase it?";

pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize))
        .copied()
        .unwrap_or("Unknown month")
}

pub fn render_result(result: &OperationResult, currency: &str) -> String {
    match result {
        OperationResult::Recorded(entry) => render_recorded(entry, currency),
        OperationResult::Summary(summary) => render_summary(summary, currency),
        OperationResult::Balance(report) => render_balance(report, currency),
        OperationResult::Entries { kind, entries } => {
            let label = kind.map(|k| format!("{} ", k)).unwrap_or_default();
            render_entries(&label, entries, currency)
        }
        OperationResult::Conversion(conversion) => render_conversion(conversion),
        OperationResult::Currencies(currencies) => render_currencies(currencies),
    }
}

fn render_recorded(entry: &RecordedEntry, currency: &str) -> String {
    format!(
        "Recorded {} of {} {} for {} (entry #{}).",
        entry.kind, entry.amount, currency, entry.category, entry.id
    )
}

fn render_summary(summary: &MonthlySummary, currency: &str) -> String {
    let period = format!("{} {}", month_name(summary.month), summary.year);
    let totals = &summary.totals;

    if totals.entry_count == 0 {
        return format!(
            "No entries for {}. Income: 0 {c}, expenses: 0 {c}, balance: 0 {c}.",
            period,
            c = currency
        );
    }

    let mut out = format!("Summary for {}:\n", period);
    out.push_str(&totals_lines(totals, currency));

    if !totals.by_category.is_empty() {
        out.push_str("\nBy category:");
        for (category, amounts) in &totals.by_category {
            let mut parts = Vec::with_capacity(2);
            if !amounts.income.is_zero() {
                parts.push(format!("income {} {}", amounts.income, currency));
            }
            if !amounts.expense.is_zero() {
                parts.push(format!("expenses {} {}", amounts.expense, currency));
            }
            out.push_str(&format!("\n- {}: {}", category, parts.join(", ")));
        }
    }

    out
}

fn render_balance(report: &BalanceReport, currency: &str) -> String {
    let as_of = report
        .as_of
        .map(|day| format!(" as of {}", day))
        .unwrap_or_default();

    format!(
        "Your balance{} is {} {c} (income {} {c}, expenses {} {c}).",
        as_of,
        report.totals.balance(),
        report.totals.total_income,
        report.totals.total_expense,
        c = currency
    )
}

fn render_entries(label: &str, entries: &[LedgerEntry], currency: &str) -> String {
    if entries.is_empty() {
        return format!("You have no {}entries yet.", label);
    }

    let mut out = format!("Your {} most recent {}entries:", entries.len(), label);
    for entry in entries {
        out.push_str(&format!(
            "\n- {} {} {} {} ({})",
            entry.timestamp.format("%Y-%m-%d"),
            entry.kind,
            entry.amount,
            currency,
            entry.category
        ));
    }
    out
}

fn render_conversion(conversion: &Conversion) -> String {
    let date = conversion
        .date
        .as_deref()
        .map(|d| format!(" on {}", d))
        .unwrap_or_default();

    match (conversion.amount, conversion.converted) {
        (Some(amount), Some(converted)) => format!(
            "{} {} = {} {} (rate {}{}).",
            amount, conversion.base, converted, conversion.quote, conversion.rate, date
        ),
        _ => format!(
            "1 {} = {} {}{}.",
            conversion.base, conversion.rate, conversion.quote, date
        ),
    }
}

fn render_currencies(currencies: &[CurrencyInfo]) -> String {
    if currencies.is_empty() {
        return "The exchange-rate provider didn't list any currencies.".to_string();
    }

    let codes: Vec<&str> = currencies.iter().map(|c| c.code.as_str()).collect();
    format!(
        "Supported currencies ({}): {}.",
        currencies.len(),
        codes.join(", ")
    )
}

fn totals_lines(totals: &Aggregate, currency: &str) -> String {
    format!(
        "- Income: {} {c}\n- Expenses: {} {c}\n- Balance: {} {c}",
        totals.total_income,
        totals.total_expense,
        totals.balance(),
        c = currency
    )
}

/// User-facing text for a failed request
pub fn render_failure(error: &AssistantError) -> String {
    match error {
        AssistantError::Validation(detail) => {
            format!("I couldn't do that: {}. Could you rephrase or add the missing detail?", detail)
        }
        AssistantError::UnknownOperation(_) => {
            "I can't do that. I can record expenses and income, summarize a month, \
             report your balance, list recent entries and convert currencies."
                .to_string()
        }
        AssistantError::Storage(_) => {
            "I couldn't reach your ledger just now. Please try again in a moment.".to_string()
        }
        AssistantError::RateUnavailable(_) => {
            "Exchange rates are unavailable right now. Please try again shortly.".to_string()
        }
        AssistantError::InvalidCurrencyPair(detail) => {
            format!("That currency pair isn't supported ({}).", detail)
        }
        AssistantError::Oracle(_) => NOT_UNDERSTOOD_REPLY.to_string(),
        AssistantError::OracleUnavailable(_) => {
            "The assistant is temporarily unavailable. Please try again.".to_string()
        }
        _ => "Something went wrong while handling your request.".to_string(),
    }
}
