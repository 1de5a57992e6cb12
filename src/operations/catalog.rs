//! Operation catalog
//!
//! The fixed set of operations the oracle may ask for, with typed argument
//! schemas. Oracle output is only ever executed after it has been checked
//! here and turned into an [`Invocation`].

use crate::error::AssistantError;
use crate::exchange::normalize_currency;
use crate::models::{decimal_from_json, EntryKind, MAX_CATEGORY_LEN, MAX_ENTRY_AMOUNT};
use crate::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Category hints offered to the oracle; not enforced.
pub const SUGGESTED_EXPENSE_CATEGORIES: &[&str] = &[
    "Food", "Transportation", "Housing", "Utilities", "Entertainment",
    "Shopping", "Healthcare", "Education", "Other Expenses",
];

pub const SUGGESTED_INCOME_CATEGORIES: &[&str] =
    &["Salary", "Freelance", "Investments", "Other Income"];

pub const DEFAULT_RECENT_LIMIT: usize = 10;
pub const MAX_RECENT_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Positive decimal (JSON number or numeric string)
    Amount,
    /// Short non-empty text
    Text,
    Integer,
    /// `YYYY-MM-DD`
    Date,
    /// Three-letter currency code
    Currency,
    /// `expense` or `income`
    Kind,
}

impl ParamType {
    fn json_type(&self) -> &'static str {
        match self {
            ParamType::Amount => "number",
            ParamType::Integer => "integer",
            _ => "string",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub description: String,
    /// Inclusive bounds for integer parameters
    pub range: Option<(i64, i64)>,
}

impl ParamSpec {
    fn required(name: &'static str, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            name,
            ty,
            required: true,
            description: description.into(),
            range: None,
        }
    }

    fn optional(name: &'static str, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    fn within(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }
}

#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

/// A validated, typed request for one catalog operation
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    RecordExpense { amount: Decimal, category: String },
    RecordIncome { amount: Decimal, category: String },
    MonthlySummary { year: i32, month: u32 },
    GetBalance { as_of: Option<NaiveDate> },
    RecentEntries { kind: Option<EntryKind>, limit: usize },
    ConvertCurrency {
        base: String,
        quote: String,
        amount: Option<Decimal>,
        on: Option<NaiveDate>,
    },
    ListCurrencies,
}

impl Invocation {
    pub fn name(&self) -> &'static str {
        match self {
            Invocation::RecordExpense { .. } => "record_expense",
            Invocation::RecordIncome { .. } => "record_income",
            Invocation::MonthlySummary { .. } => "monthly_summary",
            Invocation::GetBalance { .. } => "get_balance",
            Invocation::RecentEntries { .. } => "recent_entries",
            Invocation::ConvertCurrency { .. } => "convert_currency",
            Invocation::ListCurrencies => "list_currencies",
        }
    }

    /// Canonical (post-validation) arguments, for the conversation turn
    pub fn arguments(&self) -> Value {
        match self {
            Invocation::RecordExpense { amount, category }
            | Invocation::RecordIncome { amount, category } => {
                json!({ "amount": amount.to_string(), "category": category })
            }
            Invocation::MonthlySummary { year, month } => json!({ "year": year, "month": month }),
            Invocation::GetBalance { as_of } => {
                json!({ "as_of": as_of.map(|d| d.to_string()) })
            }
            Invocation::RecentEntries { kind, limit } => {
                json!({ "kind": kind.map(|k| k.as_str()), "limit": limit })
            }
            Invocation::ConvertCurrency { base, quote, amount, on } => json!({
                "base": base,
                "quote": quote,
                "amount": amount.map(|a| a.to_string()),
                "date": on.map(|d| d.to_string()),
            }),
            Invocation::ListCurrencies => json!({}),
        }
    }
}

#[derive(Debug, Clone)]
enum Typed {
    Amount(Decimal),
    Text(String),
    Integer(i64),
    Date(NaiveDate),
    Currency(String),
    Kind(EntryKind),
}

/// Fixed operation registry, built once at startup
pub struct OperationCatalog {
    operations: Vec<OperationSpec>,
}

impl OperationCatalog {
    pub fn standard() -> Self {
        let expense_hint = format!(
            "Expense category, e.g. {}",
            SUGGESTED_EXPENSE_CATEGORIES.join(", ")
        );
        let income_hint = format!(
            "Income category, e.g. {}",
            SUGGESTED_INCOME_CATEGORIES.join(", ")
        );

        let operations = vec![
            OperationSpec {
                name: "record_expense",
                description: "Record an expense in the user's ledger",
                params: vec![
                    ParamSpec::required("amount", ParamType::Amount, "Positive amount spent"),
                    ParamSpec::required("category", ParamType::Text, expense_hint),
                ],
            },
            OperationSpec {
                name: "record_income",
                description: "Record income in the user's ledger",
                params: vec![
                    ParamSpec::required("amount", ParamType::Amount, "Positive amount received"),
                    ParamSpec::required("category", ParamType::Text, income_hint),
                ],
            },
            OperationSpec {
                name: "monthly_summary",
                description: "Total income, expenses and balance for one calendar month",
                params: vec![
                    ParamSpec::required("year", ParamType::Integer, "Four-digit year")
                        .within(1970, 9999),
                    ParamSpec::required("month", ParamType::Integer, "Month number (1-12)")
                        .within(1, 12),
                ],
            },
            OperationSpec {
                name: "get_balance",
                description: "Overall balance (income minus expenses) across all history",
                params: vec![ParamSpec::optional(
                    "as_of",
                    ParamType::Date,
                    "Only count entries up to this day, YYYY-MM-DD",
                )],
            },
            OperationSpec {
                name: "recent_entries",
                description: "List the user's most recent ledger entries",
                params: vec![
                    ParamSpec::optional("kind", ParamType::Kind, "Either 'expense' or 'income'"),
                    ParamSpec::optional("limit", ParamType::Integer, "How many entries (1-50)")
                        .within(1, MAX_RECENT_LIMIT),
                ],
            },
            OperationSpec {
                name: "convert_currency",
                description: "Exchange rate between two currencies, optionally converting an amount",
                params: vec![
                    ParamSpec::required("base", ParamType::Currency, "Source currency code, e.g. USD"),
                    ParamSpec::required("quote", ParamType::Currency, "Target currency code, e.g. EUR"),
                    ParamSpec::optional("amount", ParamType::Amount, "Amount to convert"),
                    ParamSpec::optional("date", ParamType::Date, "Historical date, YYYY-MM-DD"),
                ],
            },
            OperationSpec {
                name: "list_currencies",
                description: "Currency codes the exchange-rate provider supports",
                params: vec![],
            },
        ];

        Self { operations }
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|op| op.name).collect()
    }

    /// Gemini `functionDeclarations` payload
    pub fn function_declarations(&self) -> Value {
        let declarations: Vec<Value> = self
            .operations
            .iter()
            .map(|op| {
                let mut properties = Map::new();
                for param in &op.params {
                    properties.insert(
                        param.name.to_string(),
                        json!({
                            "type": param.ty.json_type(),
                            "description": param.description,
                        }),
                    );
                }
                let required: Vec<&str> = op
                    .params
                    .iter()
                    .filter(|p| p.required)
                    .map(|p| p.name)
                    .collect();

                let mut declaration = json!({
                    "name": op.name,
                    "description": op.description,
                });
                if !properties.is_empty() {
                    declaration["parameters"] = json!({
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    });
                }
                declaration
            })
            .collect();

        Value::Array(declarations)
    }

    /// Plain-text tool list for prompts
    pub fn describe(&self) -> String {
        self.operations
            .iter()
            .map(|op| {
                let params: Vec<String> = op
                    .params
                    .iter()
                    .map(|p| {
                        if p.required {
                            p.name.to_string()
                        } else {
                            format!("{}?", p.name)
                        }
                    })
                    .collect();
                format!("{}({}) – {}", op.name, params.join(", "), op.description)
            })
            .collect::<Vec<_>>()
            .join("\n- ")
    }

    /// Check a proposed call against the schema and build the typed invocation.
    pub fn validate(&self, name: &str, arguments: &Map<String, Value>) -> Result<Invocation> {
        let spec = self
            .get(name)
            .ok_or_else(|| AssistantError::UnknownOperation(name.to_string()))?;

        let mut typed: HashMap<&'static str, Typed> = HashMap::with_capacity(spec.params.len());

        for param in &spec.params {
            match arguments.get(param.name).filter(|v| !v.is_null()) {
                Some(raw) => {
                    typed.insert(param.name, check_param(param, raw)?);
                }
                None if param.required => {
                    return Err(AssistantError::Validation(format!(
                        "missing required argument '{}' for {}",
                        param.name, spec.name
                    )));
                }
                None => {}
            }
        }

        for extra in arguments.keys().filter(|k| spec.params.iter().all(|p| p.name != k.as_str())) {
            debug!(operation = spec.name, argument = %extra, "Ignoring undeclared argument");
        }

        build_invocation(spec.name, typed)
    }
}

fn check_param(param: &ParamSpec, raw: &Value) -> Result<Typed> {
    let invalid = |what: &str| {
        AssistantError::Validation(format!("'{}' must be {} (got {})", param.name, what, raw))
    };

    match param.ty {
        ParamType::Amount => {
            let amount = decimal_from_json(raw).ok_or_else(|| invalid("a number"))?;
            if amount <= Decimal::ZERO {
                return Err(invalid("greater than zero"));
            }
            if amount > MAX_ENTRY_AMOUNT {
                return Err(invalid(&format!("at most {}", MAX_ENTRY_AMOUNT)));
            }
            Ok(Typed::Amount(amount))
        }
        ParamType::Text => {
            let text = raw.as_str().map(str::trim).unwrap_or_default();
            if text.is_empty() || text.chars().count() > MAX_CATEGORY_LEN {
                return Err(invalid("a short, non-empty text"));
            }
            Ok(Typed::Text(text.to_string()))
        }
        ParamType::Integer => {
            let value = raw
                .as_i64()
                .or_else(|| raw.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| invalid("a whole number"))?;
            if let Some((min, max)) = param.range {
                if value < min || value > max {
                    return Err(invalid(&format!("between {} and {}", min, max)));
                }
            }
            Ok(Typed::Integer(value))
        }
        ParamType::Date => raw
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(Typed::Date)
            .ok_or_else(|| invalid("a date in YYYY-MM-DD form")),
        ParamType::Currency => raw
            .as_str()
            .and_then(|s| normalize_currency(s).ok())
            .map(Typed::Currency)
            .ok_or_else(|| invalid("a three-letter currency code")),
        ParamType::Kind => raw
            .as_str()
            .and_then(EntryKind::from_str)
            .map(Typed::Kind)
            .ok_or_else(|| invalid("'expense' or 'income'")),
    }
}

fn build_invocation(name: &str, mut typed: HashMap<&'static str, Typed>) -> Result<Invocation> {
    let mut take = |key: &str| typed.remove(key);

    let invocation = match name {
        "record_expense" | "record_income" => {
            let (Some(Typed::Amount(amount)), Some(Typed::Text(category))) =
                (take("amount"), take("category"))
            else {
                return Err(schema_mismatch(name));
            };
            if name == "record_expense" {
                Invocation::RecordExpense { amount, category }
            } else {
                Invocation::RecordIncome { amount, category }
            }
        }
        "monthly_summary" => {
            let (Some(Typed::Integer(year)), Some(Typed::Integer(month))) =
                (take("year"), take("month"))
            else {
                return Err(schema_mismatch(name));
            };
            Invocation::MonthlySummary {
                year: year as i32,
                month: month as u32,
            }
        }
        "get_balance" => Invocation::GetBalance {
            as_of: match take("as_of") {
                Some(Typed::Date(day)) => Some(day),
                _ => None,
            },
        },
        "recent_entries" => Invocation::RecentEntries {
            kind: match take("kind") {
                Some(Typed::Kind(kind)) => Some(kind),
                _ => None,
            },
            limit: match take("limit") {
                Some(Typed::Integer(limit)) => limit as usize,
                _ => DEFAULT_RECENT_LIMIT,
            },
        },
        "convert_currency" => {
            let (Some(Typed::Currency(base)), Some(Typed::Currency(quote))) =
                (take("base"), take("quote"))
            else {
                return Err(schema_mismatch(name));
            };
            Invocation::ConvertCurrency {
                base,
                quote,
                amount: match take("amount") {
                    Some(Typed::Amount(amount)) => Some(amount),
                    _ => None,
                },
                on: match take("date") {
                    Some(Typed::Date(day)) => Some(day),
                    _ => None,
                },
            }
        }
        "list_currencies" => Invocation::ListCurrencies,
        other => return Err(AssistantError::UnknownOperation(other.to_string())),
    };

    Ok(invocation)
}

fn schema_mismatch(name: &str) -> AssistantError {
    AssistantError::Validation(format!("arguments for {} do not match its schema", name))
}
