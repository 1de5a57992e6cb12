//! Keyword intent oracle
//!
//! Offline, deterministic routing used when no language model is configured.
//! Static keyword lists, checked in priority order; the arguments it proposes
//! still go through catalog validation like any model output.

use crate::oracle::{IntentOracle, OracleDecision, OracleRequest};
use crate::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::str::FromStr;

// Keywords match whole words; multi-word entries match consecutive words.
const CURRENCY_LIST_KEYWORDS: &[&str] = &["currencies", "symbols"];
const CONVERT_KEYWORDS: &[&str] = &["convert", "exchange", "rate", "rates"];
const RECENT_KEYWORDS: &[&str] = &["recent", "history", "latest", "transactions", "entries", "list"];
/// Checked before the expense words, which include "paid"
const PAID_TO_USER: &[&str] = &["got paid", "get paid", "was paid", "been paid"];
const EXPENSE_KEYWORDS: &[&str] = &[
    "spent", "spend", "spending", "paid", "pay", "bought", "buy", "expense", "cost", "costs",
];
const INCOME_KEYWORDS: &[&str] = &["earned", "earn", "received", "income", "salary", "made"];
const SUMMARY_KEYWORDS: &[&str] = &[
    "summary", "summarize", "report", "month", "monthly", "how much", "overview",
];
const BALANCE_KEYWORDS: &[&str] = &["balance", "net worth", "left", "savings"];
const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good evening"];

/// Words that end a category phrase
const CATEGORY_STOP_WORDS: &[&str] = &[
    "in", "at", "on", "for", "from", "with", "today", "yesterday", "this", "last", "and",
];

/// Three-letter words that are not currency codes
const NOT_CURRENCIES: &[&str] = &[
    "the", "and", "for", "how", "you", "are", "can", "get", "was", "per", "now", "see",
    "use", "out", "all", "any", "day", "its", "one", "two", "did", "not",
];

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december",
];

const HELP_TEXT: &str = "I can record expenses and income, summarize a month, report your balance, \
list recent entries and convert currencies. Try \"I spent 20 on food\" or \"summary for 2024-05\".";

pub struct KeywordOracle;

impl KeywordOracle {
    pub fn new() -> Self {
        Self
    }

    fn decide(text: &str, today: NaiveDate) -> OracleDecision {
        let lowered = text.trim().to_lowercase();
        let words = tokenize(&lowered);
        let has_any = |keywords: &[&str]| mentions(&words, keywords);

        let codes: Vec<String> = words
            .iter()
            .filter(|w| w.len() == 3 && w.chars().all(|c| c.is_ascii_alphabetic()))
            .filter(|w| !NOT_CURRENCIES.contains(&w.as_str()))
            .map(|w| w.to_ascii_uppercase())
            .collect();

        // ── Priority 1: currency list and conversion
        if has_any(CURRENCY_LIST_KEYWORDS) && codes.len() < 2 {
            return invoke("list_currencies", Map::new());
        }

        if has_any(CONVERT_KEYWORDS) {
            if codes.len() < 2 {
                return OracleDecision::NoOperation(
                    "Which currencies? For example: \"convert 100 USD to EUR\".".to_string(),
                );
            }

            let mut args = Map::new();
            args.insert("base".to_string(), json!(codes[0]));
            args.insert("quote".to_string(), json!(codes[1]));
            if let Some(amount) = first_amount(&words) {
                args.insert("amount".to_string(), json!(amount.to_string()));
            }
            if let Some(day) = first_date(&words) {
                args.insert("date".to_string(), json!(day.to_string()));
            }
            return invoke("convert_currency", args);
        }

        // ── Priority 2: listing entries
        if has_any(RECENT_KEYWORDS) {
            let mut args = Map::new();
            if mentions(&words, &["expense", "expenses", "spent", "spending"]) {
                args.insert("kind".to_string(), json!("expense"));
            } else if mentions(&words, &["income", "incomes", "earnings"]) {
                args.insert("kind".to_string(), json!("income"));
            }
            if let Some(limit) = words.iter().find_map(|w| w.parse::<i64>().ok()) {
                args.insert("limit".to_string(), json!(limit));
            }
            return invoke("recent_entries", args);
        }

        // ── Priority 3: recording (needs an amount)
        if let Some(amount) = first_amount(&words) {
            let kind = if has_any(PAID_TO_USER) {
                Some(("record_income", "Other Income"))
            } else if has_any(EXPENSE_KEYWORDS) {
                Some(("record_expense", "Other Expenses"))
            } else if has_any(INCOME_KEYWORDS) {
                Some(("record_income", "Other Income"))
            } else {
                None
            };

            if let Some((operation, fallback)) = kind {
                let category = category_phrase(&words).unwrap_or_else(|| fallback.to_string());
                let mut args = Map::new();
                args.insert("amount".to_string(), json!(amount.to_string()));
                args.insert("category".to_string(), json!(category));
                return invoke(operation, args);
            }
        }

        // ── Priority 4: monthly summary
        if has_any(SUMMARY_KEYWORDS) || month_named(&words).is_some() || year_month(&words).is_some() {
            let (year, month) = year_month(&words)
                .or_else(|| {
                    month_named(&words).map(|month| {
                        let year = words
                            .iter()
                            .filter_map(|w| w.parse::<i32>().ok())
                            .find(|y| (1970..=9999).contains(y))
                            .unwrap_or_else(|| today.year());
                        (year, month)
                    })
                })
                .unwrap_or_else(|| {
                    if mentions(&words, &["last month"]) {
                        previous_month(today)
                    } else {
                        (today.year(), today.month())
                    }
                });

            let mut args = Map::new();
            args.insert("year".to_string(), json!(year));
            args.insert("month".to_string(), json!(month));
            return invoke("monthly_summary", args);
        }

        // ── Priority 5: balance
        if has_any(BALANCE_KEYWORDS) {
            let mut args = Map::new();
            if let Some(day) = first_date(&words) {
                args.insert("as_of".to_string(), json!(day.to_string()));
            }
            return invoke("get_balance", args);
        }

        if GREETINGS.iter().any(|g| lowered == *g || lowered.starts_with(&format!("{} ", g))) {
            return OracleDecision::NoOperation(format!("Hello! {}", HELP_TEXT));
        }

        OracleDecision::NoOperation(format!("Sorry, I didn't catch that. {}", HELP_TEXT))
    }
}

impl Default for KeywordOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentOracle for KeywordOracle {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn classify(&self, request: &OracleRequest<'_>) -> Result<OracleDecision> {
        Ok(Self::decide(request.user_text, request.today))
    }
}

fn invoke(operation: &str, arguments: Map<String, Value>) -> OracleDecision {
    OracleDecision::Invoke {
        operation: operation.to_string(),
        arguments,
    }
}

/// Whitespace tokens with surrounding punctuation stripped
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| matches!(c, ',' | '!' | '?' | ';' | ':' | '"' | '\'' | '(' | ')'))
                .trim_end_matches('.')
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// True when any keyword appears as a whole word (or run of words)
fn mentions(words: &[String], keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| {
        let parts: Vec<&str> = keyword.split_whitespace().collect();
        !parts.is_empty()
            && words
                .windows(parts.len())
                .any(|window| window.iter().zip(&parts).all(|(w, p)| w == p))
    })
}

fn first_amount(words: &[String]) -> Option<Decimal> {
    words.iter().find_map(|w| {
        let number = w.trim_start_matches(|c: char| matches!(c, '$' | '€' | '£'));
        Decimal::from_str(number).ok().filter(|d| *d > Decimal::ZERO)
    })
}

fn first_date(words: &[String]) -> Option<NaiveDate> {
    words
        .iter()
        .find_map(|w| NaiveDate::parse_from_str(w, "%Y-%m-%d").ok())
}

/// `YYYY-MM` token
fn year_month(words: &[String]) -> Option<(i32, u32)> {
    words.iter().find_map(|w| {
        let (year, month) = w.split_once('-')?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return None;
        }
        let year: i32 = year.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        (1..=12).contains(&month).then_some((year, month))
    })
}

fn month_named(words: &[String]) -> Option<u32> {
    words.iter().find_map(|w| {
        MONTHS
            .iter()
            .position(|m| w == m || (w.len() == 3 && w != "may" && m.starts_with(w.as_str())))
            .map(|idx| idx as u32 + 1)
    })
}

fn previous_month(today: NaiveDate) -> (i32, u32) {
    if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    }
}

/// Words after "on"/"for"/"from", up to the next stop word
fn category_phrase(words: &[String]) -> Option<String> {
    let start = words
        .iter()
        .position(|w| matches!(w.as_str(), "on" | "for" | "from"))?;

    let phrase: Vec<&str> = words[start + 1..]
        .iter()
        .map(String::as_str)
        .skip_while(|w| matches!(*w, "a" | "an" | "the" | "my"))
        .take_while(|w| !CATEGORY_STOP_WORDS.contains(w) && Decimal::from_str(w).is_err())
        .take(3)
        .collect();

    (!phrase.is_empty()).then(|| phrase.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()
    }

    fn expect_invoke(text: &str) -> (String, Map<String, Value>) {
        match KeywordOracle::decide(text, today()) {
            OracleDecision::Invoke { operation, arguments } => (operation, arguments),
            other => panic!("{} -> {:?}", text, other),
        }
    }

    #[test]
    fn test_record_expense() {
        let (op, args) = expect_invoke("I spent 100 on food today");
        assert_eq!(op, "record_expense");
        assert_eq!(args["amount"], "100");
        assert_eq!(args["category"], "food");

        let (_, args) = expect_invoke("paid $12.50 for a taxi ride");
        assert_eq!(args["amount"], "12.50");
        assert_eq!(args["category"], "taxi ride");
    }

    #[test]
    fn test_keywords_inside_other_words_are_ignored() {
        for (text, amount, category) in [
            ("I spent 200 on learning materials", "200", "learning materials"),
            ("paid 40 for handmade soap", "40", "handmade soap"),
            ("I spent 30 on karate class", "30", "karate class"),
            ("paid 150 for a specialist", "150", "specialist"),
        ] {
            let (op, args) = expect_invoke(text);
            assert_eq!(op, "record_expense", "{}", text);
            assert_eq!(args["amount"], amount, "{}", text);
            assert_eq!(args["category"], category, "{}", text);
        }
    }

    #[test]
    fn test_expense_wins_over_income_words() {
        let (op, _) = expect_invoke("spent 25 on a salary negotiation course");
        assert_eq!(op, "record_expense");

        let (op, args) = expect_invoke("I got paid 1200 for freelance work");
        assert_eq!(op, "record_income");
        assert_eq!(args["category"], "freelance work");
    }

    #[test]
    fn test_currency_list_request() {
        let (op, args) = expect_invoke("which currencies do you support?");
        assert_eq!(op, "list_currencies");
        assert!(args.is_empty());

        let (op, _) = expect_invoke("list supported currencies");
        assert_eq!(op, "list_currencies");
    }

    #[test]
    fn test_mentions_matches_whole_words_and_phrases() {
        let words = tokenize("i got paid for my karate lessons");
        assert!(mentions(&words, &["got paid"]));
        assert!(!mentions(&words, &["rate"]));
        assert!(!mentions(&words, &["paid for me"]));
        assert!(!mentions(&words, &[""]));
    }

    #[test]
    fn test_record_income_with_default_category() {
        let (op, args) = expect_invoke("received 2500");
        assert_eq!(op, "record_income");
        assert_eq!(args["amount"], "2500");
        assert_eq!(args["category"], "Other Income");
    }

    #[test]
    fn test_monthly_summary_variants() {
        let (op, args) = expect_invoke("give me a summary for 2024-03");
        assert_eq!(op, "monthly_summary");
        assert_eq!((args["year"].clone(), args["month"].clone()), (json!(2024), json!(3)));

        let (_, args) = expect_invoke("report for february 2023");
        assert_eq!((args["year"].clone(), args["month"].clone()), (json!(2023), json!(2)));

        let (_, args) = expect_invoke("how much did I spend this month?");
        assert_eq!((args["year"].clone(), args["month"].clone()), (json!(2024), json!(5)));

        let (_, args) = expect_invoke("summary of last month");
        assert_eq!(args["month"], json!(4));
    }

    #[test]
    fn test_balance_and_recent() {
        let (op, args) = expect_invoke("what's my balance?");
        assert_eq!(op, "get_balance");
        assert!(args.is_empty());

        let (op, args) = expect_invoke("show my 5 latest expenses");
        assert_eq!(op, "recent_entries");
        assert_eq!(args["kind"], "expense");
        assert_eq!(args["limit"], 5);
    }

    #[test]
    fn test_convert_currency() {
        let (op, args) = expect_invoke("convert 100 usd to eur");
        assert_eq!(op, "convert_currency");
        assert_eq!(args["base"], "USD");
        assert_eq!(args["quote"], "EUR");
        assert_eq!(args["amount"], "100");

        assert!(matches!(
            KeywordOracle::decide("what's the exchange rate?", today()),
            OracleDecision::NoOperation(_)
        ));
    }

    #[test]
    fn test_unrelated_text_is_no_operation() {
        for text in ["hello", "tell me a joke"] {
            assert!(matches!(
                KeywordOracle::decide(text, today()),
                OracleDecision::NoOperation(_)
            ));
        }
    }
}
