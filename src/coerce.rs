//! Locale-aware scalar coercion.
//!
//! This is the only module that knows how Brazilian spreadsheets spell
//! numbers (`R$ 1.234,56`) and dates (`15/01/2024`). Every other stage asks
//! these functions instead of parsing cells itself. All functions are total:
//! unparseable input yields `false`, `0.0`, or `None`.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::{config::NumberLocale, data::Value};

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];
const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("valid ISO date regex"))
}

fn day_month_year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2,4})(?:\D|$)").expect("valid D/M/Y regex")
    })
}

fn grouped_thousands_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[-+]?\d{1,3}(\.\d{3})+$").expect("valid thousands regex")
    })
}

pub fn is_probably_number(value: &Value) -> bool {
    is_probably_number_with(value, NumberLocale::Brazilian)
}

pub fn is_probably_number_with(value: &Value, locale: NumberLocale) -> bool {
    match value {
        Value::Number(n) => n.is_finite(),
        Value::Text(s) => parse_numeric_text(s, locale).is_some(),
        Value::Date(_) | Value::Null => false,
    }
}

pub fn to_number(value: &Value) -> f64 {
    to_number_with(value, NumberLocale::Brazilian)
}

pub fn to_number_with(value: &Value, locale: NumberLocale) -> f64 {
    match value {
        Value::Number(n) if n.is_finite() => *n,
        Value::Text(s) => parse_numeric_text(s, locale).unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn is_probably_date(value: &Value) -> bool {
    match value {
        Value::Date(_) => true,
        Value::Text(s) => {
            let trimmed = s.trim();
            iso_date_pattern().is_match(trimmed) || day_month_year_pattern().is_match(trimmed)
        }
        Value::Number(_) | Value::Null => false,
    }
}

pub fn to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Text(s) => parse_date_text(s.trim()),
        Value::Number(_) | Value::Null => None,
    }
}

/// Canonical display form for calendar dates (`DD/MM/YYYY`).
pub fn format_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

/// Converts a raw spreadsheet cell into a tagged value.
///
/// Placeholder spellings exported by spreadsheet tools collapse to `Null`;
/// `#DIV/0!` becomes zero.
pub fn sanitize_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Value::Null;
    }
    let lowered = trimmed.to_ascii_lowercase();
    match lowered.as_str() {
        "nan" | "null" | "none" => Value::Null,
        "#div/0!" => Value::Number(0.0),
        _ => Value::Text(trimmed.to_string()),
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = iso_date_pattern().captures(text) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let caps = day_month_year_pattern().captures(text)?;
    let day = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let year_text = &caps[3];
    let mut year: i32 = year_text.parse().ok()?;
    if year_text.len() == 2 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_numeric_text(raw: &str, locale: NumberLocale) -> Option<f64> {
    let stripped = raw
        .replace("R$", "")
        .chars()
        .filter(|ch| !ch.is_whitespace() && !CURRENCY_SYMBOLS.contains(ch))
        .collect::<String>();
    if stripped.is_empty() {
        return None;
    }
    let normalized = match locale {
        NumberLocale::Brazilian => stripped.replace('.', "").replace(',', "."),
        NumberLocale::Auto => normalize_auto(&stripped),
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn normalize_auto(text: &str) -> String {
    match (text.rfind(','), text.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => text.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => text.replace(',', ""),
        (Some(_), None) => text.replace(',', "."),
        (None, Some(_)) if grouped_thousands_pattern().is_match(text) => text.replace('.', ""),
        _ => text.to_string(),
    }
}
