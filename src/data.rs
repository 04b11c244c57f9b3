//! Row-level data model shared by every stage of the pipeline.
//!
//! Spreadsheet cells arrive loosely typed, so each cell is carried as a
//! [`Value`] tag (number, text, calendar date, or null). Rows keep their
//! column insertion order because header repair reads keys positionally.

use std::{collections::HashSet, fmt};

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

/// Label used when a cell has nothing to show.
pub const EMPTY_LABEL: &str = "(empty)";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Number(f64),
    Text(String),
    Date(NaiveDate),
    #[default]
    Null,
}

pub type Row = IndexMap<String, Value>;

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// True for nulls and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(_) | Value::Date(_) => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Number(n) => format_plain_number(*n),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Null => String::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Value::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Rows plus the header list the upload layer declared for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }
}

/// Renders integral floats without a fractional part (`3` instead of `3.0`).
pub fn format_plain_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Makes header names unique and fills blanks with positional placeholders.
///
/// Duplicates are compared case-insensitively and suffixed `_2`, `_3`, ...,
/// skipping any suffix already used by another header in the list; blank
/// names become `col_<n>` with a 1-based position.
pub fn unique_column_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let bases = names
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let collapsed = raw.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed.is_empty() {
                format!("col_{}", idx + 1)
            } else {
                collapsed
            }
        })
        .collect::<Vec<_>>();
    let declared: HashSet<String> = bases.iter().map(|base| base.to_lowercase()).collect();
    let mut emitted: HashSet<String> = HashSet::with_capacity(bases.len());
    bases
        .into_iter()
        .map(|base| {
            if emitted.insert(base.to_lowercase()) {
                return base;
            }
            let mut suffix = 2;
            loop {
                let candidate = format!("{base}_{suffix}");
                let key = candidate.to_lowercase();
                if !declared.contains(&key) && emitted.insert(key) {
                    return candidate;
                }
                suffix += 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection_covers_null_and_whitespace() {
        assert!(Value::Null.is_blank());
        assert!(Value::text("   ").is_blank());
        assert!(!Value::text("x").is_blank());
        assert!(!Value::Number(0.0).is_blank());
    }

    #[test]
    fn plain_number_drops_integral_fraction() {
        assert_eq!(format_plain_number(3.0), "3");
        assert_eq!(format_plain_number(2.5), "2.5");
        assert_eq!(format_plain_number(-7.0), "-7");
    }

    #[test]
    fn json_values_map_onto_tags() {
        assert_eq!(Value::from(serde_json::json!(null)), Value::Null);
        assert_eq!(Value::from(serde_json::json!(12)), Value::Number(12.0));
        assert_eq!(Value::from(serde_json::json!("abc")), Value::text("abc"));
        assert_eq!(Value::from(serde_json::json!(true)), Value::text("true"));
    }

    #[test]
    fn value_serializes_untagged() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let row = vec![
            Value::Number(1.5),
            Value::text("a"),
            Value::Date(date),
            Value::Null,
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[1.5,"a","2024-05-06",null]"#);
    }

    #[test]
    fn unique_column_names_suffixes_duplicates_and_fills_blanks() {
        let names = unique_column_names(&["Valor", "", "valor", "Data  Venda", "Valor"]);
        assert_eq!(
            names,
            vec!["Valor", "col_2", "valor_2", "Data Venda", "Valor_3"]
        );
        let names = unique_column_names(&["Valor", "Valor", "Valor_2"]);
        assert_eq!(names, vec!["Valor", "Valor_3", "Valor_2"]);
        let names = unique_column_names(&["a", "A", "a_2", "", "col_4"]);
        assert_eq!(names, vec!["a", "A_3", "a_2", "col_4", "col_4_2"]);
    }
}
