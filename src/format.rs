use serde::{Deserialize, Serialize};

use crate::{
    aggregate::AggregationKind,
    config::{KeywordTables, contains_any},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayFormat {
    Currency,
    Percentage,
    Number,
    /// Textual metric values; never produced by [`detect_format`].
    Text,
}

/// Picks how a chart's values should be displayed from the value column name.
///
/// Counting always yields plain numbers; otherwise currency keywords are
/// checked before percentage keywords.
pub fn detect_format(
    kind: AggregationKind,
    value_column: Option<&str>,
    keywords: &KeywordTables,
) -> DisplayFormat {
    if kind == AggregationKind::Count {
        return DisplayFormat::Number;
    }
    let Some(column) = value_column else {
        return DisplayFormat::Number;
    };
    let lowered = column.to_lowercase();
    if contains_any(&lowered, &keywords.currency) {
        DisplayFormat::Currency
    } else if contains_any(&lowered, &keywords.percentage) {
        DisplayFormat::Percentage
    } else {
        DisplayFormat::Number
    }
}

impl DisplayFormat {
    /// Renders `value` with Brazilian separators (`R$ 1.234,56`, `12,5%`).
    pub fn render(&self, value: f64) -> String {
        if !value.is_finite() {
            return String::new();
        }
        match self {
            DisplayFormat::Currency => format!("R$ {}", group_decimal(value, 2)),
            DisplayFormat::Percentage => format!("{}%", group_decimal(value, 1)),
            DisplayFormat::Number | DisplayFormat::Text => {
                if value.fract() == 0.0 {
                    group_decimal(value, 0)
                } else {
                    group_decimal(value, 2)
                }
            }
        }
    }
}

fn group_decimal(value: f64, decimals: usize) -> String {
    let rendered = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match rendered.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (rendered.as_str(), None),
    };
    let mut grouped = String::with_capacity(rendered.len() + integer.len() / 3);
    for (idx, ch) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if let Some(fraction) = fraction {
        grouped.push(',');
        grouped.push_str(fraction);
    }
    let is_zero = grouped.chars().all(|ch| matches!(ch, '0' | '.' | ','));
    if value < 0.0 && !is_zero {
        format!("-{grouped}")
    } else {
        grouped
    }
}
