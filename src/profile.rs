//! Column type inference and header repair.
//!
//! Column kinds are always recomputed from a bounded prefix of the rows. A
//! [`KindTally`] counts how many sampled cells look numeric or date-like and
//! decides once the sample is exhausted, voting on a column type without
//! scanning the full table.

use std::{collections::HashMap, fmt};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    coerce,
    config::{NumberLocale, SheetsenseConfig, contains_word},
    data::{Row, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Date,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Date => "date",
            ColumnKind::Text => "text",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    /// Non-blank cells seen in the sample.
    pub non_null: usize,
    /// Rows examined (bounded by the sample size).
    pub sampled: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct KindTally {
    sampled: usize,
    non_null: usize,
    numeric_hits: usize,
    date_hits: usize,
}

impl KindTally {
    fn update(&mut self, value: Option<&Value>, locale: NumberLocale) {
        self.sampled += 1;
        let Some(value) = value else {
            return;
        };
        if value.is_blank() {
            return;
        }
        self.non_null += 1;
        if coerce::is_probably_number_with(value, locale) {
            self.numeric_hits += 1;
        }
        if coerce::is_probably_date(value) {
            self.date_hits += 1;
        }
    }

    fn required_hits(&self, ratio: f64, min_hits: usize) -> usize {
        let proportional = (self.non_null as f64 * ratio).ceil() as usize;
        proportional.max(min_hits)
    }

    fn decide(&self, ratio: f64, min_hits: usize) -> ColumnKind {
        if self.non_null == 0 {
            return ColumnKind::Text;
        }
        let required = self.required_hits(ratio, min_hits);
        if self.numeric_hits >= required {
            ColumnKind::Numeric
        } else if self.date_hits >= required {
            ColumnKind::Date
        } else {
            ColumnKind::Text
        }
    }
}

fn tally_column(
    rows: &[Row],
    column: &str,
    sample_rows: usize,
    locale: NumberLocale,
) -> KindTally {
    let mut tally = KindTally::default();
    for row in rows.iter().take(sample_rows) {
        tally.update(row.get(column), locale);
    }
    tally
}

/// Classifies `column` from its first `sample_rows` values.
pub fn infer_column_kind(
    rows: &[Row],
    column: &str,
    sample_rows: usize,
    config: &SheetsenseConfig,
) -> ColumnKind {
    let t = &config.thresholds;
    tally_column(rows, column, sample_rows, t.number_locale)
        .decide(t.type_ratio_threshold, t.min_type_hits)
}

pub fn profile_columns(
    rows: &[Row],
    columns: &[String],
    config: &SheetsenseConfig,
) -> Vec<ColumnProfile> {
    profile_columns_with_sample(rows, columns, config.thresholds.type_sample_rows, config)
}

pub fn profile_columns_with_sample(
    rows: &[Row],
    columns: &[String],
    sample_rows: usize,
    config: &SheetsenseConfig,
) -> Vec<ColumnProfile> {
    let t = &config.thresholds;
    columns
        .iter()
        .map(|name| {
            let tally = tally_column(rows, name, sample_rows, t.number_locale);
            ColumnProfile {
                name: name.clone(),
                kind: tally.decide(t.type_ratio_threshold, t.min_type_hits),
                non_null: tally.non_null,
                sampled: tally.sampled,
            }
        })
        .collect()
}

/// Names of profiled columns of `kind`, in column order.
pub fn columns_of_kind(profiles: &[ColumnProfile], kind: ColumnKind) -> Vec<&str> {
    profiles
        .iter()
        .filter(|profile| profile.kind == kind)
        .map(|profile| profile.name.as_str())
        .collect()
}

/// Why a declared header list was judged unreliable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "header", rename_all = "kebab-case")]
pub enum HeaderDefect {
    TooLong(String),
    Numeric(String),
    EntityFragment(String),
}

/// Outcome of header corruption detection plus the positional correction map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeaderRepair {
    pub defects: Vec<HeaderDefect>,
    pub corrections: HashMap<String, String>,
}

impl HeaderRepair {
    pub fn is_corrupted(&self) -> bool {
        !self.defects.is_empty()
    }

    /// Maps a possibly-corrupted header to the key the rows actually use.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.corrections
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    pub fn repair_columns(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.resolve(column).to_string())
            .collect()
    }
}

fn header_defect(header: &str, config: &SheetsenseConfig) -> Option<HeaderDefect> {
    let trimmed = header.trim();
    if trimmed.chars().count() > config.thresholds.max_header_len {
        return Some(HeaderDefect::TooLong(header.to_string()));
    }
    let as_value = Value::text(trimmed);
    if coerce::is_probably_number_with(&as_value, config.thresholds.number_locale) {
        return Some(HeaderDefect::Numeric(header.to_string()));
    }
    let lowered = trimmed.to_lowercase();
    if config
        .keywords
        .entity_fragments
        .iter()
        .any(|fragment| contains_word(&lowered, fragment))
    {
        return Some(HeaderDefect::EntityFragment(header.to_string()));
    }
    None
}

/// Flags headers that look like data leaked into the header row and, when
/// possible, maps each declared header to the key found at the same position
/// in the first data row.
pub fn detect_header_repair(
    declared: &[String],
    rows: &[Row],
    config: &SheetsenseConfig,
) -> HeaderRepair {
    let defects = declared
        .iter()
        .filter_map(|header| header_defect(header, config))
        .collect::<Vec<_>>();
    if defects.is_empty() {
        return HeaderRepair::default();
    }

    let mut corrections = HashMap::new();
    if let Some(first) = rows.first() {
        for (declared_name, actual_key) in declared.iter().zip(first.keys()) {
            corrections.insert(declared_name.clone(), actual_key.clone());
        }
    }
    debug!(
        "Header list flagged as corrupted ({} defect(s)); {} positional correction(s)",
        defects.len(),
        corrections.len()
    );
    HeaderRepair {
        defects,
        corrections,
    }
}
