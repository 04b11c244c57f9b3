//! Spreadsheet clean-up applied at the input boundary.
//!
//! Exported sheets rarely start at the header row or end at the last record.
//! Before profiling, [`strip_title_rows`] drops report titles above the header
//! and [`clean_dataset`] removes trailing notes, total rows, columns that are
//! almost entirely empty, and text that was UTF-8 read as Windows-1252.
//! [`CleaningReport`] counts what was removed so the shell can log it.

use std::{borrow::Cow, collections::HashMap};

use encoding_rs::WINDOWS_1252;
use itertools::Itertools;
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::{
    config::{ConfigError, SheetsenseConfig, compile_patterns},
    data::{Dataset, Row, Value, unique_column_names},
};

/// Compiled patterns and limits used by the clean-up pass.
#[derive(Debug, Clone)]
pub struct CleaningRules {
    title: Vec<Regex>,
    footer: Vec<Regex>,
    total: Vec<Regex>,
    title_scan_rows: usize,
    footer_scan_rows: usize,
    min_column_fill: f64,
    repair_mojibake: bool,
}

impl CleaningRules {
    pub fn from_config(config: &SheetsenseConfig) -> Result<Self, ConfigError> {
        let k = &config.keywords;
        let t = &config.thresholds;
        Ok(Self {
            title: compile_patterns("title_patterns", &k.title_patterns)?,
            footer: compile_patterns("footer_patterns", &k.footer_patterns)?,
            total: compile_patterns("total_row_patterns", &k.total_row_patterns)?,
            title_scan_rows: t.title_scan_rows,
            footer_scan_rows: t.footer_scan_rows,
            min_column_fill: t.min_column_fill,
            repair_mojibake: t.repair_mojibake,
        })
    }
}

fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(text))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub title_rows: usize,
    pub footer_rows: usize,
    pub total_rows: usize,
    pub dropped_columns: Vec<String>,
    pub repaired_cells: usize,
}

impl CleaningReport {
    pub fn is_empty(&self) -> bool {
        self.title_rows == 0
            && self.footer_rows == 0
            && self.total_rows == 0
            && self.dropped_columns.is_empty()
            && self.repaired_cells == 0
    }
}

/// Removes report titles from raw records that precede the header row.
///
/// Only the first `title_scan_rows` records are inspected, and scanning stops
/// at the first record with three or more filled cells. A title has one or two
/// filled cells matching a title pattern. Returns how many were removed.
pub fn strip_title_rows(records: &mut Vec<Vec<String>>, rules: &CleaningRules) -> usize {
    let mut titles = Vec::new();
    for (idx, record) in records.iter().enumerate().take(rules.title_scan_rows) {
        let filled = record
            .iter()
            .map(|field| field.trim())
            .filter(|field| !field.is_empty())
            .collect::<Vec<_>>();
        if filled.len() >= 3 {
            break;
        }
        if !filled.is_empty() && matches_any(&rules.title, &filled.join(" ")) {
            titles.push(idx);
        }
    }
    for idx in titles.iter().rev() {
        records.remove(*idx);
    }
    if !titles.is_empty() {
        debug!("Stripped {} title row(s) above the header", titles.len());
    }
    titles.len()
}

/// Re-decodes text that was UTF-8 read as Windows-1252 (`DescriÃ§Ã£o`).
///
/// Text is returned unchanged unless it contains a typical mojibake lead
/// character and round-trips to valid, different UTF-8.
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    if !text.contains(['Ã', 'Â', 'â']) {
        return Cow::Borrowed(text);
    }
    let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
    if unmappable {
        return Cow::Borrowed(text);
    }
    match std::str::from_utf8(&bytes) {
        Ok(fixed) if fixed != text => Cow::Owned(fixed.to_string()),
        _ => Cow::Borrowed(text),
    }
}

/// First non-blank cell of a row, as the text a label pattern is tested on.
fn leading_label(row: &Row) -> Option<String> {
    row.values()
        .find(|value| !value.is_blank())
        .map(|value| value.as_display().trim().to_string())
}

fn repair_dataset_text(dataset: Dataset, report: &mut CleaningReport) -> Dataset {
    let repaired = dataset
        .columns
        .iter()
        .map(|column| {
            let fixed = repair_mojibake(column);
            if let Cow::Owned(_) = fixed {
                report.repaired_cells += 1;
            }
            fixed.into_owned()
        })
        .collect::<Vec<_>>();
    let columns = unique_column_names(&repaired);
    let renames: HashMap<&str, &str> = dataset
        .columns
        .iter()
        .map(String::as_str)
        .zip(columns.iter().map(String::as_str))
        .collect();

    let rows = dataset
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(key, value)| {
                    let key = match renames.get(key.as_str()) {
                        Some(renamed) => renamed.to_string(),
                        None => repair_mojibake(key).into_owned(),
                    };
                    let value = match value {
                        Value::Text(text) => match repair_mojibake(text) {
                            Cow::Owned(fixed) => {
                                report.repaired_cells += 1;
                                Value::Text(fixed)
                            }
                            Cow::Borrowed(_) => value.clone(),
                        },
                        other => other.clone(),
                    };
                    (key, value)
                })
                .collect::<Row>()
        })
        .collect();
    Dataset::new(columns, rows)
}

/// Applies the row and column clean-up to a loaded dataset.
pub fn clean_dataset(dataset: Dataset, rules: &CleaningRules) -> (Dataset, CleaningReport) {
    let mut report = CleaningReport::default();
    let mut dataset = if rules.repair_mojibake {
        repair_dataset_text(dataset, &mut report)
    } else {
        dataset
    };

    if dataset.rows.len() >= 3 {
        let floor = dataset.rows.len().saturating_sub(rules.footer_scan_rows);
        while dataset.rows.len() > floor {
            let is_footer = dataset
                .rows
                .last()
                .and_then(leading_label)
                .is_some_and(|label| matches_any(&rules.footer, &label));
            if !is_footer {
                break;
            }
            dataset.rows.pop();
            report.footer_rows += 1;
        }
    }

    let before = dataset.rows.len();
    dataset.rows.retain(|row| {
        !leading_label(row).is_some_and(|label| matches_any(&rules.total, &label))
    });
    report.total_rows = before - dataset.rows.len();

    if !dataset.rows.is_empty() {
        let total = dataset.rows.len() as f64;
        let sparse = dataset
            .columns
            .iter()
            .filter(|column| {
                let present = dataset.rows.iter().any(|row| row.contains_key(column.as_str()));
                let filled = dataset
                    .rows
                    .iter()
                    .filter(|row| row.get(column.as_str()).is_some_and(|value| !value.is_blank()))
                    .count();
                present && filled as f64 / total <= rules.min_column_fill
            })
            .cloned()
            .collect::<Vec<_>>();
        if !sparse.is_empty() && sparse.len() < dataset.columns.len() {
            dataset.columns.retain(|column| !sparse.contains(column));
            for row in &mut dataset.rows {
                for column in &sparse {
                    row.shift_remove(column.as_str());
                }
            }
            report.dropped_columns = sparse;
        }
    }

    if !report.is_empty() {
        debug!(
            "Clean-up removed {} footer row(s), {} total row(s), column(s) [{}]; {} cell(s) re-decoded",
            report.footer_rows,
            report.total_rows,
            report.dropped_columns.iter().join(", "),
            report.repaired_cells
        );
    }
    (dataset, report)
}
