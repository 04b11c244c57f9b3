use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::{DomainTieBreak, SheetsenseConfig, contains_any},
    data::Row,
    profile::{self, ColumnKind, ColumnProfile},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Sales,
    Inventory,
    Overtime,
    Unknown,
}

impl Domain {
    /// Scored domains in declaration order.
    pub const SCORED: [Domain; 3] = [Domain::Sales, Domain::Inventory, Domain::Overtime];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Sales => "sales",
            Domain::Inventory => "inventory",
            Domain::Overtime => "overtime",
            Domain::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainScore {
    pub domain: Domain,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub domain: Domain,
    pub date_column: Option<String>,
    pub value_column: Option<String>,
    pub category_column: Option<String>,
    pub quantity_column: Option<String>,
    pub scores: Vec<DomainScore>,
}

/// Classifies the dataset into a business domain and picks its role columns.
pub fn classify(rows: &[Row], columns: &[String], config: &SheetsenseConfig) -> DatasetProfile {
    let profiles = profile::profile_columns(rows, columns, config);
    classify_with_profiles(rows, columns, &profiles, config)
}

/// Same as [`classify`] but reuses column profiles computed by the caller.
pub fn classify_with_profiles(
    rows: &[Row],
    columns: &[String],
    profiles: &[ColumnProfile],
    config: &SheetsenseConfig,
) -> DatasetProfile {
    let corpus = build_corpus(rows, columns, config.thresholds.classification_sample_rows);
    let scores = score_domains(&corpus, config);
    let domain = pick_domain(&scores, config.thresholds.domain_tie_break);
    debug!(
        "Domain scores {}; classified as {domain}",
        scores
            .iter()
            .map(|score| format!("{}={}", score.domain, score.hits))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let roles = &config.keywords.roles;
    DatasetProfile {
        row_count: rows.len(),
        column_count: columns.len(),
        domain,
        date_column: pick_role(profiles, ColumnKind::Date, &roles.date),
        value_column: pick_role(profiles, ColumnKind::Numeric, &roles.value),
        category_column: pick_role(profiles, ColumnKind::Text, &roles.category),
        quantity_column: pick_role(profiles, ColumnKind::Numeric, &roles.quantity),
        scores,
    }
}

fn build_corpus(rows: &[Row], columns: &[String], sample_rows: usize) -> String {
    let mut parts = columns.to_vec();
    for row in rows.iter().take(sample_rows) {
        parts.extend(
            row.values()
                .filter(|value| !value.is_blank())
                .map(|value| value.as_display()),
        );
    }
    parts.join(" ").to_lowercase()
}

fn score_domains(corpus: &str, config: &SheetsenseConfig) -> Vec<DomainScore> {
    let domains = &config.keywords.domains;
    Domain::SCORED
        .into_iter()
        .map(|domain| {
            let keywords: &[String] = match domain {
                Domain::Sales => &domains.sales,
                Domain::Inventory => &domains.inventory,
                Domain::Overtime => &domains.overtime,
                Domain::Unknown => &[],
            };
            let hits = keywords
                .iter()
                .filter(|keyword| !keyword.is_empty() && corpus.contains(keyword.as_str()))
                .count();
            DomainScore { domain, hits }
        })
        .collect()
}

fn pick_domain(scores: &[DomainScore], tie_break: DomainTieBreak) -> Domain {
    let best = scores.iter().map(|score| score.hits).max().unwrap_or(0);
    if best == 0 {
        return Domain::Unknown;
    }
    let mut leaders = scores.iter().filter(|score| score.hits == best);
    let Some(first) = leaders.next() else {
        return Domain::Unknown;
    };
    match (leaders.next(), tie_break) {
        (None, _) | (Some(_), DomainTieBreak::FirstDeclared) => first.domain,
        (Some(_), DomainTieBreak::Unknown) => Domain::Unknown,
    }
}

fn pick_role(profiles: &[ColumnProfile], kind: ColumnKind, keywords: &[String]) -> Option<String> {
    let candidates = profile::columns_of_kind(profiles, kind);
    candidates
        .iter()
        .find(|name| contains_any(&name.to_lowercase(), keywords))
        .or_else(|| candidates.first())
        .map(|name| name.to_string())
}
