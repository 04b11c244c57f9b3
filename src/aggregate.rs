//! Grouping rows into chart points and ordering them for display.
//!
//! [`build_chart_data`] is the plain reduction;
//! [`sort_chart_points`] applies the display policy: chronological for date
//! keys, top-N plus "Others" for wide categorical breakdowns, and original
//! appearance order for small ones.

use std::{cmp::Ordering, collections::HashMap, fmt, str::FromStr};

use anyhow::{Error, anyhow};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    coerce,
    config::SheetsenseConfig,
    data::{EMPTY_LABEL, Row, Value, format_plain_number},
};

pub const OTHERS_LABEL: &str = "Others";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Sum,
    Avg,
    Count,
}

impl FromStr for AggregationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" | "total" => Ok(AggregationKind::Sum),
            "avg" | "mean" | "average" => Ok(AggregationKind::Avg),
            "count" => Ok(AggregationKind::Count),
            other => Err(anyhow!(
                "Unknown aggregation '{other}' (expected sum, avg, or count)"
            )),
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Count => "count",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub group_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_key: Option<String>,
    pub kind: AggregationKind,
}

impl AggregationSpec {
    pub fn new(group_key: impl Into<String>, value_key: Option<&str>, kind: AggregationKind) -> Self {
        Self {
            group_key: group_key.into(),
            value_key: value_key.map(str::to_string),
            kind,
        }
    }

    pub fn count(group_key: impl Into<String>) -> Self {
        Self::new(group_key, None, AggregationKind::Count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

impl ChartPoint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Display label used to bucket a cell; equal calendar dates share a label
/// whatever their source encoding.
pub fn group_name(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return EMPTY_LABEL.to_string();
    };
    if value.is_blank() {
        return EMPTY_LABEL.to_string();
    }
    if coerce::is_probably_date(value)
        && let Some(date) = coerce::to_date(value)
    {
        return coerce::format_date(date);
    }
    match value {
        Value::Number(n) => format_plain_number(*n),
        Value::Text(s) => s.trim().to_string(),
        other => other.as_display(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupAccumulator {
    count: usize,
    sum: f64,
}

impl GroupAccumulator {
    fn reduce(&self, kind: AggregationKind) -> f64 {
        match kind {
            AggregationKind::Count => self.count as f64,
            AggregationKind::Sum => self.sum,
            AggregationKind::Avg => {
                if self.count == 0 {
                    0.0
                } else {
                    self.sum / self.count as f64
                }
            }
        }
    }
}

/// Groups `rows` by `spec.group_key` and reduces each group to one point.
///
/// The returned order carries no meaning; see [`sort_chart_points`].
pub fn build_chart_data(
    rows: &[Row],
    spec: &AggregationSpec,
    config: &SheetsenseConfig,
) -> Vec<ChartPoint> {
    let locale = config.thresholds.number_locale;
    let mut groups: IndexMap<String, GroupAccumulator> = IndexMap::new();
    for row in rows {
        let name = group_name(row.get(&spec.group_key));
        let entry = groups.entry(name).or_default();
        entry.count += 1;
        if spec.kind != AggregationKind::Count
            && let Some(value_key) = &spec.value_key
            && let Some(value) = row.get(value_key)
        {
            entry.sum += coerce::to_number_with(value, locale);
        }
    }
    groups
        .into_iter()
        .map(|(name, acc)| ChartPoint::new(name, acc.reduce(spec.kind)))
        .collect()
}

fn compare_values_desc(a: &ChartPoint, b: &ChartPoint) -> Ordering {
    b.value.total_cmp(&a.value)
}

/// Orders and truncates aggregated points for display.
///
/// The first row's group-key value decides whether the series is treated as
/// a timeline.
pub fn sort_chart_points(
    mut points: Vec<ChartPoint>,
    rows: &[Row],
    group_key: &str,
    config: &SheetsenseConfig,
) -> Vec<ChartPoint> {
    if points.is_empty() {
        return points;
    }
    let t = &config.thresholds;
    let date_like = rows
        .first()
        .and_then(|row| row.get(group_key))
        .is_some_and(coerce::is_probably_date);

    if date_like {
        debug!("Sorting {} point(s) chronologically", points.len());
        points.sort_by_cached_key(|point| {
            let date = coerce::to_date(&Value::text(point.name.as_str()));
            (date.is_none(), date)
        });
        points.truncate(t.max_date_points);
        return points;
    }

    if points.len() > t.max_categorical_points {
        debug!(
            "Collapsing {} categorical point(s) into top {} plus '{OTHERS_LABEL}'",
            points.len(),
            t.max_categorical_points.saturating_sub(1)
        );
        points.sort_by(compare_values_desc);
        let keep = t.max_categorical_points.saturating_sub(1);
        let others: f64 = points[keep..].iter().map(|point| point.value).sum();
        points.truncate(keep);
        if others > 0.0 {
            points.push(ChartPoint::new(OTHERS_LABEL, others));
        }
        points.truncate(t.max_categorical_points);
        return points;
    }

    let mut first_seen: HashMap<String, usize> = HashMap::with_capacity(points.len());
    for (idx, row) in rows.iter().enumerate() {
        first_seen
            .entry(group_name(row.get(group_key)))
            .or_insert(idx);
    }
    points.sort_by_key(|point| first_seen.get(&point.name).copied().unwrap_or(usize::MAX));
    points.truncate(t.max_date_points);
    points
}

/// Aggregates and orders in one step.
pub fn chart_series(
    rows: &[Row],
    spec: &AggregationSpec,
    config: &SheetsenseConfig,
) -> Vec<ChartPoint> {
    let points = build_chart_data(rows, spec, config);
    sort_chart_points(points, rows, &spec.group_key, config)
}
