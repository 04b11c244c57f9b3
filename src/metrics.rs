//! Domain KPI menus.
//!
//! Each domain gets a fixed list of metrics computed from the role columns
//! the classifier picked. Totals that have a date column are compared period
//! over period by splitting the dated rows in half chronologically.

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    classify::{DatasetProfile, Domain},
    coerce,
    config::{NumberLocale, SheetsenseConfig, Thresholds, contains_any},
    data::Row,
    format::DisplayFormat,
    profile::{self, ColumnKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub percent_change: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub label: String,
    pub value: MetricValue,
    pub format: DisplayFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
    pub insight: String,
}

impl Metric {
    fn number(id: &str, label: impl Into<String>, value: f64, format: DisplayFormat) -> Self {
        Self {
            id: id.to_string(),
            label: label.into(),
            value: MetricValue::Number(round2(value)),
            format,
            comparison: None,
            insight: String::new(),
        }
    }

    fn text(id: &str, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            label: label.into(),
            value: MetricValue::Text(value.into()),
            format: DisplayFormat::Text,
            comparison: None,
            insight: String::new(),
        }
    }

    fn with_insight(mut self, insight: impl Into<String>) -> Self {
        self.insight = insight.into();
        self
    }

    /// Attaches a comparison and the matching comparative sentence, or keeps
    /// `fallback` when there is nothing to compare against.
    fn compared(
        mut self,
        comparison: Option<Comparison>,
        thresholds: &Thresholds,
        fallback: impl Into<String>,
    ) -> Self {
        self.insight = match comparison {
            Some(comparison) => comparison_insight(&self.label, comparison, thresholds),
            None => fallback.into(),
        };
        self.comparison = comparison;
        self
    }

    /// Value rendered with the metric's display format.
    pub fn display_value(&self) -> String {
        match &self.value {
            MetricValue::Number(n) => self.format.render(*n),
            MetricValue::Text(s) => s.clone(),
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        0.0
    }
}

fn comparison_insight(label: &str, comparison: Comparison, thresholds: &Thresholds) -> String {
    let change = comparison.percent_change;
    let magnitude = DisplayFormat::Percentage.render(change.abs());
    if change < thresholds.sharp_drop_threshold {
        format!(
            "{label} dropped sharply by {magnitude} versus the previous period; immediate review recommended."
        )
    } else if change < 0.0 {
        format!("{label} declined slightly by {magnitude} versus the previous period.")
    } else if change == 0.0 {
        format!("{label} remained stable versus the previous period.")
    } else if change > thresholds.strong_growth_threshold {
        format!("{label} grew strongly by {magnitude} versus the previous period.")
    } else {
        format!("{label} grew moderately by {magnitude} versus the previous period.")
    }
}

/// Sums `value_column` over the older and newer halves of the dated rows.
///
/// Rows whose date does not parse are ignored; equal dates keep their row
/// order. Returns `None` when the older half sums to zero.
pub fn period_comparison(
    rows: &[Row],
    date_column: &str,
    value_column: &str,
    locale: NumberLocale,
) -> Option<Comparison> {
    let dated = rows
        .iter()
        .filter_map(|row| {
            let date = row.get(date_column).and_then(coerce::to_date)?;
            let value = row
                .get(value_column)
                .map(|value| coerce::to_number_with(value, locale))
                .unwrap_or(0.0);
            Some((date, value))
        })
        .sorted_by_key(|(date, _)| *date)
        .collect::<Vec<_>>();
    let (previous, current) = dated.split_at(dated.len() / 2);
    let previous: f64 = previous.iter().map(|(_, value)| value).sum();
    let current: f64 = current.iter().map(|(_, value)| value).sum();
    if previous == 0.0 {
        return None;
    }
    let percent_change = round2((current - previous) / previous * 100.0);
    let trend = if percent_change > 0.0 {
        Trend::Up
    } else if percent_change < 0.0 {
        Trend::Down
    } else {
        Trend::Neutral
    };
    debug!("Period comparison on '{value_column}': {previous} -> {current} ({percent_change}%)");
    Some(Comparison {
        percent_change,
        trend,
    })
}

/// Computes the KPI menu for the profiled domain.
pub fn generate_metrics(
    rows: &[Row],
    profile: &DatasetProfile,
    config: &SheetsenseConfig,
) -> Vec<Metric> {
    let metrics = match profile.domain {
        Domain::Sales => sales_metrics(rows, profile, config),
        Domain::Inventory => inventory_metrics(rows, profile, config),
        Domain::Overtime => overtime_metrics(rows, profile, config),
        Domain::Unknown => generic_metrics(rows, profile, config),
    };
    debug!(
        "Generated {} metric(s) for domain {}",
        metrics.len(),
        profile.domain
    );
    metrics
}

struct ColumnReader<'a> {
    rows: &'a [Row],
    locale: NumberLocale,
}

impl<'a> ColumnReader<'a> {
    fn numbers(&self, column: Option<&str>) -> Vec<f64> {
        let Some(column) = column else {
            return vec![0.0; self.rows.len()];
        };
        self.rows
            .iter()
            .map(|row| {
                row.get(column)
                    .map(|value| coerce::to_number_with(value, self.locale))
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Non-blank labels of `column` in row order.
    fn labels(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|value| !value.is_blank())
            .map(|value| value.as_display().trim().to_string())
            .collect()
    }

    fn distinct_labels(&self, column: Option<&str>) -> Option<usize> {
        column.map(|column| self.labels(column).into_iter().unique().count())
    }

    fn distinct_days(&self, column: &str) -> usize {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(coerce::to_date))
            .unique()
            .count()
    }

    fn comparison(&self, date: Option<&str>, value: Option<&str>) -> Option<Comparison> {
        period_comparison(self.rows, date?, value?, self.locale)
    }
}

/// Group with the largest weight; ties keep the first group seen.
fn leading_group(groups: &IndexMap<String, f64>) -> Option<(&str, f64)> {
    groups
        .iter()
        .fold(None, |best: Option<(&str, f64)>, (name, weight)| match best {
            Some((_, best_weight)) if *weight <= best_weight => best,
            _ => Some((name.as_str(), *weight)),
        })
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

fn sales_metrics(rows: &[Row], profile: &DatasetProfile, config: &SheetsenseConfig) -> Vec<Metric> {
    let t = &config.thresholds;
    let reader = ColumnReader {
        rows,
        locale: t.number_locale,
    };
    let value_column = profile.value_column.as_deref();
    let values = reader.numbers(value_column);
    let total: f64 = values.iter().sum();
    let count = rows.len();
    let ticket = average(total, count);
    let max = values.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let currency = DisplayFormat::Currency;

    let mut metrics = vec![
        Metric::number("total_sales", "Total Sales", total, currency).compared(
            reader.comparison(profile.date_column.as_deref(), value_column),
            t,
            format!("Total sales reached {}.", currency.render(total)),
        ),
        Metric::number(
            "transaction_count",
            "Transactions",
            count as f64,
            DisplayFormat::Number,
        )
        .with_insight(format!("{count} transaction(s) recorded.")),
        Metric::number("average_ticket", "Average Ticket", ticket, currency).with_insight(
            format!("Each transaction averages {}.", currency.render(ticket)),
        ),
        Metric::number("max_sale", "Largest Sale", max, currency)
            .with_insight(format!("The largest single sale was {}.", currency.render(max))),
    ];

    if let Some(date_column) = profile.date_column.as_deref() {
        let days = reader.distinct_days(date_column);
        if days > 0 {
            let daily = total / days as f64;
            metrics.push(
                Metric::number("daily_average", "Daily Average", daily, currency).with_insight(
                    format!(
                        "Sales average {} per day over {days} day(s).",
                        currency.render(daily)
                    ),
                ),
            );
        }
    }

    if let Some(category_column) = profile.category_column.as_deref() {
        let mut frequency: IndexMap<String, f64> = IndexMap::new();
        for label in reader.labels(category_column) {
            *frequency.entry(label).or_default() += 1.0;
        }
        metrics.push(
            Metric::number(
                "category_count",
                format!("Distinct {category_column}"),
                frequency.len() as f64,
                DisplayFormat::Number,
            )
            .with_insight(format!(
                "{} distinct value(s) in {category_column}.",
                frequency.len()
            )),
        );
        if let Some((leader, hits)) = leading_group(&frequency) {
            metrics.push(
                Metric::text("top_category", format!("Top {category_column}"), leader)
                    .with_insight(format!(
                        "{leader} is the most frequent {category_column} with {hits} sale(s)."
                    )),
            );
        }
    }

    if let Some((revenue_column, cost_column)) = financial_columns(rows, config) {
        let revenue: f64 = reader.numbers(Some(&revenue_column)).iter().sum();
        let cost: f64 = reader.numbers(Some(&cost_column)).iter().sum();
        let profit = revenue - cost;
        let margin = if revenue > 0.0 {
            profit / revenue * 100.0
        } else {
            0.0
        };
        let percentage = DisplayFormat::Percentage;
        metrics.push(
            Metric::number("gross_profit", "Gross Profit", profit, currency).with_insight(format!(
                "Gross profit ({revenue_column} minus {cost_column}) is {}.",
                currency.render(round2(profit))
            )),
        );
        metrics.push(
            Metric::number("gross_margin", "Gross Margin", margin, percentage).with_insight(
                format!(
                    "Gross margin is {} of {revenue_column}.",
                    percentage.render(round2(margin))
                ),
            ),
        );
    }

    if ticket > t.high_ticket_threshold {
        metrics.push(
            Metric::text("ticket_profile", "Ticket Profile", "High ticket").with_insight(format!(
                "Average ticket above {} indicates a high-ticket operation.",
                currency.render(t.high_ticket_threshold)
            )),
        );
    }
    metrics
}

fn inventory_metrics(
    rows: &[Row],
    profile: &DatasetProfile,
    config: &SheetsenseConfig,
) -> Vec<Metric> {
    let t = &config.thresholds;
    let reader = ColumnReader {
        rows,
        locale: t.number_locale,
    };
    let quantity_column = profile
        .quantity_column
        .as_deref()
        .or(profile.value_column.as_deref());
    let quantities = reader.numbers(quantity_column);
    let total: f64 = quantities.iter().sum();
    let mean = average(total, quantities.len());
    let low_stock = quantities
        .iter()
        .filter(|quantity| **quantity < mean * t.low_stock_ratio)
        .count();
    let items = reader
        .distinct_labels(profile.category_column.as_deref())
        .unwrap_or(rows.len());
    let number = DisplayFormat::Number;

    let mut metrics = vec![
        Metric::number("total_quantity", "Total Quantity", total, number).compared(
            reader.comparison(profile.date_column.as_deref(), quantity_column),
            t,
            format!("{} unit(s) in stock.", number.render(total)),
        ),
        Metric::number("low_stock_count", "Low Stock Items", low_stock as f64, number)
            .with_insight(format!(
                "{low_stock} item(s) below {} of the average quantity.",
                DisplayFormat::Percentage.render(t.low_stock_ratio * 100.0)
            )),
        Metric::number("distinct_items", "Distinct Items", items as f64, number)
            .with_insight(format!("{items} distinct item(s) tracked.")),
    ];

    if let Some(category_column) = profile.category_column.as_deref() {
        let mut accumulated: IndexMap<String, f64> = IndexMap::new();
        for (row, quantity) in rows.iter().zip(&quantities) {
            let Some(value) = row.get(category_column).filter(|value| !value.is_blank()) else {
                continue;
            };
            *accumulated
                .entry(value.as_display().trim().to_string())
                .or_default() += quantity;
        }
        if let Some((leader, quantity)) = leading_group(&accumulated) {
            let share = if total == 0.0 {
                0.0
            } else {
                quantity / total * 100.0
            };
            metrics.push(
                Metric::text("top_category", format!("Top {category_column}"), leader)
                    .with_insight(format!(
                        "{leader} holds {} of the total quantity.",
                        DisplayFormat::Percentage.render(round2(share))
                    )),
            );
        }
    }

    let turnover = if mean == 0.0 { 0.0 } else { total / mean };
    let bucket = if turnover < t.turnover_low {
        "low"
    } else if turnover > t.turnover_high {
        "high"
    } else {
        "medium"
    };
    metrics.push(
        Metric::text("turnover", "Turnover", bucket).with_insight(format!(
            "Turnover index of {} is {bucket}.",
            number.render(round2(turnover))
        )),
    );
    metrics
}

/// First numeric column whose name contains one of `keywords`.
fn numeric_column_named(
    rows: &[Row],
    keywords: &[String],
    skip: Option<&str>,
    config: &SheetsenseConfig,
) -> Option<String> {
    let first = rows.first()?;
    first
        .keys()
        .filter(|name| Some(name.as_str()) != skip)
        .find(|name| {
            contains_any(&name.to_lowercase(), keywords)
                && profile::infer_column_kind(
                    rows,
                    name,
                    config.thresholds.type_sample_rows,
                    config,
                ) == ColumnKind::Numeric
        })
        .cloned()
}

fn hours_column(rows: &[Row], config: &SheetsenseConfig) -> Option<String> {
    numeric_column_named(rows, &config.keywords.roles.hours, None, config)
}

/// Revenue and cost columns, when both exist as distinct numeric columns.
fn financial_columns(rows: &[Row], config: &SheetsenseConfig) -> Option<(String, String)> {
    let roles = &config.keywords.roles;
    let revenue = numeric_column_named(rows, &roles.revenue, None, config)?;
    let cost = numeric_column_named(rows, &roles.cost, Some(&revenue), config)?;
    Some((revenue, cost))
}

fn overtime_metrics(
    rows: &[Row],
    profile: &DatasetProfile,
    config: &SheetsenseConfig,
) -> Vec<Metric> {
    let t = &config.thresholds;
    let reader = ColumnReader {
        rows,
        locale: t.number_locale,
    };
    let hours_column = hours_column(rows, config).or_else(|| profile.value_column.clone());
    let hours = reader.numbers(hours_column.as_deref());
    let total: f64 = hours.iter().sum();
    let collaborators = reader
        .distinct_labels(profile.category_column.as_deref())
        .unwrap_or(rows.len());
    let per_collaborator = average(total, collaborators);
    let comparison = reader.comparison(profile.date_column.as_deref(), hours_column.as_deref());
    let number = DisplayFormat::Number;

    let (impact, impact_insight) = match comparison {
        Some(c) if c.percent_change > t.attention_growth_threshold => (
            "Attention",
            format!(
                "Overtime grew more than {} versus the previous period.",
                DisplayFormat::Percentage.render(t.attention_growth_threshold)
            ),
        ),
        Some(c) if c.trend == Trend::Down => (
            "Positive reduction",
            "Overtime is falling versus the previous period.".to_string(),
        ),
        _ => ("Controlled", "Overtime is under control.".to_string()),
    };

    vec![
        Metric::number("total_hours", "Total Hours", total, number).compared(
            comparison,
            t,
            format!("{} overtime hour(s) recorded.", number.render(round2(total))),
        ),
        Metric::number(
            "average_hours_per_collaborator",
            "Average Hours per Collaborator",
            per_collaborator,
            number,
        )
        .with_insight(format!(
            "Each collaborator averages {} hour(s).",
            number.render(round2(per_collaborator))
        )),
        Metric::number(
            "collaborator_count",
            "Collaborators",
            collaborators as f64,
            number,
        )
        .with_insight(format!("{collaborators} collaborator(s) with overtime.")),
        Metric::text("operational_impact", "Operational Impact", impact)
            .with_insight(impact_insight),
    ]
}

fn generic_metrics(rows: &[Row], profile: &DatasetProfile, config: &SheetsenseConfig) -> Vec<Metric> {
    let number = DisplayFormat::Number;
    let mut metrics = vec![
        Metric::number("record_count", "Records", rows.len() as f64, number)
            .with_insight(format!("{} record(s) loaded.", rows.len())),
        Metric::number(
            "column_count",
            "Columns",
            profile.column_count as f64,
            number,
        )
        .with_insight(format!("{} column(s) detected.", profile.column_count)),
    ];
    if let Some(value_column) = profile.value_column.as_deref() {
        let reader = ColumnReader {
            rows,
            locale: config.thresholds.number_locale,
        };
        let total: f64 = reader.numbers(Some(value_column)).iter().sum();
        let mean = average(total, rows.len());
        metrics.push(
            Metric::number("value_total", format!("Total {value_column}"), total, number)
                .with_insight(format!(
                    "{value_column} adds up to {}.",
                    number.render(round2(total))
                )),
        );
        metrics.push(
            Metric::number(
                "value_average",
                format!("Average {value_column}"),
                mean,
                number,
            )
            .with_insight(format!(
                "{value_column} averages {} per record.",
                number.render(round2(mean))
            )),
        );
    }
    metrics
}
