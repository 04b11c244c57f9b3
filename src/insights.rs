//! Natural-language observations about a dataset.
//!
//! Insights are produced by a fixed sequence of passes (structure, quality,
//! column types, temporal range, business rules) and the concatenated list is
//! cut to `max_insights` in that order.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::ChartPoint,
    coerce,
    config::SheetsenseConfig,
    data::{Row, format_plain_number},
    metrics::{Metric, MetricValue, round2},
    profile::{self, ColumnKind},
};

/// A chart computed outside the core, e.g. by the automation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalChart {
    pub title: String,
    #[serde(default)]
    pub data: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalMetric {
    pub label: String,
    pub value: MetricValue,
    #[serde(default)]
    pub change: Option<f64>,
}

impl From<&Metric> for ExternalMetric {
    fn from(metric: &Metric) -> Self {
        Self {
            label: metric.label.clone(),
            value: metric.value.clone(),
            change: metric
                .comparison
                .map(|comparison| comparison.percent_change),
        }
    }
}

pub fn generate_insights(
    rows: &[Row],
    columns: &[String],
    charts: &[ExternalChart],
    metrics: &[ExternalMetric],
    config: &SheetsenseConfig,
) -> Vec<String> {
    let mut insights = vec![format!(
        "The dataset has {} row(s) and {} column(s).",
        rows.len(),
        columns.len()
    )];
    if rows.is_empty() || columns.is_empty() {
        insights.push("Insufficient data for a detailed analysis.".to_string());
        return insights;
    }

    insights.push(completeness_insight(rows, columns));

    let t = &config.thresholds;
    let profiles =
        profile::profile_columns_with_sample(rows, columns, t.insight_type_sample_rows, config);
    let numeric = profile::columns_of_kind(&profiles, ColumnKind::Numeric);
    if !numeric.is_empty() {
        let shown = numeric
            .iter()
            .take(t.insight_numeric_columns)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        let more = if numeric.len() > t.insight_numeric_columns {
            ", ..."
        } else {
            ""
        };
        insights.push(format!("Numeric columns: {shown}{more}."));
    }

    if let Some(range) = temporal_range(rows, profile::columns_of_kind(&profiles, ColumnKind::Date))
    {
        insights.push(range);
    }

    business_rules(charts, metrics, config, &mut insights);

    if insights.len() > t.max_insights {
        debug!(
            "Truncating {} insight(s) to {}",
            insights.len(),
            t.max_insights
        );
        insights.truncate(t.max_insights);
    }
    insights
}

fn completeness_insight(rows: &[Row], columns: &[String]) -> String {
    let total = rows.len() * columns.len();
    let empty = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .filter(|column| row.get(*column).is_none_or(|value| value.is_blank()))
                .count()
        })
        .sum::<usize>();
    let completeness = (total - empty) as f64 / total as f64 * 100.0;
    format!("Data completeness: {}%.", completeness.round())
}

fn temporal_range(rows: &[Row], date_columns: Vec<&str>) -> Option<String> {
    date_columns.into_iter().find_map(|column| {
        let mut dates = rows
            .iter()
            .filter_map(|row| row.get(column).and_then(coerce::to_date));
        let first = dates.next()?;
        let (earliest, latest, count) = dates.fold((first, first, 1usize), |(lo, hi, n), date| {
            (lo.min(date), hi.max(date), n + 1)
        });
        (count >= 2).then(|| {
            format!(
                "Period covered by {column}: {} to {}.",
                coerce::format_date(earliest),
                coerce::format_date(latest)
            )
        })
    })
}

fn business_rules(
    charts: &[ExternalChart],
    metrics: &[ExternalMetric],
    config: &SheetsenseConfig,
    insights: &mut Vec<String>,
) {
    let t = &config.thresholds;
    for chart in charts {
        let total: f64 = chart.data.iter().map(|point| point.value).sum();
        if total <= 0.0 {
            continue;
        }
        let Some(top) = chart
            .data
            .iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))
        else {
            continue;
        };
        let share = top.value / total;
        if share > t.concentration_threshold {
            insights.push(format!(
                "Concentration alert: {} accounts for {}% of {}.",
                top.name,
                (share * 100.0).round(),
                chart.title
            ));
        }
    }

    for metric in metrics {
        let Some(change) = metric.change else {
            continue;
        };
        let magnitude = format_plain_number(round2(change.abs()));
        if change < t.critical_drop_threshold {
            insights.push(format!(
                "Critical drop: {} fell {magnitude}% versus the previous period.",
                metric.label
            ));
        } else if change > t.excellent_growth_threshold {
            insights.push(format!(
                "Excellent performance: {} grew {magnitude}% versus the previous period.",
                metric.label
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn grid(rows: usize, columns: &[&str]) -> (Vec<Row>, Vec<String>) {
        let names = columns.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let rows = (0..rows)
            .map(|idx| {
                names
                    .iter()
                    .map(|name| (name.clone(), Value::text(format!("v{idx}"))))
                    .collect()
            })
            .collect();
        (rows, names)
    }

    fn chart(title: &str, values: &[f64]) -> ExternalChart {
        ExternalChart {
            title: title.to_string(),
            data: values
                .iter()
                .enumerate()
                .map(|(idx, value)| ChartPoint::new(format!("P{idx}"), *value))
                .collect(),
        }
    }

    fn metric(label: &str, change: Option<f64>) -> ExternalMetric {
        ExternalMetric {
            label: label.to_string(),
            value: MetricValue::Number(1.0),
            change,
        }
    }

    #[test]
    fn empty_dataset_stops_after_warning() {
        let insights = generate_insights(&[], &[], &[], &[], &SheetsenseConfig::default());
        assert_eq!(insights.len(), 2);
        assert!(insights[1].contains("Insufficient data"));
    }

    #[test]
    fn completeness_rounds_half_up() {
        let (mut rows, columns) = grid(10, &["A", "B", "C", "D"]);
        for (idx, row) in rows.iter_mut().take(5).enumerate() {
            row.insert(columns[idx % 4].clone(), Value::Null);
        }
        let insights = generate_insights(&rows, &columns, &[], &[], &SheetsenseConfig::default());
        assert_eq!(insights[1], "Data completeness: 88%.");
    }

    #[test]
    fn missing_keys_count_as_empty() {
        let (mut rows, columns) = grid(2, &["A", "B"]);
        rows[0].shift_remove("B");
        let insights = generate_insights(&rows, &columns, &[], &[], &SheetsenseConfig::default());
        assert_eq!(insights[1], "Data completeness: 75%.");
    }

    #[test]
    fn numeric_columns_are_capped_with_ellipsis() {
        let names = ["N1", "N2", "N3", "N4", "N5", "Nome"];
        let rows = (0..5)
            .map(|idx| {
                names
                    .iter()
                    .map(|name| {
                        let value = if *name == "Nome" {
                            Value::text("x")
                        } else {
                            Value::Number(idx as f64)
                        };
                        (name.to_string(), value)
                    })
                    .collect()
            })
            .collect::<Vec<Row>>();
        let columns = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let insights = generate_insights(&rows, &columns, &[], &[], &SheetsenseConfig::default());
        assert_eq!(insights[2], "Numeric columns: N1, N2, N3, N4, ....");
    }

    #[test]
    fn temporal_range_uses_locale_dates() {
        let rows = ["2024-03-10", "05/01/2024", "2024-02-01", "sem data"]
            .iter()
            .map(|date| Row::from_iter([("Data".to_string(), Value::text(*date))]))
            .collect::<Vec<_>>();
        let insights = generate_insights(
            &rows,
            &["Data".to_string()],
            &[],
            &[],
            &SheetsenseConfig::default(),
        );
        assert!(
            insights
                .iter()
                .any(|line| line == "Period covered by Data: 05/01/2024 to 10/03/2024."),
            "{insights:?}"
        );
    }

    #[test]
    fn concentration_threshold_is_strict() {
        let (rows, columns) = grid(1, &["A"]);
        let config = SheetsenseConfig::default();
        let hot = chart("Sales by Region", &[45.0, 30.0, 25.0]);
        let insights = generate_insights(&rows, &columns, &[hot], &[], &config);
        let alert = insights.last().unwrap();
        assert!(alert.contains("45%"));
        assert!(alert.contains("Sales by Region"));

        let even = chart("Even", &[40.0, 30.0, 30.0]);
        let insights = generate_insights(&rows, &columns, &[even], &[], &config);
        assert!(insights.iter().all(|line| !line.contains("Concentration")));
    }

    #[test]
    fn metric_change_alerts_are_strict() {
        let (rows, columns) = grid(1, &["A"]);
        let config = SheetsenseConfig::default();
        let metrics = [
            metric("Revenue", Some(-12.0)),
            metric("Cost", Some(-10.0)),
            metric("Orders", Some(15.0)),
            metric("Tickets", Some(22.5)),
            metric("Stock", None),
        ];
        let insights = generate_insights(&rows, &columns, &[], &metrics, &config);
        let alerts = insights
            .iter()
            .filter(|line| line.starts_with("Critical") || line.starts_with("Excellent"))
            .collect::<Vec<_>>();
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].contains("Revenue fell 12%"));
        assert!(alerts[1].contains("Tickets grew 22.5%"));
    }

    #[test]
    fn output_is_cut_to_max_insights_in_order() {
        let (rows, columns) = grid(1, &["A"]);
        let metrics = (0..20)
            .map(|idx| metric(&format!("M{idx}"), Some(-50.0)))
            .collect::<Vec<_>>();
        let insights =
            generate_insights(&rows, &columns, &[], &metrics, &SheetsenseConfig::default());
        assert_eq!(insights.len(), 8);
        assert!(insights[0].starts_with("The dataset has 1 row(s)"));
        assert!(insights[7].contains("M5 fell"));
    }
}
