//! One-shot pipeline run over a loaded dataset.

use heck::ToSnakeCase;
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use crate::{
    aggregate::{self, AggregationKind, AggregationSpec, ChartPoint},
    classify::{self, DatasetProfile},
    config::SheetsenseConfig,
    data::{Dataset, Row},
    format::{self, DisplayFormat},
    insights::{self, ExternalChart, ExternalMetric},
    metrics::{self, Metric},
    profile::{self, ColumnKind, ColumnProfile, HeaderRepair},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSuggestion {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    pub spec: AggregationSpec,
}

impl ChartSuggestion {
    fn new(title: String, kind: ChartKind, group_key: &str, value_key: &str) -> Self {
        Self {
            id: title.to_snake_case(),
            title,
            kind,
            spec: AggregationSpec::new(group_key, Some(value_key), AggregationKind::Sum),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardChart {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    pub format: DisplayFormat,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub columns: Vec<String>,
    pub header_repair: HeaderRepair,
    pub column_profiles: Vec<ColumnProfile>,
    pub profile: DatasetProfile,
    pub confidence: Confidence,
    pub charts: Vec<DashboardChart>,
    pub metrics: Vec<Metric>,
    pub insights: Vec<String>,
}

impl Dashboard {
    pub fn build(dataset: &Dataset, config: &SheetsenseConfig) -> Self {
        let rows = dataset.rows.as_slice();
        let header_repair = profile::detect_header_repair(&dataset.columns, rows, config);
        let columns = if header_repair.is_corrupted() {
            header_repair.repair_columns(&dataset.columns)
        } else {
            dataset.columns.clone()
        };

        let column_profiles = profile::profile_columns(rows, &columns, config);
        let profile = classify::classify_with_profiles(rows, &columns, &column_profiles, config);
        let confidence = confidence_level(rows, &columns, &column_profiles);

        let charts = suggest_charts(rows, &column_profiles, config)
            .into_iter()
            .filter_map(|suggestion| build_chart(rows, suggestion, config))
            .collect::<Vec<_>>();
        let metrics = metrics::generate_metrics(rows, &profile, config);

        let external_charts = charts
            .iter()
            .map(|chart| ExternalChart {
                title: chart.title.clone(),
                data: chart.points.clone(),
            })
            .collect::<Vec<_>>();
        let external_metrics = metrics
            .iter()
            .filter(|metric| metric.comparison.is_some())
            .map(ExternalMetric::from)
            .collect::<Vec<_>>();
        let insights =
            insights::generate_insights(rows, &columns, &external_charts, &external_metrics, config);

        info!(
            "Dashboard for {} row(s): domain {}, {} chart(s), {} metric(s), {} insight(s)",
            rows.len(),
            profile.domain,
            charts.len(),
            metrics.len(),
            insights.len()
        );
        Self {
            columns,
            header_repair,
            column_profiles,
            profile,
            confidence,
            charts,
            metrics,
            insights,
        }
    }
}

fn build_chart(
    rows: &[Row],
    suggestion: ChartSuggestion,
    config: &SheetsenseConfig,
) -> Option<DashboardChart> {
    let points = aggregate::chart_series(rows, &suggestion.spec, config);
    if points.is_empty() {
        return None;
    }
    let format = format::detect_format(
        suggestion.spec.kind,
        suggestion.spec.value_key.as_deref(),
        &config.keywords,
    );
    Some(DashboardChart {
        id: suggestion.id,
        title: suggestion.title,
        kind: suggestion.kind,
        format,
        points,
    })
}

/// Scores one point each for a numeric column, at least ten rows, a text
/// column, and fewer than 10% empty cells.
pub fn confidence_level(rows: &[Row], columns: &[String], profiles: &[ColumnProfile]) -> Confidence {
    let has_kind = |kind: ColumnKind| profiles.iter().any(|profile| profile.kind == kind);
    let cells = rows.len() * columns.len();
    let null_ratio = if cells == 0 {
        1.0
    } else {
        let empty = rows
            .iter()
            .flat_map(|row| columns.iter().map(move |column| row.get(column)))
            .filter(|value| value.is_none_or(|value| value.is_blank()))
            .count();
        empty as f64 / cells as f64
    };
    let score = [
        has_kind(ColumnKind::Numeric),
        rows.len() >= 10,
        has_kind(ColumnKind::Text),
        null_ratio < 0.1,
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count();
    match score {
        3.. => Confidence::High,
        2 => Confidence::Medium,
        _ => Confidence::Low,
    }
}

/// Proposes bar, line, and pie charts from the profiled column kinds.
pub fn suggest_charts(
    rows: &[Row],
    profiles: &[ColumnProfile],
    config: &SheetsenseConfig,
) -> Vec<ChartSuggestion> {
    let numeric = profile::columns_of_kind(profiles, ColumnKind::Numeric);
    let text = profile::columns_of_kind(profiles, ColumnKind::Text);
    let dates = profile::columns_of_kind(profiles, ColumnKind::Date);
    let mut suggestions = Vec::new();

    for category in text.iter().take(2) {
        for value in numeric.iter().take(2) {
            suggestions.push(ChartSuggestion::new(
                format!("{value} by {category}"),
                ChartKind::Bar,
                category,
                value,
            ));
        }
    }
    if let Some(date) = dates.first() {
        for value in numeric.iter().take(2) {
            suggestions.push(ChartSuggestion::new(
                format!("{value} over time"),
                ChartKind::Line,
                date,
                value,
            ));
        }
    }
    if let (Some(category), Some(value)) = (text.first(), numeric.first()) {
        let distinct = rows
            .iter()
            .map(|row| aggregate::group_name(row.get(*category)))
            .unique()
            .count();
        if distinct <= config.thresholds.pie_max_categories {
            suggestions.push(ChartSuggestion::new(
                format!("{value} share by {category}"),
                ChartKind::Pie,
                category,
                value,
            ));
        }
    }

    debug!(
        "{} chart suggestion(s), keeping at most {}",
        suggestions.len(),
        config.thresholds.max_chart_suggestions
    );
    suggestions.truncate(config.thresholds.max_chart_suggestions);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify::Domain, data::Value};

    fn sales_dataset(rows: usize) -> Dataset {
        let columns = ["Data", "Cliente", "Valor"]
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        let rows = (0..rows)
            .map(|idx| {
                Row::from_iter([
                    (
                        "Data".to_string(),
                        Value::text(format!("2024-01-{:02}", idx % 28 + 1)),
                    ),
                    ("Cliente".to_string(), Value::text(["Ana", "Bia"][idx % 2])),
                    ("Valor".to_string(), Value::Number(100.0 + idx as f64)),
                ])
            })
            .collect();
        Dataset::new(columns, rows)
    }

    #[test]
    fn suggestions_follow_kind_order_and_cap() {
        let dataset = sales_dataset(12);
        let config = SheetsenseConfig::default();
        let profiles = profile::profile_columns(&dataset.rows, &dataset.columns, &config);
        let suggestions = suggest_charts(&dataset.rows, &profiles, &config);
        let kinds = suggestions.iter().map(|s| s.kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec![ChartKind::Bar, ChartKind::Line, ChartKind::Pie]);
        assert_eq!(suggestions[0].id, "valor_by_cliente");
        assert_eq!(suggestions[1].spec.group_key, "Data");

        let mut narrow = config.clone();
        narrow.thresholds.max_chart_suggestions = 1;
        assert_eq!(suggest_charts(&dataset.rows, &profiles, &narrow).len(), 1);
    }

    #[test]
    fn pie_needs_few_categories() {
        let rows = (0..12)
            .map(|idx| {
                Row::from_iter([
                    ("Produto".to_string(), Value::text(format!("P{idx}"))),
                    ("Qtd".to_string(), Value::Number(1.0)),
                ])
            })
            .collect::<Vec<_>>();
        let config = SheetsenseConfig::default();
        let columns = vec!["Produto".to_string(), "Qtd".to_string()];
        let profiles = profile::profile_columns(&rows, &columns, &config);
        let suggestions = suggest_charts(&rows, &profiles, &config);
        assert!(suggestions.iter().all(|s| s.kind != ChartKind::Pie));
    }

    #[test]
    fn confidence_levels() {
        let dataset = sales_dataset(12);
        let config = SheetsenseConfig::default();
        let profiles = profile::profile_columns(&dataset.rows, &dataset.columns, &config);
        assert_eq!(
            confidence_level(&dataset.rows, &dataset.columns, &profiles),
            Confidence::High
        );
        assert_eq!(confidence_level(&[], &[], &[]), Confidence::Low);

        let small = sales_dataset(4);
        let profiles = profile::profile_columns(&small.rows, &small.columns, &config);
        assert_eq!(
            confidence_level(&small.rows, &small.columns, &profiles),
            Confidence::High
        );
        let text_only = vec![ColumnProfile {
            name: "Cliente".to_string(),
            kind: ColumnKind::Text,
            non_null: 4,
            sampled: 4,
        }];
        assert_eq!(
            confidence_level(&small.rows, &small.columns, &text_only),
            Confidence::Medium
        );
    }

    #[test]
    fn dashboard_runs_whole_pipeline() {
        let dataset = sales_dataset(20);
        let dashboard = Dashboard::build(&dataset, &SheetsenseConfig::default());
        assert_eq!(dashboard.profile.domain, Domain::Sales);
        assert_eq!(dashboard.confidence, Confidence::High);
        assert!(!dashboard.header_repair.is_corrupted());
        assert_eq!(dashboard.charts.len(), 3);
        assert_eq!(dashboard.charts[0].format, DisplayFormat::Currency);
        assert!(dashboard.metrics.iter().any(|m| m.id == "total_sales"));
        assert!(dashboard.insights.len() <= 8);
        assert!(dashboard.insights[0].contains("20 row(s)"));

        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["profile"]["domain"], "sales");
        assert_eq!(json["charts"][0]["kind"], "bar");
    }

    #[test]
    fn corrupted_headers_are_replaced_positionally() {
        let rows = (0..3)
            .map(|idx| {
                Row::from_iter([
                    ("Cliente".to_string(), Value::text(format!("C{idx}"))),
                    ("Valor".to_string(), Value::Number(10.0)),
                ])
            })
            .collect();
        let dataset = Dataset::new(
            vec!["ACME LTDA".to_string(), "1500".to_string()],
            rows,
        );
        let dashboard = Dashboard::build(&dataset, &SheetsenseConfig::default());
        assert!(dashboard.header_repair.is_corrupted());
        assert_eq!(dashboard.columns, vec!["Cliente", "Valor"]);
        assert_eq!(dashboard.profile.value_column.as_deref(), Some("Valor"));
    }
}
