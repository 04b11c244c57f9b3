mod common;

use chrono::NaiveDate;
use common::{columns, fixture_path, row};
use encoding_rs::UTF_8;
use proptest::prelude::*;
use sheetsense::{
    aggregate::{self, AggregationKind, AggregationSpec, ChartPoint, OTHERS_LABEL},
    classify::{self, Domain},
    clean::CleaningRules,
    coerce,
    config::SheetsenseConfig,
    dashboard::Dashboard,
    data::Value,
    format::{self, DisplayFormat},
    insights::{self, ExternalChart, ExternalMetric},
    io_utils,
    metrics::{self, MetricValue},
};

#[test]
fn coercion_reference_values() {
    assert_eq!(coerce::to_number(&Value::text("R$ 1.234,56")), 1234.56);
    assert_eq!(coerce::to_number(&Value::text("abc")), 0.0);
    assert_eq!(coerce::to_number(&Value::Null), 0.0);
    assert!(coerce::is_probably_date(&Value::text("2024-01-15")));
    assert_eq!(
        coerce::to_date(&Value::text("15/01/2024")),
        NaiveDate::from_ymd_opt(2024, 1, 15)
    );
    assert_eq!(coerce::to_date(&Value::text("32/13/2024")), None);
}

#[test]
fn date_series_sum_sorts_chronologically() {
    let rows = vec![
        row(&[("Data", Value::text("2024-01-02")), ("Valor", Value::Number(200.0))]),
        row(&[("Data", Value::text("2024-01-01")), ("Valor", Value::Number(100.0))]),
    ];
    let spec = AggregationSpec::new("Data", Some("Valor"), AggregationKind::Sum);
    let points = aggregate::chart_series(&rows, &spec, &SheetsenseConfig::default());
    assert_eq!(
        points,
        vec![
            ChartPoint::new("01/01/2024", 100.0),
            ChartPoint::new("02/01/2024", 200.0),
        ]
    );
}

#[test]
fn count_yields_one_per_distinct_key() {
    let rows = (0..7)
        .map(|idx| row(&[("Pedido", Value::text(format!("P-{idx}")))]))
        .collect::<Vec<_>>();
    let points = aggregate::chart_series(
        &rows,
        &AggregationSpec::count("Pedido"),
        &SheetsenseConfig::default(),
    );
    assert_eq!(points.len(), 7);
    assert!(points.iter().all(|point| point.value == 1.0));
}

#[test]
fn wide_categories_collapse_into_others() {
    let values = [50.0, 40.0, 35.0, 30.0, 28.0, 25.0, 22.0, 20.0, 18.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
    let rows = values
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            row(&[
                ("Regiao", Value::text(format!("R{idx:02}"))),
                ("Valor", Value::Number(*value)),
            ])
        })
        .collect::<Vec<_>>();
    let spec = AggregationSpec::new("Regiao", Some("Valor"), AggregationKind::Sum);
    let points = aggregate::chart_series(&rows, &spec, &SheetsenseConfig::default());
    assert_eq!(points.len(), 10);
    let last = points.last().unwrap();
    assert_eq!(last.name, OTHERS_LABEL);
    assert_eq!(last.value, 6.0 + 5.0 + 4.0 + 3.0 + 2.0 + 1.0);
    assert_eq!(points[0].value, 50.0);
}

#[test]
fn others_omitted_when_tail_sums_to_zero() {
    let rows = (0..15)
        .map(|idx| {
            let value = if idx < 9 { 10.0 } else { 0.0 };
            row(&[
                ("Regiao", Value::text(format!("R{idx:02}"))),
                ("Valor", Value::Number(value)),
            ])
        })
        .collect::<Vec<_>>();
    let spec = AggregationSpec::new("Regiao", Some("Valor"), AggregationKind::Sum);
    let points = aggregate::chart_series(&rows, &spec, &SheetsenseConfig::default());
    assert_eq!(points.len(), 9);
    assert!(points.iter().all(|point| point.name != OTHERS_LABEL));
}

#[test]
fn sales_headers_classify_as_sales() {
    let profile = classify::classify(
        &[],
        &columns(&["cliente", "pedido", "faturamento"]),
        &SheetsenseConfig::default(),
    );
    assert_eq!(profile.domain, Domain::Sales);
}

#[test]
fn completeness_and_business_alerts() {
    let names = columns(&["A", "B", "C", "D"]);
    let mut rows = (0..10)
        .map(|idx| {
            names
                .iter()
                .map(|name| (name.clone(), Value::text(format!("{name}{idx}"))))
                .collect()
        })
        .collect::<Vec<sheetsense::data::Row>>();
    for row in rows.iter_mut().skip(3).take(5) {
        row.insert("C".to_string(), Value::text(" "));
    }
    let charts = [
        ExternalChart {
            title: "Vendas por Loja".to_string(),
            data: vec![
                ChartPoint::new("Centro", 45.0),
                ChartPoint::new("Norte", 30.0),
                ChartPoint::new("Sul", 25.0),
            ],
        },
        ExternalChart {
            title: "Equilibrado".to_string(),
            data: vec![
                ChartPoint::new("X", 40.0),
                ChartPoint::new("Y", 35.0),
                ChartPoint::new("Z", 25.0),
            ],
        },
    ];
    let metrics = [
        ExternalMetric {
            label: "Receita".to_string(),
            value: MetricValue::Number(10.0),
            change: Some(-12.0),
        },
        ExternalMetric {
            label: "Custo".to_string(),
            value: MetricValue::Number(10.0),
            change: Some(-10.0),
        },
    ];
    let insights =
        insights::generate_insights(&rows, &names, &charts, &metrics, &SheetsenseConfig::default());

    assert!(insights.iter().any(|line| line.contains("88%")));
    let concentration = insights
        .iter()
        .filter(|line| line.starts_with("Concentration"))
        .collect::<Vec<_>>();
    assert_eq!(concentration.len(), 1);
    assert!(concentration[0].contains("45%"));
    assert!(concentration[0].contains("Vendas por Loja"));
    let drops = insights
        .iter()
        .filter(|line| line.starts_with("Critical drop"))
        .collect::<Vec<_>>();
    assert_eq!(drops.len(), 1);
    assert!(drops[0].contains("Receita"));
}

#[test]
fn fixture_flows_through_every_stage() {
    let config = SheetsenseConfig::default();
    let rules = CleaningRules::from_config(&config).expect("default rules");
    let (dataset, cleaning) =
        io_utils::load_dataset(&fixture_path("vendas.csv"), Some(b';'), UTF_8, &rules)
            .expect("load fixture");
    assert_eq!(dataset.row_count(), 12);
    assert!(cleaning.is_empty());

    let profile = classify::classify(&dataset.rows, &dataset.columns, &config);
    assert_eq!(profile.domain, Domain::Sales);
    assert_eq!(profile.value_column.as_deref(), Some("Valor Total"));
    assert_eq!(profile.date_column.as_deref(), Some("Data"));

    let metrics = metrics::generate_metrics(&dataset.rows, &profile, &config);
    let total = metrics.iter().find(|m| m.id == "total_sales").unwrap();
    assert_eq!(total.value, MetricValue::Number(4400.0));
    assert_eq!(total.display_value(), "R$ 4.400,00");
    assert!(metrics.iter().any(|m| m.id == "daily_average"));

    assert_eq!(
        format::detect_format(AggregationKind::Sum, Some("Valor Total"), &config.keywords),
        DisplayFormat::Currency
    );

    let dashboard = Dashboard::build(&dataset, &config);
    assert!(!dashboard.charts.is_empty());
    assert!(dashboard.charts.len() <= 4);
    assert!(dashboard.insights.len() <= 8);
}

#[test]
fn json_fixture_is_inventory() {
    let config = SheetsenseConfig::default();
    let rules = CleaningRules::from_config(&config).expect("default rules");
    let (dataset, _) = io_utils::load_dataset(&fixture_path("estoque.json"), None, UTF_8, &rules)
        .expect("load json fixture");
    let profile = classify::classify(&dataset.rows, &dataset.columns, &config);
    assert_eq!(profile.domain, Domain::Inventory);
    assert_eq!(profile.quantity_column.as_deref(), Some("Estoque"));
    assert_eq!(profile.category_column.as_deref(), Some("Produto"));
    let metrics = metrics::generate_metrics(&dataset.rows, &profile, &config);
    assert_eq!(metrics[0].id, "total_quantity");
    assert_eq!(metrics[0].value, MetricValue::Number(200.0));
}

proptest! {
    #[test]
    fn chart_series_respects_display_caps(values in prop::collection::vec((0u8..40, 0.0f64..1000.0), 0..200)) {
        let rows = values
            .iter()
            .map(|(key, value)| row(&[
                ("Grupo", Value::text(format!("G{key}"))),
                ("Valor", Value::Number(*value)),
            ]))
            .collect::<Vec<_>>();
        let spec = AggregationSpec::new("Grupo", Some("Valor"), AggregationKind::Sum);
        let points = aggregate::chart_series(&rows, &spec, &SheetsenseConfig::default());
        prop_assert!(points.len() <= 10);
        prop_assert!(points.iter().all(|point| !point.name.is_empty()));
        let total: f64 = values.iter().map(|(_, value)| value).sum();
        let charted: f64 = points.iter().map(|point| point.value).sum();
        prop_assert!((total - charted).abs() < 1e-6 * total.max(1.0));
    }

    #[test]
    fn insights_never_exceed_cap(rows_len in 0usize..30, cols in 1usize..6) {
        let names = (0..cols).map(|idx| format!("c{idx}")).collect::<Vec<_>>();
        let rows = (0..rows_len)
            .map(|r| names.iter().map(|name| (name.clone(), Value::Number(r as f64))).collect())
            .collect::<Vec<sheetsense::data::Row>>();
        let metrics = (0..20)
            .map(|idx| ExternalMetric {
                label: format!("m{idx}"),
                value: MetricValue::Number(1.0),
                change: Some(if idx % 2 == 0 { 50.0 } else { -50.0 }),
            })
            .collect::<Vec<_>>();
        let insights = insights::generate_insights(&rows, &names, &[], &metrics, &SheetsenseConfig::default());
        prop_assert!(insights.len() <= 8);
        prop_assert!(!insights.is_empty());
    }
}
