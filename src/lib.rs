pub mod aggregate;
pub mod classify;
pub mod clean;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod format;
pub mod insights;
pub mod io_utils;
pub mod metrics;
pub mod profile;
pub mod table;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{AggregationKind, AggregationSpec},
    clean::{CleaningReport, CleaningRules},
    cli::{Cli, Commands, InputArgs},
    config::SheetsenseConfig,
    dashboard::Dashboard,
    data::Dataset,
    insights::{ExternalChart, ExternalMetric},
    table::TextTable,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheetsense", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Profile(args) => handle_profile(&args),
        Commands::Chart(args) => handle_chart(&args),
        Commands::Metrics(args) => handle_metrics(&args),
        Commands::Insights(args) => handle_insights(&args),
        Commands::Dashboard(args) => handle_dashboard(&args),
    }
}

/// Loads configuration and the cleaned dataset for any subcommand.
fn load_inputs(args: &InputArgs) -> Result<(Dataset, SheetsenseConfig, CleaningReport)> {
    let config = SheetsenseConfig::load_or_default(args.config.as_deref())?;
    let rules = CleaningRules::from_config(&config)?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    info!(
        "Loading '{}' with delimiter '{}' and encoding {}",
        args.input.display(),
        printable_delimiter(delimiter),
        encoding.name()
    );
    let (dataset, cleaning) = io_utils::load_dataset(&args.input, args.delimiter, encoding, &rules)
        .with_context(|| format!("Loading dataset from {:?}", args.input))?;
    if !cleaning.is_empty() {
        info!(
            "Clean-up: {} title row(s), {} footer row(s), {} total row(s), {} sparse column(s), {} re-decoded cell(s)",
            cleaning.title_rows,
            cleaning.footer_rows,
            cleaning.total_rows,
            cleaning.dropped_columns.len(),
            cleaning.repaired_cells
        );
    }
    info!(
        "Loaded {} row(s) across {} column(s)",
        dataset.row_count(),
        dataset.columns.len()
    );
    Ok((dataset, config, cleaning))
}

/// Declared columns, swapped for the row keys when the header row looks corrupted.
fn effective_columns(
    dataset: &Dataset,
    config: &SheetsenseConfig,
) -> (profile::HeaderRepair, Vec<String>) {
    let repair = profile::detect_header_repair(&dataset.columns, &dataset.rows, config);
    let columns = if repair.is_corrupted() {
        warn!(
            "Header row looks corrupted ({} defect(s)); using row keys instead",
            repair.defects.len()
        );
        repair.repair_columns(&dataset.columns)
    } else {
        dataset.columns.clone()
    };
    (repair, columns)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Serializing JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn handle_profile(args: &cli::ProfileArgs) -> Result<()> {
    let (dataset, config, cleaning) = load_inputs(&args.input)?;
    let (header_repair, columns) = effective_columns(&dataset, &config);
    let column_profiles = profile::profile_columns(&dataset.rows, &columns, &config);
    let dataset_profile =
        classify::classify_with_profiles(&dataset.rows, &columns, &column_profiles, &config);
    info!(
        "Classified dataset as {} from {} column(s)",
        dataset_profile.domain,
        columns.len()
    );

    if args.input.json {
        #[derive(Serialize)]
        struct ProfileOutput<'a> {
            cleaning: &'a CleaningReport,
            header_repair: &'a profile::HeaderRepair,
            columns: &'a [profile::ColumnProfile],
            profile: &'a classify::DatasetProfile,
        }
        return print_json(&ProfileOutput {
            cleaning: &cleaning,
            header_repair: &header_repair,
            columns: &column_profiles,
            profile: &dataset_profile,
        });
    }

    let mut table = TextTable::new(["column", "kind", "non_null", "sampled"])
        .align_right(2)
        .align_right(3);
    for column in &column_profiles {
        table.push_row([
            column.name.clone(),
            column.kind.to_string(),
            column.non_null.to_string(),
            column.sampled.to_string(),
        ]);
    }
    table.print();
    println!();
    let role = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    println!("domain:   {}", dataset_profile.domain);
    println!("date:     {}", role(&dataset_profile.date_column));
    println!("value:    {}", role(&dataset_profile.value_column));
    println!("category: {}", role(&dataset_profile.category_column));
    println!("quantity: {}", role(&dataset_profile.quantity_column));
    if header_repair.is_corrupted() {
        println!("headers:  repaired from row keys");
    }
    if !cleaning.is_empty() {
        println!(
            "cleaned:  {} title, {} footer, {} total row(s); dropped columns [{}]",
            cleaning.title_rows,
            cleaning.footer_rows,
            cleaning.total_rows,
            cleaning.dropped_columns.join(", ")
        );
    }
    Ok(())
}

fn handle_chart(args: &cli::ChartArgs) -> Result<()> {
    let (dataset, config, _) = load_inputs(&args.input)?;
    if args.value_key.is_none() && args.kind != AggregationKind::Count {
        warn!(
            "No --value-key given for '{}'; every group will total zero",
            args.kind
        );
    }
    let repair = profile::detect_header_repair(&dataset.columns, &dataset.rows, &config);
    let group_key = repair.resolve(&args.group_key);
    let value_key = args.value_key.as_deref().map(|key| repair.resolve(key));
    if group_key != args.group_key {
        warn!("Header '{}' looks corrupted; grouping by '{group_key}'", args.group_key);
    }
    let spec = AggregationSpec::new(group_key, value_key, args.kind);
    let points = aggregate::chart_series(&dataset.rows, &spec, &config);
    let display = format::detect_format(spec.kind, spec.value_key.as_deref(), &config.keywords);
    info!(
        "Chart '{}' ({}) has {} point(s)",
        spec.group_key,
        spec.kind,
        points.len()
    );

    if args.input.json {
        #[derive(Serialize)]
        struct ChartOutput<'a> {
            spec: &'a AggregationSpec,
            format: format::DisplayFormat,
            points: &'a [aggregate::ChartPoint],
        }
        return print_json(&ChartOutput {
            spec: &spec,
            format: display,
            points: &points,
        });
    }

    let value_header = spec
        .value_key
        .clone()
        .unwrap_or_else(|| spec.kind.to_string());
    let mut table = TextTable::new([spec.group_key.clone(), value_header]).align_right(1);
    for point in &points {
        table.push_row([point.name.clone(), display.render(point.value)]);
    }
    table.print();
    Ok(())
}

fn handle_metrics(args: &InputArgs) -> Result<()> {
    let (dataset, config, _) = load_inputs(args)?;
    let (_, columns) = effective_columns(&dataset, &config);
    let dataset_profile = classify::classify(&dataset.rows, &columns, &config);
    let metrics = metrics::generate_metrics(&dataset.rows, &dataset_profile, &config);
    info!(
        "Computed {} metric(s) for domain {}",
        metrics.len(),
        dataset_profile.domain
    );

    if args.json {
        return print_json(&metrics);
    }

    let mut table = TextTable::new(["id", "label", "value", "change"])
        .align_right(2)
        .align_right(3);
    for metric in &metrics {
        let change = metric
            .comparison
            .map(|comparison| {
                format::DisplayFormat::Percentage.render(comparison.percent_change)
            })
            .unwrap_or_default();
        table.push_row([
            metric.id.clone(),
            metric.label.clone(),
            metric.display_value(),
            change,
        ]);
    }
    table.print();
    println!();
    for metric in &metrics {
        println!("- {}", metric.insight);
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct ExternalInputs {
    #[serde(default)]
    charts: Vec<ExternalChart>,
    #[serde(default)]
    metrics: Vec<ExternalMetric>,
}

fn load_external(path: &Path) -> Result<ExternalInputs> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Reading external inputs {path:?}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Parsing external inputs {path:?}"))
}

fn handle_insights(args: &cli::InsightsArgs) -> Result<()> {
    let (dataset, config, _) = load_inputs(&args.input)?;
    let external = match &args.external {
        Some(path) => load_external(path)?,
        None => ExternalInputs::default(),
    };
    debug!(
        "External inputs: {} chart(s), {} metric(s)",
        external.charts.len(),
        external.metrics.len()
    );
    let (_, columns) = effective_columns(&dataset, &config);
    let insights = insights::generate_insights(
        &dataset.rows,
        &columns,
        &external.charts,
        &external.metrics,
        &config,
    );
    info!("Generated {} insight(s)", insights.len());

    if args.input.json {
        return print_json(&insights);
    }
    for (idx, insight) in insights.iter().enumerate() {
        println!("{}. {insight}", idx + 1);
    }
    Ok(())
}

fn handle_dashboard(args: &cli::DashboardArgs) -> Result<()> {
    let (dataset, config, _) = load_inputs(&args.input)?;
    let dashboard = Dashboard::build(&dataset, &config);
    let rendered =
        serde_json::to_string_pretty(&dashboard).context("Serializing dashboard JSON")?;
    match &args.output {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Writing dashboard to {path:?}"))?;
            info!("Dashboard written to {path:?}");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
