use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::aggregate::AggregationKind;

#[derive(Debug, Parser)]
#[command(author, version, about = "Profile spreadsheets into charts, KPIs, and insights", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer column kinds, repair headers, and classify the dataset domain
    Profile(ProfileArgs),
    /// Group rows by a column and print the sorted chart series
    Chart(ChartArgs),
    /// Compute the KPI menu for the detected domain
    Metrics(InputArgs),
    /// Generate natural-language insights
    Insights(InsightsArgs),
    /// Run the full pipeline and emit a dashboard document
    Dashboard(DashboardArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV, TSV, or JSON file (`-` reads CSV from stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML file overriding thresholds and keyword tables
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Emit JSON instead of a formatted table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Column whose values become the chart categories
    #[arg(short = 'g', long = "group-key")]
    pub group_key: String,
    /// Numeric column to reduce (ignored for `count`)
    #[arg(short = 'v', long = "value-key")]
    pub value_key: Option<String>,
    /// Reduction applied per group: sum, avg, or count
    #[arg(short = 'k', long = "kind", default_value = "sum")]
    pub kind: AggregationKind,
}

#[derive(Debug, Args)]
pub struct InsightsArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// JSON file with `{ "charts": [...], "metrics": [...] }` computed elsewhere
    #[arg(long)]
    pub external: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Write the dashboard JSON to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
