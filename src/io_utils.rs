//! Dataset loading for the command-line shell.
//!
//! All file I/O flows through this module:
//!
//! - **Delimiter resolution**: `.tsv` → tab, anything else → comma, unless a
//!   delimiter is given explicitly.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Formats**: `.json` files hold either an array of row objects or a
//!   `{ "columns": [...], "rows": [...] }` table; everything else is read as
//!   delimited text with ragged rows tolerated.
//! - **stdin**: the `-` path reads delimited text from standard input.
//! - **Clean-up**: report titles, footer notes, total rows, near-empty
//!   columns and mis-decoded text are removed through [`crate::clean`].

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;

use crate::{
    clean::{self, CleaningReport, CleaningRules},
    coerce::sanitize_cell,
    data::{Dataset, Row, Value, unique_column_names},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or(if has_extension(path, "tsv") {
        DEFAULT_TSV_DELIMITER
    } else {
        DEFAULT_CSV_DELIMITER
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Loads a dataset from `path`, picking the reader from the file extension,
/// and applies the clean-up rules.
pub fn load_dataset(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
    rules: &CleaningRules,
) -> Result<(Dataset, CleaningReport)> {
    let (dataset, report) = if !is_dash(path) && has_extension(path, "json") {
        let bytes = fs::read(path).with_context(|| format!("Reading input file {path:?}"))?;
        let text = decode_bytes(&bytes, encoding)
            .with_context(|| format!("Decoding input file {path:?}"))?;
        let dataset =
            parse_json_dataset(&text).with_context(|| format!("Parsing JSON dataset {path:?}"))?;
        clean::clean_dataset(dataset, rules)
    } else {
        let reader: Box<dyn Read> = if is_dash(path) {
            Box::new(std::io::stdin().lock())
        } else {
            Box::new(BufReader::new(
                File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
            ))
        };
        let delimiter = resolve_input_delimiter(path, delimiter);
        read_csv_dataset(reader, delimiter, encoding, rules)
            .with_context(|| format!("Reading delimited input {path:?}"))?
    };
    debug!(
        "Loaded {} row(s) x {} column(s) from {path:?}",
        dataset.rows.len(),
        dataset.columns.len()
    );
    Ok((dataset, report))
}

/// Reads every delimited record, header included, decoding each field.
pub fn read_csv_records<R: Read>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<Vec<String>>> {
    let mut reader = open_csv_reader(reader, delimiter);
    let mut records = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading line {}", idx + 1))?;
        records.push(
            decode_record(&record, encoding).with_context(|| format!("Decoding line {}", idx + 1))?,
        );
    }
    Ok(records)
}

fn is_blank_record(fields: &[String]) -> bool {
    fields.iter().all(|field| field.trim().is_empty())
}

/// Builds a dataset from raw records; the first non-blank record is the
/// header and short rows are padded with nulls.
pub fn dataset_from_records(records: Vec<Vec<String>>) -> Dataset {
    let mut records = records.into_iter().filter(|fields| !is_blank_record(fields));
    let Some(headers) = records.next() else {
        return Dataset::default();
    };
    let columns = unique_column_names(&headers);
    let rows = records
        .map(|fields| {
            columns
                .iter()
                .enumerate()
                .map(|(pos, column)| {
                    let value = fields
                        .get(pos)
                        .map(|field| sanitize_cell(field))
                        .unwrap_or(Value::Null);
                    (column.clone(), value)
                })
                .collect::<Row>()
        })
        .collect();
    Dataset::new(columns, rows)
}

/// Reads delimited text with a header row, stripping report titles above it
/// and applying the row and column clean-up.
pub fn read_csv_dataset<R: Read>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
    rules: &CleaningRules,
) -> Result<(Dataset, CleaningReport)> {
    let mut records = read_csv_records(reader, delimiter, encoding)?;
    let title_rows = clean::strip_title_rows(&mut records, rules);
    let (dataset, mut report) = clean::clean_dataset(dataset_from_records(records), rules);
    report.title_rows = title_rows;
    Ok((dataset, report))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDataset {
    Table {
        #[serde(default)]
        columns: Vec<String>,
        rows: Vec<IndexMap<String, Value>>,
    },
    Records(Vec<IndexMap<String, Value>>),
}

/// Parses a JSON array of row objects or a `{columns, rows}` table.
///
/// Without declared columns, the column list is every key in order of first
/// appearance.
pub fn parse_json_dataset(text: &str) -> Result<Dataset> {
    let parsed: JsonDataset = serde_json::from_str(text)
        .context("Expected an array of row objects or an object with 'rows'")?;
    let (declared, rows) = match parsed {
        JsonDataset::Table { columns, rows } => (columns, rows),
        JsonDataset::Records(rows) => (Vec::new(), rows),
    };
    let columns = if declared.is_empty() {
        let mut seen: IndexMap<String, ()> = IndexMap::new();
        for row in &rows {
            for key in row.keys() {
                seen.entry(key.clone()).or_default();
            }
        }
        seen.into_keys().collect()
    } else {
        declared
    };
    Ok(Dataset::new(columns, rows))
}
