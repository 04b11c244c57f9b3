//! Tunable thresholds and keyword tables for every heuristic in the pipeline.
//!
//! Defaults reproduce the stock behavior; a YAML file may override any subset
//! of fields because every struct here is `#[serde(default)]`:
//!
//! ```yaml
//! thresholds:
//!   max_insights: 12
//!   domain_tie_break: first-declared
//! keywords:
//!   currency: [revenue, custo, preco]
//! ```

use std::{fs, path::Path};

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("threshold '{name}' must be within (0, 1], got {value}")]
    RatioOutOfRange { name: &'static str, value: f64 },
    #[error("threshold '{name}' must be greater than zero")]
    ZeroLimit { name: &'static str },
    #[error("turnover_low ({low}) must not exceed turnover_high ({high})")]
    TurnoverBounds { low: f64, high: f64 },
    #[error("invalid pattern '{pattern}' in '{field}': {message}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        message: String,
    },
}

/// How textual numbers are split into thousands and decimal separators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberLocale {
    /// `.` groups thousands and `,` marks decimals, always.
    #[default]
    Brazilian,
    /// Picks the decimal separator per value from its shape.
    Auto,
}

/// Resolution when several domains share the highest keyword score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomainTieBreak {
    #[default]
    Unknown,
    FirstDeclared,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub max_insights: usize,
    pub max_categorical_points: usize,
    pub max_date_points: usize,
    pub type_ratio_threshold: f64,
    pub min_type_hits: usize,
    pub type_sample_rows: usize,
    pub insight_type_sample_rows: usize,
    pub insight_numeric_columns: usize,
    pub classification_sample_rows: usize,
    pub max_header_len: usize,
    pub concentration_threshold: f64,
    pub critical_drop_threshold: f64,
    pub excellent_growth_threshold: f64,
    pub sharp_drop_threshold: f64,
    pub strong_growth_threshold: f64,
    pub attention_growth_threshold: f64,
    pub high_ticket_threshold: f64,
    pub turnover_low: f64,
    pub turnover_high: f64,
    pub low_stock_ratio: f64,
    pub max_chart_suggestions: usize,
    pub pie_max_categories: usize,
    /// Columns filled in this share of rows or less are dropped on load.
    pub min_column_fill: f64,
    pub title_scan_rows: usize,
    pub footer_scan_rows: usize,
    pub repair_mojibake: bool,
    pub number_locale: NumberLocale,
    pub domain_tie_break: DomainTieBreak,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_insights: 8,
            max_categorical_points: 10,
            max_date_points: 50,
            type_ratio_threshold: 0.6,
            min_type_hits: 3,
            type_sample_rows: 30,
            insight_type_sample_rows: 50,
            insight_numeric_columns: 4,
            classification_sample_rows: 10,
            max_header_len: 50,
            concentration_threshold: 0.40,
            critical_drop_threshold: -10.0,
            excellent_growth_threshold: 15.0,
            sharp_drop_threshold: -15.0,
            strong_growth_threshold: 15.0,
            attention_growth_threshold: 20.0,
            high_ticket_threshold: 500.0,
            turnover_low: 2.0,
            turnover_high: 5.0,
            low_stock_ratio: 0.5,
            max_chart_suggestions: 4,
            pie_max_categories: 10,
            min_column_fill: 0.02,
            title_scan_rows: 10,
            footer_scan_rows: 15,
            repair_mojibake: true,
            number_locale: NumberLocale::Brazilian,
            domain_tie_break: DomainTieBreak::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DomainKeywords {
    pub sales: Vec<String>,
    pub inventory: Vec<String>,
    pub overtime: Vec<String>,
}

impl Default for DomainKeywords {
    fn default() -> Self {
        Self {
            sales: words(&[
                "venda",
                "cliente",
                "pedido",
                "faturamento",
                "receita",
                "ticket",
                "nota fiscal",
                "vendedor",
                "sale",
                "customer",
                "order",
                "revenue",
                "invoice",
            ]),
            inventory: words(&[
                "estoque",
                "inventario",
                "inventário",
                "sku",
                "armazem",
                "armazém",
                "deposito",
                "depósito",
                "saldo",
                "reposicao",
                "reposição",
                "stock",
                "inventory",
                "warehouse",
            ]),
            overtime: words(&[
                "hora extra",
                "horas extras",
                "banco de horas",
                "colaborador",
                "funcionario",
                "funcionário",
                "jornada",
                "turno",
                "matricula",
                "matrícula",
                "overtime",
                "employee",
                "shift",
            ]),
        }
    }
}

/// Name fragments that mark a column as the preferred holder of a role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoleKeywords {
    pub date: Vec<String>,
    pub value: Vec<String>,
    pub category: Vec<String>,
    pub quantity: Vec<String>,
    pub hours: Vec<String>,
    pub revenue: Vec<String>,
    pub cost: Vec<String>,
}

impl Default for RoleKeywords {
    fn default() -> Self {
        Self {
            date: words(&["data", "date", "dia", "periodo", "período", "mes", "mês"]),
            value: words(&[
                "total",
                "valor",
                "preco",
                "preço",
                "faturamento",
                "receita",
                "price",
                "amount",
                "value",
            ]),
            category: words(&[
                "categoria",
                "category",
                "produto",
                "product",
                "cliente",
                "customer",
                "colaborador",
                "funcionario",
                "funcionário",
                "employee",
                "item",
                "tipo",
                "grupo",
                "setor",
            ]),
            quantity: words(&[
                "qtd",
                "quantidade",
                "quantity",
                "qty",
                "estoque",
                "saldo",
                "unidades",
                "stock",
            ]),
            hours: words(&["hora", "horas", "hours", "hrs"]),
            revenue: words(&["receita", "faturamento", "vendas", "revenue"]),
            cost: words(&["custo", "despesa", "cost", "expense"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeywordTables {
    pub currency: Vec<String>,
    pub percentage: Vec<String>,
    pub domains: DomainKeywords,
    pub roles: RoleKeywords,
    /// Company-name suffixes that leak into headers when a sheet is parsed
    /// with the wrong header row; matched as whole words.
    pub entity_fragments: Vec<String>,
    /// Case-insensitive regexes for report titles above the header row.
    pub title_patterns: Vec<String>,
    /// Case-insensitive regexes for the first cell of trailing note rows.
    pub footer_patterns: Vec<String>,
    /// Case-insensitive regexes for the first cell of total and subtotal rows.
    pub total_row_patterns: Vec<String>,
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            currency: words(&[
                "revenue",
                "cost",
                "price",
                "total",
                "amount",
                "valor",
                "preco",
                "preço",
                "custo",
                "receita",
                "faturamento",
                "lucro",
                "ticket",
                "r$",
            ]),
            percentage: words(&[
                "rate",
                "percent",
                "margin",
                "taxa",
                "percentual",
                "margem",
                "pct",
                "%",
            ]),
            domains: DomainKeywords::default(),
            roles: RoleKeywords::default(),
            entity_fragments: words(&["ltda", "eireli", "s/a", "s.a.", "cnpj", "epp", "mei"]),
            title_patterns: words(&[
                r"quadro\s+resumo",
                r"relat[óo]rio",
                r"\b(tabela|planilha|listagem|levantamento)\s+de\b",
            ]),
            footer_patterns: words(&[
                r"^(obs|observa[çc][ãa]o|nota|notas|aten[çc][ãa]o|importante|legenda|fonte)\s*[:.]",
                r"^\*",
                r"^(elaborado|gerado|atualizado)\b",
            ]),
            total_row_patterns: words(&[
                r"^(sub)?total(is)?\b",
                r"^totais\b",
                r"^grand\s+total\b",
                r"^(soma|sum|geral)\b",
            ]),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SheetsenseConfig {
    pub thresholds: Thresholds,
    pub keywords: KeywordTables,
}

impl SheetsenseConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: SheetsenseConfig =
            serde_yaml::from_str(input).context("Parsing configuration YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading configuration file {path:?}"))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Loading configuration from {path:?}"))
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing configuration YAML")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("type_ratio_threshold", t.type_ratio_threshold),
            ("concentration_threshold", t.concentration_threshold),
            ("low_stock_ratio", t.low_stock_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::RatioOutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("max_insights", t.max_insights),
            ("max_categorical_points", t.max_categorical_points),
            ("max_date_points", t.max_date_points),
            ("type_sample_rows", t.type_sample_rows),
            ("insight_type_sample_rows", t.insight_type_sample_rows),
            ("classification_sample_rows", t.classification_sample_rows),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { name });
            }
        }
        if !(0.0..1.0).contains(&t.min_column_fill) {
            return Err(ConfigError::RatioOutOfRange {
                name: "min_column_fill",
                value: t.min_column_fill,
            });
        }
        if t.turnover_low > t.turnover_high {
            return Err(ConfigError::TurnoverBounds {
                low: t.turnover_low,
                high: t.turnover_high,
            });
        }
        let k = &self.keywords;
        compile_patterns("title_patterns", &k.title_patterns)?;
        compile_patterns("footer_patterns", &k.footer_patterns)?;
        compile_patterns("total_row_patterns", &k.total_row_patterns)?;
        Ok(())
    }
}

/// Compiles keyword regexes case-insensitively, naming the offending field.
pub(crate) fn compile_patterns(
    field: &'static str,
    patterns: &[String],
) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| ConfigError::InvalidPattern {
                    field,
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })
        })
        .collect()
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// True when the lower-cased `haystack` contains any keyword.
pub(crate) fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && haystack.contains(keyword.as_str()))
}

/// True when `word` occurs in the lower-cased `haystack` with no letter or
/// digit directly on either side.
pub(crate) fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    haystack.match_indices(word).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
