//! Applies a [`CrosswalkTable`] to parsed records. Labels are matched as whole
//! fields, never as substrings of surrounding text.

mod csv_stream;
mod json_tree;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{Namespace, TranslationRequest};
use crate::error::CrosswalkError;
use crate::table::{CrosswalkTable, Outcome, Translation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColumnMode {
    /// Overwrite the label column and rename its header.
    #[default]
    Replace,
    /// Insert the translated column immediately before the label column.
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

impl FromStr for ColumnSelector {
    type Err = CrosswalkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CrosswalkError::Usage(
                "empty column selector".to_string(),
            ));
        }
        match trimmed.parse::<usize>() {
            Ok(index) => Ok(ColumnSelector::Index(index)),
            Err(_) => Ok(ColumnSelector::Name(trimmed.to_string())),
        }
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Index(index) => write!(f, "#{index}"),
            ColumnSelector::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CsvQuote {
    #[default]
    Necessary,
    NonNumeric,
    Always,
}

impl From<CsvQuote> for csv::QuoteStyle {
    fn from(value: CsvQuote) -> Self {
        match value {
            CsvQuote::Necessary => csv::QuoteStyle::Necessary,
            CsvQuote::NonNumeric => csv::QuoteStyle::NonNumeric,
            CsvQuote::Always => csv::QuoteStyle::Always,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub mode: ColumnMode,
    pub column: Option<ColumnSelector>,
    pub has_header: bool,
    /// Header for the translated column; defaults to the target namespace's column.
    pub target_column: Option<String>,
    /// JSON keys whose values are labels; defaults to the source namespace's key.
    pub label_keys: Vec<String>,
    pub strict_names: bool,
    /// Record unknown labels in the stats and keep them as written instead of failing.
    pub keep_unknown: bool,
    pub delimiter: u8,
    pub quote: CsvQuote,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            mode: ColumnMode::Replace,
            column: None,
            has_header: true,
            target_column: None,
            label_keys: Vec::new(),
            strict_names: false,
            keep_unknown: false,
            delimiter: b',',
            quote: CsvQuote::Necessary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedValue {
    pub row: usize,
    pub original: String,
    pub resolved: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranslationStats {
    pub records: usize,
    pub translated: usize,
    pub already_translated: usize,
    pub normalized: Vec<NormalizedValue>,
    pub unknown: BTreeMap<String, usize>,
    /// The CSV header or the top-level JSON shape was rewritten.
    pub layout_changed: bool,
}

impl TranslationStats {
    pub fn is_unchanged(&self) -> bool {
        self.translated == 0 && !self.layout_changed
    }
}

pub struct RecordTranslator<'a> {
    table: &'a CrosswalkTable,
    request: TranslationRequest,
    options: TranslateOptions,
}

impl<'a> RecordTranslator<'a> {
    pub fn new(
        table: &'a CrosswalkTable,
        request: TranslationRequest,
        options: TranslateOptions,
    ) -> Result<Self, CrosswalkError> {
        if request.source == request.target {
            return Err(CrosswalkError::Usage(format!(
                "source and target namespace are both {}",
                request.source
            )));
        }
        if request.table_version != table.version() {
            return Err(CrosswalkError::Usage(format!(
                "request targets table {:?} but {:?} is loaded",
                request.table_version,
                table.version()
            )));
        }
        Ok(Self {
            table,
            request,
            options,
        })
    }

    pub fn request(&self) -> &TranslationRequest {
        &self.request
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    fn source(&self) -> Namespace {
        self.request.source
    }

    fn target(&self) -> Namespace {
        self.request.target
    }

    fn target_column(&self) -> &str {
        self.options
            .target_column
            .as_deref()
            .unwrap_or_else(|| self.target().default_column())
    }

    /// Value-driven translation: a value already valid in the target passes through.
    fn translate_or_keep(
        &self,
        value: &str,
        row: usize,
        stats: &mut TranslationStats,
    ) -> Result<String, CrosswalkError> {
        let translation = self
            .table
            .translate_idempotent(value, self.source(), self.target());
        self.record(translation, value, row, stats)
    }

    /// Source-driven translation, used once the column is known to hold source labels.
    fn translate_from_source(
        &self,
        value: &str,
        row: usize,
        stats: &mut TranslationStats,
    ) -> Result<String, CrosswalkError> {
        let translation = self
            .table
            .translate_value(value, self.source(), self.target());
        self.record(translation, value, row, stats)
    }

    fn record(
        &self,
        translation: Result<Translation, CrosswalkError>,
        value: &str,
        row: usize,
        stats: &mut TranslationStats,
    ) -> Result<String, CrosswalkError> {
        let translation = match translation {
            Ok(translation) => translation,
            Err(CrosswalkError::UnknownLabel { .. }) if self.options.keep_unknown => {
                *stats.unknown.entry(value.to_string()).or_default() += 1;
                return Ok(value.to_string());
            }
            Err(err) => return Err(err.at_row(row)),
        };
        match translation.outcome {
            Outcome::AlreadyTranslated => {
                stats.already_translated += 1;
                return Ok(translation.value);
            }
            Outcome::Normalized { original } => {
                let resolved = self
                    .table
                    .resolve_name(&original)
                    .map(|(name, _)| name.to_string())
                    .unwrap_or_else(|| translation.value.clone());
                if self.options.strict_names {
                    return Err(CrosswalkError::NameNormalization {
                        value: original,
                        normalized: resolved,
                    }
                    .at_row(row));
                }
                tracing::warn!(row, original = ?original, resolved = %resolved, "label matched after whitespace normalization");
                stats.normalized.push(NormalizedValue {
                    row,
                    original,
                    resolved,
                });
            }
            Outcome::Translated => {}
        }
        stats.translated += 1;
        Ok(translation.value)
    }
}
