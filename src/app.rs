use std::fs;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{ExternalId, Namespace, TranslationRequest};
use crate::error::CrosswalkError;
use crate::store::{DataFile, FileFormat, OutputTarget, Store};
use crate::table::{CrosswalkTable, NameNotice, Outcome};
use crate::translate::{NormalizedValue, RecordTranslator, TranslateOptions, TranslationStats};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Translated,
    Unchanged,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub path: String,
    pub format: FileFormat,
    pub status: FileStatus,
    pub records: usize,
    pub translated: usize,
    pub already_translated: usize,
    pub normalized: Vec<NormalizedValue>,
    pub output_path: Option<String>,
    pub backup_path: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub table_version: String,
    pub source: Namespace,
    pub target: Namespace,
    pub dry_run: bool,
    pub files: Vec<FileResult>,
}

impl BatchResult {
    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|file| file.status == FileStatus::Failed)
            .count()
    }

    pub fn into_result(self) -> Result<Self, (Self, CrosswalkError)> {
        let failed = self.failed();
        if failed == 0 {
            return Ok(self);
        }
        let total = self.files.len();
        Err((self, CrosswalkError::BatchFailed { failed, total }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnknownCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckFile {
    pub path: String,
    pub records: usize,
    pub unknown: Vec<UnknownCount>,
    pub normalized: Vec<NormalizedValue>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub table_version: String,
    pub source: Namespace,
    pub target: Namespace,
    pub files: Vec<CheckFile>,
}

impl CheckResult {
    pub fn is_clean(&self) -> bool {
        self.files
            .iter()
            .all(|file| file.unknown.is_empty() && file.error.is_none())
    }

    /// Unknown labels summed over all files, sorted by label.
    pub fn totals(&self) -> Vec<UnknownCount> {
        let mut totals = std::collections::BTreeMap::<&str, usize>::new();
        for file in &self.files {
            for entry in &file.unknown {
                *totals.entry(entry.label.as_str()).or_default() += entry.count;
            }
        }
        totals
            .into_iter()
            .map(|(label, count)| UnknownCount {
                label: label.to_string(),
                count,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub table_version: String,
    pub value: String,
    pub source: Namespace,
    pub target: Namespace,
    pub translated: String,
    pub already_translated: bool,
    pub normalized: bool,
    pub external_ids: Vec<ExternalId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResult {
    pub table_version: String,
    pub taxa: usize,
    pub ids: Vec<NamespaceCount>,
    pub normalized_names: Vec<NameNotice>,
    pub aliases: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceCount {
    pub namespace: Namespace,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

/// Emits progress as tracing events.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct App {
    table: CrosswalkTable,
}

impl App {
    pub fn new(table: CrosswalkTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CrosswalkTable {
        &self.table
    }

    pub fn request(&self, source: Namespace, target: Namespace) -> TranslationRequest {
        TranslationRequest {
            source,
            target,
            table_version: self.table.version().to_string(),
        }
    }

    /// Translates every data file in the store. Files are independent: a failure is
    /// recorded in that file's result and the rest of the batch continues.
    pub fn translate(
        &self,
        store: &Store,
        request: TranslationRequest,
        options: TranslateOptions,
        run: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BatchResult, CrosswalkError> {
        let translator = RecordTranslator::new(&self.table, request.clone(), options)?;
        let files = store.discover()?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} file(s) under {}, {} -> {} with table {}",
                files.len(),
                store.input_root(),
                request.source,
                request.target,
                request.table_version
            ),
            elapsed: None,
        });

        let started = Instant::now();
        let results = files
            .par_iter()
            .map(|file| self.translate_one(&translator, store, file, run, sink))
            .collect::<Vec<_>>();

        sink.event(ProgressEvent {
            message: format!("phase=Done; {} file(s) processed", results.len()),
            elapsed: Some(started.elapsed()),
        });

        Ok(BatchResult {
            table_version: request.table_version,
            source: request.source,
            target: request.target,
            dry_run: run.dry_run,
            files: results,
        })
    }

    /// Scans files like [`translate`](Self::translate) but never writes and never
    /// aborts on unknown labels; they are counted instead.
    pub fn check(
        &self,
        store: &Store,
        request: TranslationRequest,
        options: TranslateOptions,
        sink: &dyn ProgressSink,
    ) -> Result<CheckResult, CrosswalkError> {
        let options = TranslateOptions {
            keep_unknown: true,
            ..options
        };
        let translator = RecordTranslator::new(&self.table, request.clone(), options)?;
        let files = store.discover()?;
        sink.event(ProgressEvent {
            message: format!("phase=Check; scanning {} file(s)", files.len()),
            elapsed: None,
        });

        let results = files
            .par_iter()
            .map(|file| match translate_file(&translator, file) {
                Ok((stats, _)) => CheckFile {
                    path: file.relative.to_string(),
                    records: stats.records,
                    unknown: stats
                        .unknown
                        .into_iter()
                        .map(|(label, count)| UnknownCount { label, count })
                        .collect(),
                    normalized: stats.normalized,
                    error: None,
                },
                Err(err) => CheckFile {
                    path: file.relative.to_string(),
                    records: 0,
                    unknown: Vec::new(),
                    normalized: Vec::new(),
                    error: Some(err.to_string()),
                },
            })
            .collect();

        Ok(CheckResult {
            table_version: request.table_version,
            source: request.source,
            target: request.target,
            files: results,
        })
    }

    pub fn lookup(
        &self,
        value: &str,
        source: Namespace,
        target: Namespace,
    ) -> Result<LookupResult, CrosswalkError> {
        let translation = self.table.translate_idempotent(value, source, target)?;
        let canonical = match target {
            Namespace::Name => translation.value.clone(),
            _ => self.table.lookup_by_id(target, &translation.value)?.to_string(),
        };
        let external_ids = self.table.lookup_by_name(&canonical)?;
        Ok(LookupResult {
            table_version: self.table.version().to_string(),
            value: value.to_string(),
            source,
            target,
            translated: translation.value,
            already_translated: translation.outcome == Outcome::AlreadyTranslated,
            normalized: matches!(translation.outcome, Outcome::Normalized { .. }),
            external_ids,
        })
    }

    pub fn validate(&self) -> ValidateResult {
        let taxa = self.table.taxa();
        let ids = Namespace::ID_SPACES
            .iter()
            .map(|namespace| NamespaceCount {
                namespace: *namespace,
                count: taxa
                    .iter()
                    .filter(|taxon| taxon.id_in(*namespace).is_some())
                    .count(),
            })
            .collect();
        ValidateResult {
            table_version: self.table.version().to_string(),
            taxa: taxa.len(),
            ids,
            normalized_names: self.table.notices().to_vec(),
            aliases: self.table.aliases().count(),
        }
    }

    fn translate_one(
        &self,
        translator: &RecordTranslator<'_>,
        store: &Store,
        file: &DataFile,
        run: RunOptions,
        sink: &dyn ProgressSink,
    ) -> FileResult {
        let started = Instant::now();
        let mut result = FileResult {
            path: file.relative.to_string(),
            format: file.format,
            status: FileStatus::Failed,
            records: 0,
            translated: 0,
            already_translated: 0,
            normalized: Vec::new(),
            output_path: None,
            backup_path: None,
            error: None,
        };

        let outcome = translate_file(translator, file)
            .and_then(|(stats, bytes)| {
                let written = if run.dry_run {
                    (None, None)
                } else {
                    write_output(store, file, &stats, &bytes)?
                };
                Ok((stats, written))
            })
            .map_err(|err| err.in_file(file.path.clone()));

        match outcome {
            Ok((stats, (output, backup))) => {
                result.status = if stats.is_unchanged() {
                    FileStatus::Unchanged
                } else {
                    FileStatus::Translated
                };
                result.records = stats.records;
                result.translated = stats.translated;
                result.already_translated = stats.already_translated;
                result.normalized = stats.normalized;
                result.output_path = output.map(|path| path.to_string());
                result.backup_path = backup.map(|path| path.to_string());
                sink.event(ProgressEvent {
                    message: format!(
                        "phase=Store; {} translated={} already={}",
                        file.relative, result.translated, result.already_translated
                    ),
                    elapsed: Some(started.elapsed()),
                });
            }
            Err(err) => {
                tracing::error!(file = %file.relative, error = %err, "translation failed");
                result.error = Some(err.to_string());
            }
        }
        result
    }
}

/// Translates one file in memory. Nothing touches the disk here.
pub fn translate_file(
    translator: &RecordTranslator<'_>,
    file: &DataFile,
) -> Result<(TranslationStats, Vec<u8>), CrosswalkError> {
    let text = fs::read_to_string(file.path.as_std_path())
        .map_err(|err| CrosswalkError::Filesystem(format!("read {}: {err}", file.path)))?;
    match file.format {
        FileFormat::Csv => {
            let mut buffer = Vec::with_capacity(text.len() + 64);
            let stats = translator.translate_csv_stream(text.as_bytes(), &mut buffer)?;
            Ok((stats, buffer))
        }
        FileFormat::Json => {
            let (value, stats) = translator.translate_json_tree(&text)?;
            let mut buffer = serde_json::to_vec_pretty(&value)?;
            buffer.push(b'\n');
            Ok((stats, buffer))
        }
    }
}

fn write_output(
    store: &Store,
    file: &DataFile,
    stats: &TranslationStats,
    bytes: &[u8],
) -> Result<(Option<Utf8PathBuf>, Option<Utf8PathBuf>), CrosswalkError> {
    match store.target() {
        OutputTarget::InPlace => {
            if stats.is_unchanged() {
                return Ok((None, None));
            }
            let backup = Store::backup_file(&file.path, Utc::now())?;
            Store::write_bytes_atomic(&file.path, bytes)?;
            Ok((Some(file.path.clone()), Some(backup)))
        }
        OutputTarget::Directory(_) => {
            let output = store.output_path(file);
            Store::write_bytes_atomic(&output, bytes)?;
            Ok((Some(output), None))
        }
    }
}
