use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;

use crate::error::CrosswalkError;
use crate::store::Store;
use crate::translate::ColumnSelector;

#[derive(Debug, Clone, Serialize)]
pub struct LabelCounts {
    pub column: String,
    pub rows: usize,
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountsResult {
    pub input: String,
    pub output: String,
    pub column: String,
    pub rows: usize,
    pub distinct: usize,
}

/// Counts occurrences of each distinct value in one column of a headed CSV file.
pub fn count_column(
    path: &Utf8Path,
    column: &ColumnSelector,
    delimiter: u8,
) -> Result<LabelCounts, CrosswalkError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_path(path.as_std_path())
        .map_err(|err| CrosswalkError::Csv(format!("failed to read {path}: {err}")))?;
    let headers = reader.headers()?.clone();
    let (index, name) = match column {
        ColumnSelector::Index(index) => {
            let name = headers.get(*index).ok_or_else(|| CrosswalkError::MalformedRow {
                row: 1,
                reason: format!("column index {index} out of range for {} fields", headers.len()),
            })?;
            (*index, name.to_string())
        }
        ColumnSelector::Name(name) => {
            let index = headers
                .iter()
                .position(|field| field.trim() == name)
                .ok_or_else(|| CrosswalkError::MalformedRow {
                    row: 1,
                    reason: format!(
                        "column {name:?} not found; available columns: {}",
                        headers.iter().collect::<Vec<_>>().join(",")
                    ),
                })?;
            (index, name.clone())
        }
    };

    let mut counts = BTreeMap::new();
    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|pos| pos.line() as usize).unwrap_or(rows + 2);
        let value = record.get(index).ok_or_else(|| CrosswalkError::MalformedRow {
            row: line,
            reason: format!("missing column {name:?}"),
        })?;
        *counts.entry(value.to_string()).or_default() += 1;
        rows += 1;
    }
    Ok(LabelCounts {
        column: name,
        rows,
        counts,
    })
}

/// Writes `counts_<file name>` into `output_dir` with a `<column>,count` header.
pub fn write_counts(
    counts: &LabelCounts,
    input: &Utf8Path,
    output_dir: &Utf8Path,
) -> Result<Utf8PathBuf, CrosswalkError> {
    let file_name = input.file_name().unwrap_or("labels.csv");
    let output = output_dir.join(format!("counts_{file_name}"));
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record([counts.column.as_str(), "count"])?;
    for (value, count) in &counts.counts {
        writer.write_record([value.as_str(), count.to_string().as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| CrosswalkError::Csv(err.to_string()))?;
    Store::write_bytes_atomic(&output, &bytes)?;
    tracing::info!(output = %output, distinct = counts.counts.len(), "wrote label counts");
    Ok(output)
}
