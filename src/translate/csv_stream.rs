use std::io::{Read, Write};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use super::{ColumnMode, ColumnSelector, RecordTranslator, TranslationStats};
use crate::domain::{LabelId, Namespace};
use crate::error::CrosswalkError;

/// Where the translated labels go once the header has been inspected.
enum Plan {
    /// Column holds source labels; overwrite each cell.
    Replace { column: usize },
    /// Column may hold a mix of translated and stale values.
    Revalidate { column: usize },
    /// Insert a fresh target column before the source column.
    Insert { source: usize },
    /// Target column already exists; fill or repair it from the source column.
    Fill { source: usize, target: usize },
}

impl RecordTranslator<'_> {
    /// Translates one CSV document. Every row is validated before anything is written,
    /// so a failure leaves `output` untouched.
    pub fn translate_csv_stream<R: Read, W: Write>(
        &self,
        input: R,
        output: W,
    ) -> Result<TranslationStats, CrosswalkError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.options.delimiter)
            .from_reader(input);

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let line = record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or(index + 1);
            rows.push((line, record));
        }

        let mut stats = TranslationStats::default();
        let Some((_, first)) = rows.first() else {
            return Ok(stats);
        };
        let width = first.len();
        for (line, record) in &rows {
            if record.len() != width {
                return Err(CrosswalkError::MalformedRow {
                    row: *line,
                    reason: format!("expected {width} fields, found {}", record.len()),
                });
            }
        }

        let mut out_rows: Vec<StringRecord> = Vec::with_capacity(rows.len());
        let plan = if self.options.has_header {
            let (plan, header) = self.plan_with_header(first)?;
            if header != *first {
                stats.layout_changed = true;
            }
            out_rows.push(header);
            self.apply_plan(&plan, &rows[1..], &mut out_rows, &mut stats)?;
            plan
        } else {
            let plan = self.plan_without_header(width)?;
            self.apply_plan(&plan, &rows, &mut out_rows, &mut stats)?;
            plan
        };
        tracing::debug!(
            records = stats.records,
            translated = stats.translated,
            already = stats.already_translated,
            plan = plan.describe(),
            "csv translated"
        );

        let mut writer = WriterBuilder::new()
            .delimiter(self.options.delimiter)
            .quote_style(self.options.quote.into())
            .from_writer(output);
        for record in &out_rows {
            writer.write_record(record)?;
        }
        writer
            .flush()
            .map_err(|err| CrosswalkError::Filesystem(err.to_string()))?;
        Ok(stats)
    }

    fn plan_with_header(
        &self,
        header: &StringRecord,
    ) -> Result<(Plan, StringRecord), CrosswalkError> {
        let target_name = self.target_column().to_string();
        let position = |name: &str| {
            header
                .iter()
                .position(|field| field.trim_start_matches('\u{feff}').trim() == name)
        };
        let target_index = position(&target_name);

        let source_index = match &self.options.column {
            Some(ColumnSelector::Index(index)) => {
                if *index >= header.len() {
                    return Err(out_of_range(*index, header.len()));
                }
                Some(*index)
            }
            Some(ColumnSelector::Name(name)) => position(name),
            None => position(self.source().default_column()),
        };

        match self.options.mode {
            ColumnMode::Replace => match (source_index, target_index) {
                (Some(column), Some(target)) if column == target => {
                    Ok((Plan::Revalidate { column }, header.clone()))
                }
                (Some(column), Some(target)) => Err(CrosswalkError::MalformedRow {
                    row: 1,
                    reason: format!(
                        "target column {target_name:?} already present at index {target}; \
                         use insert mode to check it against column {column}"
                    ),
                }),
                (Some(column), None) => {
                    let renamed = header
                        .iter()
                        .enumerate()
                        .map(|(index, field)| {
                            if index == column {
                                target_name.as_str()
                            } else {
                                field
                            }
                        })
                        .collect::<StringRecord>();
                    Ok((Plan::Replace { column }, renamed))
                }
                (None, Some(column)) => Ok((Plan::Revalidate { column }, header.clone())),
                (None, None) => Err(self.missing_column(header)),
            },
            ColumnMode::Insert => {
                let Some(source) = source_index else {
                    return Err(self.missing_column(header));
                };
                match target_index {
                    Some(target) if target != source => {
                        Ok((Plan::Fill { source, target }, header.clone()))
                    }
                    Some(_) => Err(CrosswalkError::MalformedRow {
                        row: 1,
                        reason: format!(
                            "source and target columns are both {target_name:?}"
                        ),
                    }),
                    None => {
                        let mut fields: Vec<&str> = header.iter().collect();
                        fields.insert(source, target_name.as_str());
                        Ok((Plan::Insert { source }, StringRecord::from(fields)))
                    }
                }
            }
        }
    }

    fn plan_without_header(&self, width: usize) -> Result<Plan, CrosswalkError> {
        if self.options.mode == ColumnMode::Insert {
            return Err(CrosswalkError::MalformedRow {
                row: 1,
                reason: "inserting a column requires a header row".to_string(),
            });
        }
        let column = match &self.options.column {
            Some(ColumnSelector::Index(index)) => *index,
            Some(ColumnSelector::Name(name)) => {
                return Err(CrosswalkError::MalformedRow {
                    row: 1,
                    reason: format!("cannot select column {name:?} without a header row"),
                });
            }
            None => 0,
        };
        if column >= width {
            return Err(out_of_range(column, width));
        }
        Ok(Plan::Revalidate { column })
    }

    fn apply_plan(
        &self,
        plan: &Plan,
        rows: &[(usize, StringRecord)],
        out_rows: &mut Vec<StringRecord>,
        stats: &mut TranslationStats,
    ) -> Result<(), CrosswalkError> {
        for (line, record) in rows {
            stats.records += 1;
            let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
            match *plan {
                Plan::Replace { column } => {
                    fields[column] = self.translate_from_source(&fields[column], *line, stats)?;
                }
                Plan::Revalidate { column } => {
                    fields[column] = self.translate_or_keep(&fields[column], *line, stats)?;
                }
                Plan::Insert { source } => {
                    let value = self.translate_from_source(&fields[source], *line, stats)?;
                    fields.insert(source, value);
                }
                Plan::Fill { source, target } => {
                    if fields[target].trim().is_empty() {
                        fields[target] =
                            self.translate_from_source(&fields[source], *line, stats)?;
                    } else {
                        self.confirm_existing(&fields[source], &fields[target], *line, stats)?;
                    }
                }
            }
            out_rows.push(StringRecord::from(fields));
        }
        Ok(())
    }

    /// A filled target cell must agree with what its source cell translates to.
    fn confirm_existing(
        &self,
        source_value: &str,
        current: &str,
        row: usize,
        stats: &mut TranslationStats,
    ) -> Result<(), CrosswalkError> {
        let expected = match self
            .table
            .translate_value(source_value, self.source(), self.target())
        {
            Ok(translation) => translation.value,
            Err(CrosswalkError::UnknownLabel { .. }) if self.options.keep_unknown => {
                *stats.unknown.entry(source_value.to_string()).or_default() += 1;
                return Ok(());
            }
            Err(err) => return Err(err.at_row(row)),
        };
        let agrees = match self.target() {
            Namespace::Name => self
                .table
                .resolve_name(current)
                .is_some_and(|(name, _)| name == expected),
            target => LabelId::parse(target, current).is_ok_and(|id| id.as_str() == expected),
        };
        if !agrees {
            return Err(CrosswalkError::MalformedRow {
                row,
                reason: format!(
                    "{} is {current:?} but {source_value:?} translates to {expected:?}",
                    self.target_column()
                ),
            });
        }
        stats.already_translated += 1;
        Ok(())
    }

    fn missing_column(&self, header: &StringRecord) -> CrosswalkError {
        let wanted = match &self.options.column {
            Some(selector) => selector.to_string(),
            None => self.source().default_column().to_string(),
        };
        CrosswalkError::MalformedRow {
            row: 1,
            reason: format!(
                "header has no {wanted:?} column (found {})",
                header.iter().collect::<Vec<_>>().join(",")
            ),
        }
    }
}

impl Plan {
    fn describe(&self) -> &'static str {
        match self {
            Plan::Replace { .. } => "replace",
            Plan::Revalidate { .. } => "revalidate",
            Plan::Insert { .. } => "insert",
            Plan::Fill { .. } => "fill",
        }
    }
}

fn out_of_range(index: usize, width: usize) -> CrosswalkError {
    CrosswalkError::MalformedRow {
        row: 1,
        reason: format!("column index {index} out of range for {width} fields"),
    }
}
