use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use label_crosswalk::app::{App, LogSink, ProgressSink, RunOptions};
use label_crosswalk::config::SnapshotLoader;
use label_crosswalk::counts::{CountsResult, count_column, write_counts};
use label_crosswalk::domain::Namespace;
use label_crosswalk::error::CrosswalkError;
use label_crosswalk::output::{HumanOutput, JsonOutput, OutputMode};
use label_crosswalk::store::{OutputTarget, Store};
use label_crosswalk::table::ConflictPolicy;
use label_crosswalk::translate::{ColumnMode, ColumnSelector, CsvQuote, TranslateOptions};

#[derive(Parser)]
#[command(name = "crosswalk")]
#[command(about = "Remap taxonomic label ids and names between label-tree versions")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Translate label columns in every CSV/JSON file of a directory")]
    Translate(TranslateArgs),
    #[command(about = "Report labels missing from the table without writing anything")]
    Check(CheckArgs),
    #[command(about = "Translate a single value")]
    Lookup(LookupArgs),
    #[command(about = "Load a snapshot and report its contents")]
    Validate(TableArgs),
    #[command(about = "Count occurrences of each value in a CSV column")]
    Counts(CountsArgs),
}

#[derive(Args, Clone)]
struct TableArgs {
    /// Snapshot file(s); several are merged in order.
    #[arg(long = "table", required = true)]
    tables: Vec<Utf8PathBuf>,

    /// Let later entries overwrite conflicting earlier ones instead of failing.
    #[arg(long, conflicts_with = "keep_existing")]
    allow_overwrite: bool,

    /// Keep the first of two conflicting entries instead of failing.
    #[arg(long)]
    keep_existing: bool,
}

impl TableArgs {
    fn policy(&self) -> ConflictPolicy {
        if self.allow_overwrite {
            ConflictPolicy::Overwrite
        } else if self.keep_existing {
            ConflictPolicy::KeepExisting
        } else {
            ConflictPolicy::Reject
        }
    }
}

#[derive(Args, Clone)]
struct RecordArgs {
    #[arg(long, value_enum)]
    from: Namespace,

    #[arg(long, value_enum)]
    to: Namespace,

    /// Label column, by header name or zero-based index.
    #[arg(long)]
    column: Option<String>,

    #[arg(long, value_enum, default_value_t = ColumnMode::Replace)]
    mode: ColumnMode,

    /// Header for the translated column.
    #[arg(long)]
    target_column: Option<String>,

    /// JSON keys holding labels (repeatable).
    #[arg(long = "json-key")]
    json_keys: Vec<String>,

    #[arg(long)]
    no_header: bool,

    /// Fail on names that only match after whitespace normalization.
    #[arg(long)]
    strict_names: bool,

    #[arg(long, default_value_t = ',')]
    delimiter: char,

    #[arg(long, value_enum, default_value_t = CsvQuote::Necessary)]
    quote: CsvQuote,
}

impl RecordArgs {
    fn options(&self) -> Result<TranslateOptions, CrosswalkError> {
        let column = self
            .column
            .as_deref()
            .map(str::parse::<ColumnSelector>)
            .transpose()?;
        Ok(TranslateOptions {
            mode: self.mode,
            column,
            has_header: !self.no_header,
            target_column: self.target_column.clone(),
            label_keys: self.json_keys.clone(),
            strict_names: self.strict_names,
            keep_unknown: false,
            delimiter: delimiter_byte(self.delimiter)?,
            quote: self.quote,
        })
    }
}

#[derive(Args)]
struct TranslateArgs {
    #[command(flatten)]
    table: TableArgs,

    #[command(flatten)]
    record: RecordArgs,

    input_dir: Utf8PathBuf,

    /// Defaults to <input-dir>/translated.
    #[arg(long, conflicts_with = "in_place")]
    output_dir: Option<Utf8PathBuf>,

    /// Overwrite inputs, keeping a timestamped .bak copy of each changed file.
    #[arg(long)]
    in_place: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    table: TableArgs,

    #[command(flatten)]
    record: RecordArgs,

    input_dir: Utf8PathBuf,

    /// Also write the unknown labels as a label,count CSV.
    #[arg(long)]
    report: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct LookupArgs {
    #[command(flatten)]
    table: TableArgs,

    #[arg(long, value_enum)]
    from: Namespace,

    #[arg(long, value_enum)]
    to: Namespace,

    value: String,
}

#[derive(Args)]
struct CountsArgs {
    input: Utf8PathBuf,

    /// Column to count, by header name or zero-based index.
    #[arg(long)]
    column: String,

    /// Defaults to the input file's directory.
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CrosswalkError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CrosswalkError) -> u8 {
    if error.is_table_error() {
        return 3;
    }
    match error.root() {
        CrosswalkError::BatchFailed { .. }
        | CrosswalkError::UnknownLabel { .. }
        | CrosswalkError::MalformedRow { .. }
        | CrosswalkError::NameNormalization { .. } => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Translate(args) => run_translate(args, output_mode),
        Commands::Check(args) => run_check(args, output_mode),
        Commands::Lookup(args) => run_lookup(args, output_mode),
        Commands::Validate(args) => run_validate(args, output_mode),
        Commands::Counts(args) => run_counts(args, output_mode),
    }
}

fn load_app(args: &TableArgs) -> Result<App, CrosswalkError> {
    let table = SnapshotLoader::load_many(&args.tables, args.policy())?;
    Ok(App::new(table))
}

fn sink_for(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Human => &LogSink,
        OutputMode::Json => &JsonOutput,
    }
}

fn run_translate(args: TranslateArgs, output_mode: OutputMode) -> miette::Result<()> {
    let TranslateArgs {
        table,
        record,
        input_dir,
        output_dir,
        in_place,
        dry_run,
    } = args;

    // Table problems are fatal before any data file is opened.
    let app = load_app(&table)?;
    let options = record.options()?;
    let target = if in_place {
        OutputTarget::InPlace
    } else {
        OutputTarget::Directory(
            output_dir.unwrap_or_else(|| Store::default_output_dir(&input_dir)),
        )
    };
    let store = Store::new(input_dir, target)?;
    let request = app.request(record.from, record.to);

    let result = app.translate(
        &store,
        request,
        options,
        RunOptions { dry_run },
        sink_for(output_mode),
    )?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_batch(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_batch(&result),
    }
    result.into_result().map_err(|(_, err)| err)?;
    Ok(())
}

fn run_check(args: CheckArgs, output_mode: OutputMode) -> miette::Result<()> {
    let app = load_app(&args.table)?;
    let options = args.record.options()?;
    let store = Store::new(args.input_dir, OutputTarget::InPlace)?;
    let request = app.request(args.record.from, args.record.to);
    let result = app.check(&store, request, options, sink_for(output_mode))?;

    if let Some(path) = &args.report {
        write_unknown_report(path, &result)?;
    }
    match output_mode {
        OutputMode::Json => JsonOutput::print_check(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_check(&result),
    }
    if !result.is_clean() {
        let failed = result
            .files
            .iter()
            .filter(|file| !file.unknown.is_empty() || file.error.is_some())
            .count();
        return Err(CrosswalkError::BatchFailed {
            failed,
            total: result.files.len(),
        }
        .into());
    }
    Ok(())
}

fn write_unknown_report(
    path: &Utf8PathBuf,
    result: &label_crosswalk::app::CheckResult,
) -> Result<(), CrosswalkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["label", "count"])?;
    for entry in result.totals() {
        writer.write_record([entry.label.as_str(), entry.count.to_string().as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| CrosswalkError::Csv(err.to_string()))?;
    Store::write_bytes_atomic(path, &bytes)
}

fn run_lookup(args: LookupArgs, output_mode: OutputMode) -> miette::Result<()> {
    let app = load_app(&args.table)?;
    let result = app.lookup(&args.value, args.from, args.to)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_lookup(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_lookup(&result),
    }
    Ok(())
}

fn run_validate(args: TableArgs, output_mode: OutputMode) -> miette::Result<()> {
    let app = load_app(&args)?;
    let result = app.validate();
    match output_mode {
        OutputMode::Json => JsonOutput::print_validate(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_validate(&result),
    }
    Ok(())
}

fn run_counts(args: CountsArgs, output_mode: OutputMode) -> miette::Result<()> {
    let column = args.column.parse::<ColumnSelector>()?;
    let delimiter = delimiter_byte(args.delimiter)?;
    let counts = count_column(&args.input, &column, delimiter)?;
    let output_dir = args.output_dir.unwrap_or_else(|| {
        args.input
            .parent()
            .map(|parent| parent.to_path_buf())
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    });
    let output = write_counts(&counts, &args.input, &output_dir)?;
    let result = CountsResult {
        input: args.input.to_string(),
        output: output.to_string(),
        column: counts.column.clone(),
        rows: counts.rows,
        distinct: counts.counts.len(),
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_counts(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_counts(&result),
    }
    Ok(())
}

fn delimiter_byte(delimiter: char) -> Result<u8, CrosswalkError> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(CrosswalkError::Usage(format!(
            "delimiter must be a single ASCII character, got {delimiter:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_not_table_errors() {
        let err = delimiter_byte('§').unwrap_err();
        assert_eq!(map_exit_code(&err), 1);
        let err = "  ".parse::<ColumnSelector>().unwrap_err();
        assert_eq!(map_exit_code(&err), 1);
    }

    #[test]
    fn exit_codes_follow_the_root_cause() {
        let table = CrosswalkError::InvalidEntry("empty label name".to_string());
        assert_eq!(map_exit_code(&table), 3);
        let row = CrosswalkError::UnknownLabel {
            namespace: Namespace::BiigleId,
            value: "9999".to_string(),
        }
        .at_row(3)
        .in_file("labels.csv");
        assert_eq!(map_exit_code(&row), 2);
    }
}
