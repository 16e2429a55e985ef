use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BatchResult, CheckResult, FileStatus, LookupResult, ValidateResult};
use crate::counts::CountsResult;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_lookup(result: &LookupResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_validate(result: &ValidateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_counts(result: &CountsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_batch(result: &BatchResult) {
        let verb = if result.dry_run { "would translate" } else { "translated" };
        println!(
            "{CYAN}crosswalk {} -> {} (table {}){RESET}",
            result.source, result.target, result.table_version
        );
        for file in &result.files {
            match file.status {
                FileStatus::Translated => println!(
                    "{GREEN}  {verb} {} ({} of {} records){RESET}",
                    file.path, file.translated, file.records
                ),
                FileStatus::Unchanged => println!(
                    "{YELLOW}  unchanged {} ({} already translated){RESET}",
                    file.path, file.already_translated
                ),
                FileStatus::Failed => println!(
                    "{RED}  failed {}: {}{RESET}",
                    file.path,
                    file.error.as_deref().unwrap_or("unknown error")
                ),
            }
            for value in &file.normalized {
                println!(
                    "{YELLOW}    row {}: {:?} matched as {:?}{RESET}",
                    value.row, value.original, value.resolved
                );
            }
            if let Some(path) = &file.output_path {
                println!("    output: {path}");
            }
            if let Some(path) = &file.backup_path {
                println!("    backup: {path}");
            }
        }
        let failed = result.failed();
        let color = if failed == 0 { GREEN } else { RED };
        println!(
            "{color}{} file(s), {} failed{RESET}",
            result.files.len(),
            failed
        );
    }

    pub fn print_check(result: &CheckResult) {
        println!(
            "{CYAN}check {} -> {} (table {}){RESET}",
            result.source, result.target, result.table_version
        );
        for file in &result.files {
            if let Some(error) = &file.error {
                println!("{RED}  {}: {error}{RESET}", file.path);
                continue;
            }
            if file.unknown.is_empty() {
                println!("{GREEN}  {}: all {} records mapped{RESET}", file.path, file.records);
                continue;
            }
            println!("{YELLOW}  {}: {} unknown label(s){RESET}", file.path, file.unknown.len());
            for entry in &file.unknown {
                println!("    {:?} x{}", entry.label, entry.count);
            }
        }
    }

    pub fn print_lookup(result: &LookupResult) {
        let note = if result.already_translated {
            " (already translated)"
        } else if result.normalized {
            " (after whitespace normalization)"
        } else {
            ""
        };
        println!(
            "{} {:?} -> {} {:?}{note}",
            result.source, result.value, result.target, result.translated
        );
        for id in &result.external_ids {
            println!("  {} {}", id.namespace, id.id);
        }
    }

    pub fn print_validate(result: &ValidateResult) {
        println!(
            "{GREEN}table {}: {} taxa, {} alias(es){RESET}",
            result.table_version, result.taxa, result.aliases
        );
        for count in &result.ids {
            println!("  {}: {} id(s)", count.namespace, count.count);
        }
        for notice in &result.normalized_names {
            println!(
                "{YELLOW}  normalized {:?} -> {:?}{RESET}",
                notice.raw, notice.normalized
            );
        }
    }

    pub fn print_counts(result: &CountsResult) {
        println!(
            "{GREEN}{} distinct {} value(s) over {} row(s) written to {}{RESET}",
            result.distinct, result.column, result.rows, result.output
        );
    }
}
