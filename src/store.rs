use std::fs;
use std::io::Write;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::Builder;
use walkdir::{DirEntry, WalkDir};

use crate::error::CrosswalkError;

pub const BACKUP_EXTENSION: &str = "bak";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        match path.extension()?.to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub path: Utf8PathBuf,
    pub relative: Utf8PathBuf,
    pub format: FileFormat,
}

/// Where translated files go: a mirrored output tree, or back over the inputs.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    Directory(Utf8PathBuf),
    InPlace,
}

#[derive(Debug, Clone)]
pub struct Store {
    input_root: Utf8PathBuf,
    target: OutputTarget,
}

impl Store {
    pub fn new(input_root: Utf8PathBuf, target: OutputTarget) -> Result<Self, CrosswalkError> {
        if !input_root.as_std_path().is_dir() {
            return Err(CrosswalkError::Filesystem(format!(
                "input path is not a directory: {input_root}"
            )));
        }
        Ok(Self { input_root, target })
    }

    /// Output tree inside the input directory, used when none is given.
    pub fn default_output_dir(input_root: &Utf8Path) -> Utf8PathBuf {
        input_root.join("translated")
    }

    pub fn input_root(&self) -> &Utf8Path {
        &self.input_root
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    /// CSV and JSON files under the input root, sorted; backups and the output tree are skipped.
    /// Symlinks are not followed.
    pub fn discover(&self) -> Result<Vec<DataFile>, CrosswalkError> {
        let skip = match &self.target {
            OutputTarget::Directory(dir) => dir.as_std_path().canonicalize().ok(),
            OutputTarget::InPlace => None,
        };
        let walker = WalkDir::new(self.input_root.as_std_path())
            .into_iter()
            .filter_entry(|entry| !is_output_dir(entry, skip.as_deref()));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| CrosswalkError::Filesystem(err.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.into_path())
                .map_err(|path| CrosswalkError::Filesystem(format!("non-utf8 path {}", path.display())))?;
            if path.extension() == Some(BACKUP_EXTENSION) {
                continue;
            }
            let Some(format) = FileFormat::from_path(&path) else {
                continue;
            };
            let relative = path
                .strip_prefix(&self.input_root)
                .map(Utf8Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            files.push(DataFile {
                path,
                relative,
                format,
            });
        }
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    pub fn output_path(&self, file: &DataFile) -> Utf8PathBuf {
        match &self.target {
            OutputTarget::Directory(dir) => dir.join(&file.relative),
            OutputTarget::InPlace => file.path.clone(),
        }
    }

    pub fn backup_path(path: &Utf8Path, at: DateTime<Utc>) -> Utf8PathBuf {
        let stamp = at.format("%Y%m%dT%H%M%SZ");
        let file_name = path.file_name().unwrap_or("data");
        path.with_file_name(format!("{file_name}.{stamp}.{BACKUP_EXTENSION}"))
    }

    /// Copies `path` next to itself before it is overwritten.
    pub fn backup_file(path: &Utf8Path, at: DateTime<Utc>) -> Result<Utf8PathBuf, CrosswalkError> {
        let backup = Self::backup_path(path, at);
        if backup.as_std_path().exists() {
            return Err(CrosswalkError::Filesystem(format!(
                "backup already exists: {backup}"
            )));
        }
        fs::copy(path.as_std_path(), backup.as_std_path())
            .map_err(|err| CrosswalkError::Filesystem(format!("backup {path}: {err}")))?;
        Ok(backup)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CrosswalkError> {
        let parent = path
            .parent()
            .ok_or_else(|| CrosswalkError::Filesystem("invalid destination path".to_string()))?;
        let parent = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CrosswalkError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".crosswalk-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CrosswalkError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| CrosswalkError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CrosswalkError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn is_output_dir(entry: &DirEntry, skip: Option<&Path>) -> bool {
    entry.file_type().is_dir()
        && skip.is_some_and(|skip| entry.path().canonicalize().is_ok_and(|dir| dir == skip))
}
