use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Namespace;

#[derive(Debug, Error, Diagnostic)]
pub enum CrosswalkError {
    #[error("conflicting {namespace} entry for {key}: {existing:?} vs {incoming:?}")]
    #[diagnostic(help("fix the snapshot or pass --allow-overwrite to let the last entry win"))]
    DuplicateKeyConflict {
        namespace: Namespace,
        key: String,
        existing: String,
        incoming: String,
    },

    #[error("unknown {namespace} label: {value:?}")]
    UnknownLabel { namespace: Namespace, value: String },

    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("label name {value:?} only matches {normalized:?} after normalization")]
    NameNormalization { value: String, normalized: String },

    #[error("invalid {namespace} id: {value:?}")]
    InvalidLabelId { namespace: Namespace, value: String },

    #[error("invalid table entry: {0}")]
    InvalidEntry(String),

    #[error("invalid arguments: {0}")]
    Usage(String),

    #[error("failed to read snapshot file at {0}")]
    SnapshotRead(Utf8PathBuf),

    #[error("failed to parse snapshot: {0}")]
    SnapshotParse(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("row {row}: {source}")]
    AtRow {
        row: usize,
        #[source]
        source: Box<CrosswalkError>,
    },

    #[error("{file}: {source}")]
    InFile {
        file: Utf8PathBuf,
        #[source]
        source: Box<CrosswalkError>,
    },

    #[error("{failed} of {total} file(s) failed to translate")]
    BatchFailed { failed: usize, total: usize },
}

impl CrosswalkError {
    pub fn in_file(self, file: impl Into<Utf8PathBuf>) -> Self {
        match self {
            CrosswalkError::InFile { .. } => self,
            other => CrosswalkError::InFile {
                file: file.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn at_row(self, row: usize) -> Self {
        match self {
            CrosswalkError::MalformedRow { .. } | CrosswalkError::AtRow { .. } => self,
            other => CrosswalkError::AtRow {
                row,
                source: Box::new(other),
            },
        }
    }

    /// Strips file and row context, for callers matching on the underlying kind.
    pub fn root(&self) -> &CrosswalkError {
        match self {
            CrosswalkError::InFile { source, .. } | CrosswalkError::AtRow { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    pub fn is_table_error(&self) -> bool {
        matches!(
            self.root(),
            CrosswalkError::DuplicateKeyConflict { .. }
                | CrosswalkError::InvalidEntry(_)
                | CrosswalkError::InvalidLabelId { .. }
                | CrosswalkError::SnapshotRead(_)
                | CrosswalkError::SnapshotParse(_)
        )
    }
}

impl From<csv::Error> for CrosswalkError {
    fn from(err: csv::Error) -> Self {
        CrosswalkError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for CrosswalkError {
    fn from(err: serde_json::Error) -> Self {
        CrosswalkError::Json(err.to_string())
    }
}
