use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AwrError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("wrong tables configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("can't build selector '{0}'")]
    Selector(String),

    #[error("{file}: can't parse snapshot time '{value}': {source}")]
    SnapshotTime {
        file: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("{file}: snapshot information table has no begin/end time cells")]
    MalformedSnapshot { file: String },

    #[error("{file}: section '{section}' found before instance and snapshot information")]
    MissingBase { file: String, section: String },

    #[error("{table}: missing system info column {column}")]
    MissingSystemColumns { table: String, column: String },

    #[error("{table}: line {line} has {found} fields, header has {expected}")]
    BadRow {
        table: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{table}: value '{value}' in column {column} is not a number")]
    BadNumber {
        table: String,
        column: String,
        value: String,
    },

    #[error("{table}: unknown column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("{table}: system info already removed from the table")]
    SystemInfoDropped { table: String },

    #[error("{table}: category '{category}' has {found} values for {expected} timestamps")]
    ShapeMismatch {
        table: String,
        category: String,
        expected: usize,
        found: usize,
    },

    #[error("no parsed data for {0}")]
    MissingTable(String),

    #[error("timestamp format is not correct: '{0}'")]
    BadTimestamp(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AwrError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AwrError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, AwrError>;
