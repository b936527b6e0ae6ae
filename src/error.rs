use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a filter or dedup run.
///
/// Load failures name the file, evaluation failures name the column. None of
/// them are retried.
#[derive(Debug, Error)]
pub enum SiftError {
    #[error("input file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("could not read {} as a table: {reason}", path.display())]
    ParseFailure { path: PathBuf, reason: String },

    #[error("column '{column}' not found in {table}")]
    ColumnNotFound { column: String, table: String },

    #[error("type mismatch on column '{column}': {detail}")]
    TypeMismatch { column: String, detail: String },

    #[error("invalid filter value for column '{column}': {detail}")]
    InvalidValue { column: String, detail: String },

    #[error("similarity threshold must be within 0..=100, got {0}")]
    InvalidThreshold(u32),

    #[error("unsupported output format: .{0}")]
    UnsupportedFormat(String),

    #[error("failed to write {}: {reason}", path.display())]
    WriteFailure { path: PathBuf, reason: String },

    #[error("invalid configuration in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, SiftError>;
