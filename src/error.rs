use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid mode: {0} (expected preview or load)")]
    InvalidMode(String),

    #[error("invalid flag value: {0} (expected 0 or 1)")]
    InvalidFlag(String),

    #[error("invalid accession id: {0}")]
    InvalidAccession(String),

    #[error("could not open input file {0}")]
    MissingInput(PathBuf),

    #[error("no input file given and INPUT_FILE_DEFAULT is not set")]
    NoInput,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no registry snapshot configured (use --snapshot or the snapshot config key)")]
    MissingSnapshot,

    #[error("failed to read snapshot at {0}")]
    SnapshotRead(PathBuf),

    #[error("failed to parse snapshot: {0}")]
    SnapshotParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("could not reserve key from counter {0}")]
    CounterReservation(String),

    #[error("registry store error: {0}")]
    Store(String),

    #[error("bulk load of {table} failed: {message}")]
    BulkLoad { table: String, message: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),
}
