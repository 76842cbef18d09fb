use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("invalid experiment accession: {0}")]
    InvalidAccession(String),

    #[error("missing config file ht-metaload.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("malformed XML in {path}: {message}")]
    Xml { path: String, message: String },

    #[error("malformed JSON in {path}: {message}")]
    Json { path: String, message: String },

    #[error("sample table in {0} has no header row")]
    EmptySampleTable(String),

    #[error("translation table error: {0}")]
    Translation(String),

    #[error("baseline lookup error: {0}")]
    Baseline(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
