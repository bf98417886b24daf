use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum UpdateError {
    #[error("no download source known for dataset: {0}")]
    #[diagnostic(help("pass an explicit URL or add the dataset to `sources` in the config"))]
    FileNotFound(String),

    #[error("download of {url} failed with status {status}")]
    FailedDownload { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode gzip stream: {0}")]
    Decode(String),

    #[error("failed to resolve latest version: {0}")]
    Resolve(String),

    #[error("invalid dataset name: {0}")]
    InvalidDatasetName(String),

    #[error("duplicate dataset source: {0}")]
    DuplicateSource(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("failed to start scheduler: {0}")]
    Scheduler(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
