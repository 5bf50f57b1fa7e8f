//! Indexer error types

use askroute_common::errors::AppError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Cannot read source directory {path}: {source}")]
    SourceDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Extraction task for {path} failed: {message}")]
    Task { path: PathBuf, message: String },

    #[error("Failed to index {path}: {source}")]
    Index { path: PathBuf, source: AppError },
}
