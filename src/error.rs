//! Error types for the labeling core
//!
//! Only reportable failures live here. Messy-dataset problems (unresolvable
//! CSV rows, malformed bbox rows, missing reference files) are logged and
//! skipped by the loaders and never reach the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for labeling operations
#[derive(Error, Debug)]
pub enum LabelerError {
    /// File system failure on a specific path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON document (import, persisted unit, config)
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// CSV reader/writer failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Image decode/encode failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Export was asked for a format name we don't know
    #[error("Unknown export format: {0} (expected JSON, CSV, COCO or YOLO)")]
    UnknownFormat(String),

    /// Import file extension is neither .json nor .csv
    #[error("Unsupported import file: {}", .0.display())]
    UnsupportedImport(PathBuf),

    /// A field of an imported CSV row could not be parsed
    #[error("Invalid value {value:?} for field '{field}' on line {line}")]
    InvalidRecord {
        line: u64,
        field: &'static str,
        value: String,
    },

    /// Annotation position outside the image's sequence
    #[error("Annotation index {index} out of range for {path} ({len} annotations)")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LabelerError {
    /// Wrap an `std::io::Error` with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LabelerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a `serde_json::Error` with the file it came from
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        LabelerError::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type for labeling operations
pub type Result<T> = std::result::Result<T, LabelerError>;
