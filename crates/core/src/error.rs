//! Error types for gridstore

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gridstore storage operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {cols}x{rows}")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("Row {row} out of range for raster with {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("Row length mismatch: expected {expected} values, got {actual}")]
    RowLengthMismatch { expected: usize, actual: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Value {value} does not fit the {data_type} storage type")]
    ValueOutOfRange { value: f64, data_type: &'static str },

    #[error("Raster {0} was opened read-only")]
    ReadOnly(PathBuf),

    #[error("Missing file: {0}")]
    MissingFile(PathBuf),

    #[error("Malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Result type alias for gridstore operations
pub type Result<T> = std::result::Result<T, Error>;
