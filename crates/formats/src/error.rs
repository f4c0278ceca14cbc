//! Error types for the file format codecs.

use thiserror::Error;

/// Errors produced by the GeoTIFF, LAS, Shapefile and DBF codecs.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TIFF: {reason}")]
    InvalidTiff { reason: String },

    #[error("invalid LAS file: {reason}")]
    InvalidLas { reason: String },

    #[error("invalid shapefile: {reason}")]
    InvalidShapefile { reason: String },

    #[error("invalid DBF table: {reason}")]
    InvalidDbf { reason: String },

    #[error("unsupported sample layout: bits_per_sample={bps}, sample_format={sf}")]
    UnsupportedSampleType { bps: u16, sf: u16 },

    #[error("shape type mismatch: file holds {expected}, record is {actual}")]
    ShapeTypeMismatch { expected: String, actual: String },

    #[error("record has {actual} attribute values, table has {expected} fields")]
    FieldCountMismatch { expected: usize, actual: usize },

    #[error("field {field} not found")]
    FieldNotFound { field: String },

    #[error("value {value} does not fit field {field} (length {length})")]
    FieldOverflow { field: String, value: String, length: usize },

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("core error: {0}")]
    Core(#[from] gridstore_core::Error),
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, FormatError>;

pub(crate) fn invalid_tiff(reason: impl Into<String>) -> FormatError {
    FormatError::InvalidTiff { reason: reason.into() }
}

pub(crate) fn invalid_las(reason: impl Into<String>) -> FormatError {
    FormatError::InvalidLas { reason: reason.into() }
}

pub(crate) fn invalid_shapefile(reason: impl Into<String>) -> FormatError {
    FormatError::InvalidShapefile { reason: reason.into() }
}

pub(crate) fn invalid_dbf(reason: impl Into<String>) -> FormatError {
    FormatError::InvalidDbf { reason: reason.into() }
}
