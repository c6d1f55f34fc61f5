//! Error types for the rcpt-core library.

use thiserror::Error;

/// Main error type for the rcpt library.
#[derive(Error, Debug)]
pub enum RcptError {
    /// Receipt parsing error (malformed input).
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// OCR response loading error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Storage collaborator error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Structural problems with the OCR line sequence.
///
/// These are the only failures a parse surfaces; text-pattern problems are
/// reported as diagnostics on the result instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The line sequence is empty.
    #[error("receipt has no OCR lines")]
    EmptyInput,

    /// A line's index does not match its position in the sequence.
    #[error("line at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: usize },

    /// Bounding box or polygon is not usable.
    #[error("invalid geometry on line {index}: {reason}")]
    InvalidGeometry { index: usize, reason: String },

    /// Confidence is not a finite value in 0..=100.
    #[error("invalid confidence on line {index}: {value}")]
    InvalidConfidence { index: usize, value: f32 },
}

/// Errors related to loading OCR engine output.
#[derive(Error, Debug)]
pub enum OcrError {
    /// A block is missing a field the loader needs.
    #[error("block {block} is missing {field}")]
    MissingField { block: String, field: &'static str },

    /// The response is not valid JSON of the expected shape.
    #[error("malformed response: {0}")]
    Json(String),

    /// The response contains no LINE blocks.
    #[error("response contains no text lines")]
    NoLines,
}

/// Errors raised by a storage collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Conditional write failed because the key already exists.
    #[error("record already exists: {pk} / {sk}")]
    Duplicate { pk: String, sk: String },

    /// Backend-specific failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Result type for the rcpt library.
pub type Result<T> = std::result::Result<T, RcptError>;
