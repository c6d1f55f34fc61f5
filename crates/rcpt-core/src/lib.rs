//! Core library for receipt OCR parsing.
//!
//! This crate provides:
//! - OCR line model and an AWS Textract response loader
//! - Line classification for warehouse-style receipt layouts
//! - Item assembly (code, name, price, discount, tax flag) with geometry
//! - Subtotal / total / tax detection with label and value geometry
//! - The storage-collaborator interface for persisting parsed records

pub mod error;
pub mod models;
pub mod ocr;
pub mod receipt;
pub mod storage;

pub use error::{RcptError, Result};
pub use models::config::{ParserConfig, PriceConflict, RcptConfig};
pub use models::receipt::{
    Diagnostic, FieldName, FieldRecords, FieldRole, ItemRecord, ReceiptParseResult,
    SpecialFieldRecord,
};
pub use ocr::{BoundingBox, GeometryLookup, OcrDocument, OcrLine, OcrWord, Point, TextUnit};
pub use receipt::{ReceiptExtractor, ReceiptParser};
pub use storage::{MemorySink, ReceiptSink, StorageKey, store_result};
