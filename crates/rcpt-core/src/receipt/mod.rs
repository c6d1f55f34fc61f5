//! Receipt parsing: line classification, item assembly and special fields.

mod assembler;
mod classifier;
mod fields;
mod parser;
pub mod patterns;

pub use assembler::{Assembly, ItemAssembler};
pub use classifier::{LineClass, LineClassifier};
pub use fields::{Detection, SpecialFieldDetector};
pub use parser::ReceiptParser;

use crate::error::ParseError;
use crate::models::receipt::ReceiptParseResult;
use crate::ocr::OcrDocument;

/// Result type for parse operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Trait for receipt extractors.
pub trait ReceiptExtractor {
    /// Extract items and special fields from OCR output.
    fn extract(&self, document: &OcrDocument) -> Result<ReceiptParseResult>;

    /// Extract from plain text, one OCR line per text line.
    fn extract_from_text(&self, text: &str) -> Result<ReceiptParseResult> {
        self.extract(&OcrDocument::from_text(text))
    }
}
