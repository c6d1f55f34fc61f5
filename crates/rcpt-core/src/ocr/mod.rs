//! OCR engine output model.
//!
//! The parser only ever sees what an OCR engine hands back for a receipt
//! image: lines of text in reading order, each with normalized geometry and
//! a confidence score. Word-level units are kept when the engine reports them.

mod geometry;
pub mod textract;

pub use geometry::{Geometry, GeometryLookup, TextUnit};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Normalized axis-aligned box; all values are fractions of the image size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Smallest box enclosing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        BoundingBox::new(left, top, right - left, bottom - top)
    }

    fn check(&self) -> Option<&'static str> {
        let values = [self.left, self.top, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) {
            return Some("bounding box is not finite");
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Some("bounding box has negative size");
        }
        None
    }
}

/// A polygon vertex in normalized image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One line of recognized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    /// Position of the line in reading order.
    pub index: usize,

    /// Recognized text as reported by the engine.
    pub text: String,

    /// Normalized bounding box.
    pub bounding_box: BoundingBox,

    /// Precise outline, usually four points clockwise from top-left.
    #[serde(default)]
    pub polygon: Vec<Point>,

    /// Recognition confidence on a 0-100 scale.
    pub confidence: f32,
}

impl OcrLine {
    /// Create a line without geometry.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            bounding_box: BoundingBox::default(),
            polygon: Vec::new(),
            confidence: 100.0,
        }
    }

    pub fn with_geometry(mut self, bounding_box: BoundingBox, polygon: Vec<Point>) -> Self {
        self.bounding_box = bounding_box;
        self.polygon = polygon;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

/// A word belonging to a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    /// Index of the owning line.
    pub line_index: usize,
    /// Position of the word within its line.
    pub position: usize,
    pub text: String,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub polygon: Vec<Point>,
    pub confidence: f32,
}

/// OCR output for one receipt image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrDocument {
    /// Opaque receipt identifier (usually the object key of the image).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,

    /// Lines in reading order.
    pub lines: Vec<OcrLine>,

    /// Word-level units, if the engine reported them.
    #[serde(default)]
    pub words: Vec<OcrWord>,
}

impl OcrDocument {
    /// Create a document from lines.
    pub fn new(lines: Vec<OcrLine>) -> Self {
        Self {
            receipt_id: None,
            lines,
            words: Vec::new(),
        }
    }

    /// Build a geometry-less document from plain text, one line per
    /// non-empty input line.
    pub fn from_text(text: &str) -> Self {
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(index, text)| OcrLine::new(index, text))
            .collect();

        Self::new(lines)
    }

    pub fn with_receipt_id(mut self, receipt_id: impl Into<String>) -> Self {
        self.receipt_id = Some(receipt_id.into());
        self
    }

    pub fn with_words(mut self, words: Vec<OcrWord>) -> Self {
        self.words = words;
        self
    }

    /// Check the transport-level shape of the line sequence.
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.lines.is_empty() {
            return Err(ParseError::EmptyInput);
        }

        for (position, line) in self.lines.iter().enumerate() {
            if line.index != position {
                return Err(ParseError::IndexMismatch {
                    position,
                    index: line.index,
                });
            }

            if let Some(reason) = line.bounding_box.check() {
                return Err(ParseError::InvalidGeometry {
                    index: line.index,
                    reason: reason.to_string(),
                });
            }

            if line
                .polygon
                .iter()
                .any(|p| !p.x.is_finite() || !p.y.is_finite())
            {
                return Err(ParseError::InvalidGeometry {
                    index: line.index,
                    reason: "polygon point is not finite".to_string(),
                });
            }

            if !line.confidence.is_finite() || !(0.0..=100.0).contains(&line.confidence) {
                return Err(ParseError::InvalidConfidence {
                    index: line.index,
                    value: line.confidence,
                });
            }
        }

        Ok(())
    }
}
