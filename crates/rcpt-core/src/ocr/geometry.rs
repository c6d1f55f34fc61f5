//! Read-only geometry view over OCR output.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{BoundingBox, OcrDocument, OcrLine, OcrWord, Point};

/// A text unit that can be located on the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextUnit {
    /// A whole line, by line index.
    Line(usize),
    /// A word, by owning line index and position within that line.
    Word { line: usize, position: usize },
}

/// Location of a text unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub text: String,
    pub bounding_box: BoundingBox,
    pub polygon: Vec<Point>,
    pub confidence: f32,
}

impl From<&OcrLine> for Geometry {
    fn from(line: &OcrLine) -> Self {
        Self {
            text: line.text.clone(),
            bounding_box: line.bounding_box,
            polygon: line.polygon.clone(),
            confidence: line.confidence,
        }
    }
}

impl From<&OcrWord> for Geometry {
    fn from(word: &OcrWord) -> Self {
        Self {
            text: word.text.clone(),
            bounding_box: word.bounding_box,
            polygon: word.polygon.clone(),
            confidence: word.confidence,
        }
    }
}

/// Borrowing lookup from text units to their geometry.
pub struct GeometryLookup<'a> {
    lines: &'a [OcrLine],
    words: HashMap<(usize, usize), &'a OcrWord>,
}

impl<'a> GeometryLookup<'a> {
    pub fn new(document: &'a OcrDocument) -> Self {
        let words = document
            .words
            .iter()
            .map(|w| ((w.line_index, w.position), w))
            .collect();

        Self {
            lines: &document.lines,
            words,
        }
    }

    /// Get a line by index.
    pub fn line(&self, index: usize) -> Option<&'a OcrLine> {
        self.lines.get(index)
    }

    /// Locate a line or word.
    pub fn locate(&self, unit: TextUnit) -> Option<Geometry> {
        match unit {
            TextUnit::Line(index) => self.line(index).map(Geometry::from),
            TextUnit::Word { line, position } => {
                self.words.get(&(line, position)).map(|w| Geometry::from(*w))
            }
        }
    }

    pub fn bounding_box(&self, index: usize) -> Option<BoundingBox> {
        self.line(index).map(|l| l.bounding_box)
    }

    /// Union of the bounding boxes of the given lines; unknown indices are
    /// skipped.
    pub fn union(&self, indices: &[usize]) -> Option<BoundingBox> {
        indices
            .iter()
            .filter_map(|&i| self.bounding_box(i))
            .reduce(|acc, b| acc.union(&b))
    }

    /// Words of a line in position order.
    pub fn words_of(&self, line: usize) -> Vec<&'a OcrWord> {
        let mut words: Vec<&OcrWord> = self
            .words
            .values()
            .filter(|w| w.line_index == line)
            .copied()
            .collect();
        words.sort_by_key(|w| w.position);
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> OcrDocument {
        let lines = vec![
            OcrLine::new(0, "123 BANANAS")
                .with_geometry(BoundingBox::new(0.1, 0.30, 0.4, 0.02), vec![]),
            OcrLine::new(1, "3.99").with_geometry(
                BoundingBox::new(0.8, 0.31, 0.1, 0.02),
                vec![Point::new(0.8, 0.31), Point::new(0.9, 0.31)],
            ),
        ];
        let words = vec![
            OcrWord {
                line_index: 0,
                position: 1,
                text: "BANANAS".to_string(),
                bounding_box: BoundingBox::new(0.2, 0.30, 0.3, 0.02),
                polygon: vec![],
                confidence: 98.5,
            },
            OcrWord {
                line_index: 0,
                position: 0,
                text: "123".to_string(),
                bounding_box: BoundingBox::new(0.1, 0.30, 0.08, 0.02),
                polygon: vec![],
                confidence: 99.1,
            },
        ];
        OcrDocument::new(lines).with_words(words)
    }

    #[test]
    fn test_locate_line_and_word() {
        let doc = document();
        let lookup = GeometryLookup::new(&doc);

        let line = lookup.locate(TextUnit::Line(1)).unwrap();
        assert_eq!(line.text, "3.99");
        assert_eq!(line.polygon.len(), 2);

        let word = lookup
            .locate(TextUnit::Word {
                line: 0,
                position: 1,
            })
            .unwrap();
        assert_eq!(word.text, "BANANAS");

        assert!(lookup.locate(TextUnit::Line(5)).is_none());
    }

    #[test]
    fn test_union_of_lines() {
        let doc = document();
        let lookup = GeometryLookup::new(&doc);
        let b = lookup.union(&[0, 1, 9]).unwrap();

        assert!((b.left - 0.1).abs() < 1e-6);
        assert!((b.right() - 0.9).abs() < 1e-6);
        assert!((b.bottom() - 0.33).abs() < 1e-6);
        assert!(lookup.union(&[]).is_none());
    }

    #[test]
    fn test_words_of_sorted() {
        let doc = document();
        let lookup = GeometryLookup::new(&doc);
        let texts: Vec<&str> = lookup.words_of(0).iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["123", "BANANAS"]);
    }
}
