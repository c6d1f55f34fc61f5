//! Subtotal, total and tax detection with geometry.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::debug;

use super::classifier::LineClass;
use crate::models::config::ParserConfig;
use crate::models::receipt::{Diagnostic, FieldName, FieldRecords, FieldRole, SpecialFieldRecord};
use crate::ocr::{Geometry, GeometryLookup, TextUnit};

/// Output of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub fields: BTreeMap<FieldName, FieldRecords>,
    pub diagnostics: Vec<Diagnostic>,
    /// Label and value lines that were reported.
    pub consumed: BTreeSet<usize>,
}

/// Finds the first label of each special field and the amount after it.
#[derive(Debug, Clone)]
pub struct SpecialFieldDetector {
    value_window: usize,
}

impl SpecialFieldDetector {
    pub fn new() -> Self {
        Self::from_config(&ParserConfig::default())
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self {
            value_window: config.value_window,
        }
    }

    pub fn with_value_window(mut self, lines: usize) -> Self {
        self.value_window = lines;
        self
    }

    pub fn detect(&self, classes: &[LineClass], lookup: &GeometryLookup<'_>) -> Detection {
        let mut out = Detection::default();

        for field in FieldName::ALL {
            let mut labels = classes
                .iter()
                .enumerate()
                .filter(|(_, c)| matches!(c, LineClass::FieldLabel { field: f, .. } if *f == field))
                .map(|(i, _)| i);

            let Some(label_line) = labels.next() else {
                continue;
            };
            for line in labels {
                out.diagnostics.push(Diagnostic::DuplicateLabel { field, line });
            }

            let label = record(lookup, field, FieldRole::Label, label_line, None);
            let value = match &classes[label_line] {
                LineClass::FieldLabel {
                    amount: Some(amount),
                    ..
                } if *amount >= Decimal::ZERO => inline_value(lookup, field, label_line, *amount),
                _ => classes
                    .iter()
                    .enumerate()
                    .skip(label_line + 1)
                    .take(self.value_window)
                    .take_while(|(_, c)| !c.is_boundary())
                    .find_map(|(i, c)| c.plain_amount().map(|amount| (i, amount)))
                    .and_then(|(i, amount)| {
                        record(lookup, field, FieldRole::Value, i, Some(amount))
                    }),
            };

            if value.is_none() {
                debug!("No value within {} lines of {} label", self.value_window, field);
                out.diagnostics.push(Diagnostic::PartialField { field, label_line });
            }

            out.consumed.extend(label.iter().chain(value.iter()).map(|r| r.line_index));
            out.fields.insert(field, FieldRecords { label, value });
        }

        out
    }
}

impl Default for SpecialFieldDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn record(
    lookup: &GeometryLookup<'_>,
    field: FieldName,
    role: FieldRole,
    line: usize,
    amount: Option<Decimal>,
) -> Option<SpecialFieldRecord> {
    let geometry = lookup.locate(TextUnit::Line(line))?;
    Some(from_geometry(geometry, field, role, line, amount))
}

/// Value printed on the label line. Uses the amount's own word box when the
/// OCR output has words, the whole line otherwise.
fn inline_value(
    lookup: &GeometryLookup<'_>,
    field: FieldName,
    line: usize,
    amount: Decimal,
) -> Option<SpecialFieldRecord> {
    let word = lookup
        .words_of(line)
        .into_iter()
        .rev()
        .find(|w| Decimal::from_str(w.text.trim()).ok() == Some(amount));

    match word {
        Some(word) => Some(from_geometry(
            Geometry::from(word),
            field,
            FieldRole::Value,
            line,
            Some(amount),
        )),
        None => record(lookup, field, FieldRole::Value, line, Some(amount)),
    }
}

fn from_geometry(
    geometry: Geometry,
    field: FieldName,
    role: FieldRole,
    line: usize,
    amount: Option<Decimal>,
) -> SpecialFieldRecord {
    SpecialFieldRecord {
        field,
        role,
        text: geometry.text,
        line_index: line,
        bounding_box: geometry.bounding_box,
        polygon: geometry.polygon,
        confidence: geometry.confidence,
        amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{BoundingBox, OcrDocument, OcrLine, OcrWord, Point};
    use crate::receipt::LineClassifier;
    use pretty_assertions::assert_eq;

    fn document(lines: &[&str]) -> OcrDocument {
        OcrDocument::new(
            lines
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let top = 0.5 + i as f32 * 0.03;
                    OcrLine::new(i, *t)
                        .with_geometry(
                            BoundingBox::new(0.2, top, 0.3, 0.02),
                            vec![Point::new(0.2, top), Point::new(0.5, top)],
                        )
                        .with_confidence(90.0 + i as f32)
                })
                .collect(),
        )
    }

    fn detect_with(detector: &SpecialFieldDetector, lines: &[&str]) -> Detection {
        let doc = document(lines);
        let classes = LineClassifier::new().classify_all(&doc.lines);
        detector.detect(&classes, &GeometryLookup::new(&doc))
    }

    fn detect(lines: &[&str]) -> Detection {
        detect_with(&SpecialFieldDetector::new(), lines)
    }

    #[test]
    fn test_label_and_value() {
        let out = detect(&["123 BANANAS", "3.99", "SUBTOTAL", "45.23"]);
        let subtotal = &out.fields[&FieldName::Subtotal];

        let label = subtotal.label.as_ref().unwrap();
        assert_eq!(label.text, "SUBTOTAL");
        assert_eq!(label.role, FieldRole::Label);
        assert_eq!(label.amount, None);

        let value = subtotal.value.as_ref().unwrap();
        assert_eq!(value.text, "45.23");
        assert_eq!(value.line_index, 3);
        assert_eq!(value.amount, Some(Decimal::new(4523, 2)));
        assert!((value.bounding_box.top - 0.59).abs() < 1e-6);
        assert_eq!(value.polygon.len(), 2);
        assert_eq!(value.confidence, 93.0);

        assert!(out.diagnostics.is_empty());
        assert_eq!(out.consumed.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_label_without_value_is_partial() {
        let out = detect(&["SUBTOTAL", "THANK YOU", "COME AGAIN", "MEMBER 1234", "45.23"]);
        let subtotal = &out.fields[&FieldName::Subtotal];

        assert!(subtotal.label.is_some());
        assert!(subtotal.value.is_none());
        assert_eq!(
            out.diagnostics,
            vec![Diagnostic::PartialField {
                field: FieldName::Subtotal,
                label_line: 0,
            }]
        );
    }

    #[test]
    fn test_window_is_configurable() {
        let detector = SpecialFieldDetector::new().with_value_window(4);
        let out = detect_with(&detector, &["SUBTOTAL", "THANK YOU", "COME AGAIN", "MEMBER 1234", "45.23"]);
        assert_eq!(out.fields[&FieldName::Subtotal].amount(), Some(Decimal::new(4523, 2)));
    }

    #[test]
    fn test_first_total_wins() {
        let out = detect(&[
            "**** TOTAL",
            "48.35",
            "TOTAL NUMBER OF ITEMS SOLD = 2",
            "2.00",
        ]);
        let total = &out.fields[&FieldName::Total];

        assert_eq!(total.label.as_ref().unwrap().line_index, 0);
        assert_eq!(total.amount(), Some(Decimal::new(4835, 2)));
        assert_eq!(
            out.diagnostics,
            vec![Diagnostic::DuplicateLabel {
                field: FieldName::Total,
                line: 2,
            }]
        );
    }

    #[test]
    fn test_value_on_label_line() {
        let out = detect(&["SUBTOTAL 45.23", "THANK YOU"]);
        let subtotal = &out.fields[&FieldName::Subtotal];

        let label = subtotal.label.as_ref().unwrap();
        let value = subtotal.value.as_ref().unwrap();
        assert_eq!(label.line_index, 0);
        assert_eq!(value.line_index, 0);
        assert_eq!(value.role, FieldRole::Value);
        assert_eq!(value.amount, Some(Decimal::new(4523, 2)));
        assert_eq!(value.bounding_box, label.bounding_box);
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.consumed.iter().copied().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_value_on_label_line_uses_word_box() {
        let words = vec![
            OcrWord {
                line_index: 0,
                position: 0,
                text: "TOTAL".to_string(),
                bounding_box: BoundingBox::new(0.2, 0.5, 0.1, 0.02),
                polygon: vec![],
                confidence: 99.0,
            },
            OcrWord {
                line_index: 0,
                position: 1,
                text: "9.40".to_string(),
                bounding_box: BoundingBox::new(0.8, 0.5, 0.1, 0.02),
                polygon: vec![],
                confidence: 97.0,
            },
        ];
        let doc = document(&["TOTAL 9.40"]).with_words(words);
        let classes = LineClassifier::new().classify_all(&doc.lines);
        let out = SpecialFieldDetector::new().detect(&classes, &GeometryLookup::new(&doc));

        let value = out.fields[&FieldName::Total].value.clone().unwrap();
        assert_eq!(value.text, "9.40");
        assert_eq!(value.line_index, 0);
        assert!((value.bounding_box.left - 0.8).abs() < 1e-6);
        assert_eq!(value.confidence, 97.0);
    }

    #[test]
    fn test_value_search_stops_at_next_label() {
        let out = detect(&["SUBTOTAL", "TAX", "0.42"]);

        assert!(out.fields[&FieldName::Subtotal].value.is_none());
        assert_eq!(out.fields[&FieldName::Tax].value.as_ref().unwrap().line_index, 2);
        assert_eq!(
            out.diagnostics,
            vec![Diagnostic::PartialField {
                field: FieldName::Subtotal,
                label_line: 0,
            }]
        );
    }

    #[test]
    fn test_value_search_stops_at_item_line() {
        let out = detect(&["TOTAL", "123 BANANAS", "3.99"]);
        assert!(out.fields[&FieldName::Total].is_partial());
    }

    #[test]
    fn test_negative_amount_is_not_a_value() {
        let out = detect(&["TAX", "-0.50", "3.12"]);
        assert_eq!(out.fields[&FieldName::Tax].value.as_ref().unwrap().line_index, 2);
    }

    #[test]
    fn test_missing_fields_absent() {
        let out = detect(&["123 BANANAS", "3.99"]);
        assert!(out.fields.is_empty());
        assert!(out.consumed.is_empty());
    }
}
