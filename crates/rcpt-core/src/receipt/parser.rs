//! Receipt parser driving classification, item assembly and field detection.

use std::time::Instant;

use tracing::{debug, info};

use super::assembler::ItemAssembler;
use super::classifier::LineClassifier;
use super::fields::SpecialFieldDetector;
use super::{ReceiptExtractor, Result};
use crate::models::config::{ParserConfig, PriceConflict};
use crate::models::receipt::ReceiptParseResult;
use crate::ocr::{GeometryLookup, OcrDocument, textract};

/// Parses OCR lines into item records and special-field records.
///
/// The parser itself holds only configuration; every call builds its own
/// working state, so one parser can serve concurrent receipts.
#[derive(Debug, Clone)]
pub struct ReceiptParser {
    config: ParserConfig,
}

impl ReceiptParser {
    /// Create a new parser with default settings.
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Set the number of lines searched for a field value.
    pub fn with_value_window(mut self, lines: usize) -> Self {
        self.config.value_window = lines;
        self
    }

    /// Set how repeated item prices are handled.
    pub fn with_price_conflict(mut self, price_conflict: PriceConflict) -> Self {
        self.config.price_conflict = price_conflict;
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse one receipt.
    ///
    /// Fails only when the line sequence itself is malformed; unmatched text
    /// is reported through the result's diagnostics.
    pub fn parse(&self, document: &OcrDocument) -> Result<ReceiptParseResult> {
        let start = Instant::now();
        document.validate()?;

        let classes = LineClassifier::from_config(&self.config).classify_all(&document.lines);
        let lookup = GeometryLookup::new(document);

        let assembly = ItemAssembler::from_config(&self.config).assemble(&classes, &lookup);
        let detection = SpecialFieldDetector::from_config(&self.config).detect(&classes, &lookup);

        let unmatched_lines: Vec<usize> = (0..classes.len())
            .filter(|i| !assembly.consumed.contains(i) && !detection.consumed.contains(i))
            .collect();
        debug!("Unmatched lines: {:?}", unmatched_lines);

        let mut diagnostics = assembly.diagnostics;
        diagnostics.extend(detection.diagnostics);

        let result = ReceiptParseResult {
            items: assembly.items,
            fields: detection.fields,
            unmatched_lines,
            diagnostics,
            line_classes: classes,
        };

        info!(
            receipt = document.receipt_id.as_deref().unwrap_or("-"),
            "Parsed {} lines into {} items and {} fields in {:?}",
            document.lines.len(),
            result.items.len(),
            result.fields.len(),
            start.elapsed()
        );

        Ok(result)
    }

    /// Load a Textract response and parse it.
    pub fn parse_textract(&self, json: &str) -> crate::Result<ReceiptParseResult> {
        let document = textract::from_json(json)?;
        Ok(self.parse(&document)?)
    }
}

impl Default for ReceiptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiptExtractor for ReceiptParser {
    fn extract(&self, document: &OcrDocument) -> Result<ReceiptParseResult> {
        self.parse(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, RcptError};
    use crate::models::receipt::{Diagnostic, FieldName};
    use crate::ocr::{BoundingBox, OcrLine};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    const RECEIPT: &str = r#"
        COSTCO WHOLESALE
        E 123 BANANAS
        3.99 E
        456 WIDGET
        5.99
        0000364297 / 456
        1.00-
        789 PEARS
        SUBTOTAL
        8.98
        TAX
        0.42
        **** TOTAL
        9.40
        TOTAL NUMBER OF ITEMS SOLD = 2
    "#;

    #[test]
    fn test_parse_full_receipt() {
        let result = ReceiptParser::new().extract_from_text(RECEIPT).unwrap();

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].name, "BANANAS");
        assert!(result.items[0].tax_flag);
        assert_eq!(result.items[1].name, "WIDGET");
        assert_eq!(result.items[1].discount, Some(Decimal::new(-100, 2)));

        assert_eq!(result.field(FieldName::Subtotal).unwrap().amount(), Some(Decimal::new(898, 2)));
        assert_eq!(result.field(FieldName::Tax).unwrap().amount(), Some(Decimal::new(42, 2)));
        assert_eq!(result.field(FieldName::Total).unwrap().amount(), Some(Decimal::new(940, 2)));
        assert!(result.reconcile().matches());

        // Store header, unpriced PEARS and the item-count footer.
        assert_eq!(result.unmatched_lines, vec![0, 7, 14]);
        assert_eq!(result.unresolved_count(), 1);
        assert!(result
            .diagnostics
            .contains(&Diagnostic::DuplicateLabel { field: FieldName::Total, line: 14 }));
        assert_eq!(result.line_classes.len(), 15);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = ReceiptParser::new();
        let a = serde_json::to_string(&parser.extract_from_text(RECEIPT).unwrap()).unwrap();
        let b = serde_json::to_string(&parser.extract_from_text(RECEIPT).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let err = ReceiptParser::new().parse(&OcrDocument::default()).unwrap_err();
        assert_eq!(err, ParseError::EmptyInput);

        let err = ReceiptParser::new().extract_from_text("  \n \n").unwrap_err();
        assert_eq!(err, ParseError::EmptyInput);
    }

    #[test]
    fn test_unresolved_item_only() {
        let result = ReceiptParser::new().extract_from_text("123 BANANAS\n456 WIDGET").unwrap();

        assert!(result.items.is_empty());
        assert_eq!(result.unresolved_count(), 2);
        assert_eq!(result.unmatched_lines, vec![0, 1]);
    }

    #[test]
    fn test_single_line_layout() {
        let text = "E 123 BANANAS 3.99 E\n456 WIDGET\n5.99\nSUBTOTAL 9.98\nTAX\nTOTAL 9.98";
        let result = ReceiptParser::new().extract_from_text(text).unwrap();

        let items: Vec<(&str, Decimal)> = result
            .items
            .iter()
            .map(|i| (i.name.as_str(), i.price))
            .collect();
        assert_eq!(
            items,
            vec![("BANANAS", Decimal::new(399, 2)), ("WIDGET", Decimal::new(599, 2))]
        );

        assert_eq!(result.field(FieldName::Subtotal).unwrap().amount(), Some(Decimal::new(998, 2)));
        assert!(result.field(FieldName::Tax).unwrap().is_partial());
        assert_eq!(result.field(FieldName::Total).unwrap().amount(), Some(Decimal::new(998, 2)));
        assert!(result.reconcile().matches());
        assert!(result.unmatched_lines.is_empty());
        assert_eq!(
            result.diagnostics,
            vec![Diagnostic::PartialField {
                field: FieldName::Tax,
                label_line: 4,
            }]
        );
    }

    #[test]
    fn test_reject_conflicts_via_config() {
        let parser = ReceiptParser::new().with_price_conflict(PriceConflict::Reject);
        let result = parser.extract_from_text("123 BANANAS\n3.99\n4.29").unwrap();
        assert!(result.items.is_empty());
        assert!(matches!(
            result.diagnostics.as_slice(),
            [Diagnostic::ConflictingPrices { line: 0, .. }]
        ));
    }

    #[test]
    fn test_geometry_flows_into_records() {
        let lines = vec![
            OcrLine::new(0, "123 BANANAS").with_geometry(BoundingBox::new(0.05, 0.20, 0.40, 0.02), vec![]),
            OcrLine::new(1, "3.99").with_geometry(BoundingBox::new(0.80, 0.20, 0.10, 0.02), vec![]),
            OcrLine::new(2, "TOTAL").with_geometry(BoundingBox::new(0.05, 0.40, 0.15, 0.02), vec![]),
            OcrLine::new(3, "3.99").with_geometry(BoundingBox::new(0.80, 0.40, 0.10, 0.02), vec![]),
        ];
        let result = ReceiptParser::new().parse(&OcrDocument::new(lines)).unwrap();

        let item_box = result.items[0].bounding_box.unwrap();
        assert!((item_box.left - 0.05).abs() < 1e-6);
        assert!((item_box.right() - 0.90).abs() < 1e-6);

        let total = result.field(FieldName::Total).unwrap();
        assert!((total.label.as_ref().unwrap().bounding_box.left - 0.05).abs() < 1e-6);
        assert!((total.value.as_ref().unwrap().bounding_box.left - 0.80).abs() < 1e-6);
        assert!(result.unmatched_lines.is_empty());
    }

    #[test]
    fn test_parse_textract_errors() {
        let parser = ReceiptParser::new();

        let err = parser.parse_textract(r#"{"Blocks": []}"#).unwrap_err();
        assert!(matches!(err, RcptError::Ocr(_)));

        let json = r#"{"Blocks": [
            {"BlockType": "LINE", "Text": "SUBTOTAL", "Confidence": 140.0,
             "Geometry": {"BoundingBox": {"Width": 0.1, "Height": 0.02, "Left": 0.1, "Top": 0.5}}}
        ]}"#;
        let err = parser.parse_textract(json).unwrap_err();
        assert!(matches!(
            err,
            RcptError::Parse(ParseError::InvalidConfidence { index: 0, .. })
        ));
    }
}
