//! Loader for AWS Textract `DetectDocumentText` responses.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use super::{BoundingBox, OcrDocument, OcrLine, OcrWord, Point};
use crate::error::OcrError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Response {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Block {
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawGeometry {
    bounding_box: RawBox,
    #[serde(default)]
    polygon: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBox {
    width: f32,
    height: f32,
    left: f32,
    top: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPoint {
    x: f32,
    y: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Relationship {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    ids: Vec<String>,
}

impl Block {
    fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.block_type.clone())
    }

    fn text(&self) -> Result<String, OcrError> {
        self.text.clone().ok_or_else(|| OcrError::MissingField {
            block: self.label(),
            field: "Text",
        })
    }

    fn geometry(&self) -> Result<(BoundingBox, Vec<Point>), OcrError> {
        let geometry = self.geometry.as_ref().ok_or_else(|| OcrError::MissingField {
            block: self.label(),
            field: "Geometry",
        })?;
        let b = &geometry.bounding_box;
        let polygon = geometry
            .polygon
            .iter()
            .map(|p| Point::new(p.x, p.y))
            .collect();

        Ok((BoundingBox::new(b.left, b.top, b.width, b.height), polygon))
    }

    fn confidence(&self) -> f32 {
        self.confidence.unwrap_or(0.0)
    }

    fn children(&self) -> impl Iterator<Item = &String> {
        self.relationships
            .iter()
            .filter(|r| r.kind == "CHILD")
            .flat_map(|r| r.ids.iter())
    }
}

/// Parse a Textract response from a JSON string.
pub fn from_json(json: &str) -> Result<OcrDocument, OcrError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| OcrError::Json(e.to_string()))?;
    from_value(value)
}

/// Convert a Textract response value into an [`OcrDocument`].
///
/// `LINE` blocks keep the order Textract reports them in; `WORD` blocks are
/// attached to the line that lists them as children.
pub fn from_value(value: serde_json::Value) -> Result<OcrDocument, OcrError> {
    let response: Response =
        serde_json::from_value(value).map_err(|e| OcrError::Json(e.to_string()))?;

    let words_by_id: HashMap<&str, &Block> = response
        .blocks
        .iter()
        .filter(|b| b.block_type == "WORD")
        .filter_map(|b| b.id.as_deref().map(|id| (id, b)))
        .collect();

    let mut lines = Vec::new();
    let mut words = Vec::new();

    for block in response.blocks.iter().filter(|b| b.block_type == "LINE") {
        let index = lines.len();
        let (bounding_box, polygon) = block.geometry()?;

        lines.push(OcrLine {
            index,
            text: block.text()?.trim().to_string(),
            bounding_box,
            polygon,
            confidence: block.confidence(),
        });

        for (position, child) in block
            .children()
            .filter_map(|id| words_by_id.get(id.as_str()))
            .enumerate()
        {
            let (bounding_box, polygon) = child.geometry()?;
            words.push(OcrWord {
                line_index: index,
                position,
                text: child.text()?,
                bounding_box,
                polygon,
                confidence: child.confidence(),
            });
        }
    }

    if lines.is_empty() {
        return Err(OcrError::NoLines);
    }

    debug!(
        "Loaded {} lines and {} words from Textract response",
        lines.len(),
        words.len()
    );

    Ok(OcrDocument::new(lines).with_words(words))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "DocumentMetadata": {"Pages": 1},
        "Blocks": [
            {"BlockType": "PAGE", "Id": "p1",
             "Geometry": {"BoundingBox": {"Width": 1.0, "Height": 1.0, "Left": 0.0, "Top": 0.0}, "Polygon": []},
             "Relationships": [{"Type": "CHILD", "Ids": ["l1", "l2"]}]},
            {"BlockType": "LINE", "Id": "l1", "Text": "E 123 BANANAS", "Confidence": 99.2,
             "Geometry": {"BoundingBox": {"Width": 0.4, "Height": 0.02, "Left": 0.1, "Top": 0.3},
                          "Polygon": [{"X": 0.1, "Y": 0.3}, {"X": 0.5, "Y": 0.3}, {"X": 0.5, "Y": 0.32}, {"X": 0.1, "Y": 0.32}]},
             "Relationships": [{"Type": "CHILD", "Ids": ["w1", "w2", "w3"]}]},
            {"BlockType": "LINE", "Id": "l2", "Text": "3.99", "Confidence": 98.0,
             "Geometry": {"BoundingBox": {"Width": 0.1, "Height": 0.02, "Left": 0.8, "Top": 0.3}, "Polygon": []}},
            {"BlockType": "WORD", "Id": "w1", "Text": "E", "Confidence": 97.0,
             "Geometry": {"BoundingBox": {"Width": 0.02, "Height": 0.02, "Left": 0.1, "Top": 0.3}, "Polygon": []}},
            {"BlockType": "WORD", "Id": "w2", "Text": "123", "Confidence": 99.0,
             "Geometry": {"BoundingBox": {"Width": 0.06, "Height": 0.02, "Left": 0.14, "Top": 0.3}, "Polygon": []}},
            {"BlockType": "WORD", "Id": "w3", "Text": "BANANAS", "Confidence": 99.5,
             "Geometry": {"BoundingBox": {"Width": 0.2, "Height": 0.02, "Left": 0.22, "Top": 0.3}, "Polygon": []}}
        ]
    }"#;

    #[test]
    fn test_lines_and_words() {
        let doc = from_json(RESPONSE).unwrap();

        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].text, "E 123 BANANAS");
        assert_eq!(doc.lines[0].polygon.len(), 4);
        assert_eq!(doc.lines[1].index, 1);
        assert!((doc.lines[1].bounding_box.left - 0.8).abs() < 1e-6);

        assert_eq!(doc.words.len(), 3);
        assert_eq!(doc.words[2].text, "BANANAS");
        assert_eq!(doc.words[2].line_index, 0);
        assert_eq!(doc.words[2].position, 2);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_no_lines() {
        let err = from_json(r#"{"Blocks": []}"#).unwrap_err();
        assert!(matches!(err, OcrError::NoLines));
    }

    #[test]
    fn test_line_without_geometry() {
        let json = r#"{"Blocks": [{"BlockType": "LINE", "Id": "l1", "Text": "TOTAL"}]}"#;
        let err = from_json(json).unwrap_err();
        assert!(matches!(err, OcrError::MissingField { field: "Geometry", .. }));
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(from_json("nope"), Err(OcrError::Json(_))));
    }
}
