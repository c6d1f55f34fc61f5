//! Parsed receipt records.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ocr::{BoundingBox, Point};
use crate::receipt::LineClass;

/// A purchased item, in the order it appeared on the receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Position among emitted items (0-based receipt order).
    pub sequence: usize,

    /// Numeric item code printed before the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_code: Option<String>,

    /// Item name as printed.
    pub name: String,

    /// Unit price, two fractional digits.
    pub price: Decimal,

    /// Accumulated discount, always negative when present.
    pub discount: Option<Decimal>,

    /// Item line carried the tax-flag prefix.
    pub tax_flag: bool,

    /// Lines this record was built from, ascending.
    pub source_lines: Vec<usize>,

    /// Union of the item line and price line boxes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl ItemRecord {
    /// Price after discount.
    pub fn net_price(&self) -> Decimal {
        self.price + self.discount.unwrap_or_default()
    }
}

/// Receipt fields reported with their location for highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Subtotal,
    Total,
    Tax,
}

impl FieldName {
    pub const ALL: [FieldName; 3] = [FieldName::Subtotal, FieldName::Total, FieldName::Tax];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Subtotal => "subtotal",
            FieldName::Total => "total",
            FieldName::Tax => "tax",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a special-field record is the label or its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Label,
    Value,
}

impl FieldRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::Label => "label",
            FieldRole::Value => "value",
        }
    }
}

/// One highlightable text unit of a special field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialFieldRecord {
    pub field: FieldName,
    pub role: FieldRole,
    pub text: String,
    pub line_index: usize,
    pub bounding_box: BoundingBox,
    pub polygon: Vec<Point>,
    pub confidence: f32,

    /// Parsed amount, value records only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

/// Label and value records found for one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRecords {
    pub label: Option<SpecialFieldRecord>,
    pub value: Option<SpecialFieldRecord>,
}

impl FieldRecords {
    /// Only one of label and value was found.
    pub fn is_partial(&self) -> bool {
        self.label.is_some() != self.value.is_some()
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.value.as_ref().and_then(|v| v.amount)
    }

    /// Records in label, value order.
    pub fn records(&self) -> impl Iterator<Item = &SpecialFieldRecord> {
        self.label.iter().chain(self.value.iter())
    }
}

/// Non-fatal findings recorded during a parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An item line never received a price.
    UnresolvedItem {
        line: usize,
        item_code: Option<String>,
        name: String,
    },
    /// An item received more than one price and conflicts are rejected.
    ConflictingPrices { line: usize, price_lines: Vec<usize> },
    /// A later price line replaced an item's price.
    PriceOverwritten {
        line: usize,
        previous: Decimal,
        price: Decimal,
        price_line: usize,
    },
    /// A negative amount with no item to apply it to.
    OrphanDiscount { line: usize, amount: Decimal },
    /// A field label without a value in the search window.
    PartialField { field: FieldName, label_line: usize },
    /// A later label for a field that was already found.
    DuplicateLabel { field: FieldName, line: usize },
}

/// Computed item sum against the printed subtotal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub computed: Decimal,
    pub reported: Option<Decimal>,
    pub difference: Option<Decimal>,
}

impl Reconciliation {
    pub fn matches(&self) -> bool {
        self.difference == Some(Decimal::ZERO)
    }
}

/// Everything one parse pass produces for a receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptParseResult {
    /// Items in receipt order.
    pub items: Vec<ItemRecord>,

    /// Special fields that had at least a label.
    pub fields: BTreeMap<FieldName, FieldRecords>,

    /// Lines used by neither items nor special fields.
    pub unmatched_lines: Vec<usize>,

    /// Non-fatal findings.
    pub diagnostics: Vec<Diagnostic>,

    /// Classification of every input line.
    pub line_classes: Vec<LineClass>,
}

impl ReceiptParseResult {
    pub fn field(&self, name: FieldName) -> Option<&FieldRecords> {
        self.fields.get(&name)
    }

    /// All special-field records, ordered by field then role.
    pub fn field_records(&self) -> Vec<&SpecialFieldRecord> {
        self.fields.values().flat_map(|f| f.records()).collect()
    }

    /// Sum of item prices after discounts.
    pub fn computed_subtotal(&self) -> Decimal {
        self.items.iter().map(ItemRecord::net_price).sum()
    }

    pub fn reconcile(&self) -> Reconciliation {
        let computed = self.computed_subtotal();
        let reported = self.field(FieldName::Subtotal).and_then(FieldRecords::amount);

        Reconciliation {
            computed,
            reported,
            difference: reported.map(|r| r - computed),
        }
    }

    pub fn unresolved_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| {
                matches!(
                    d,
                    Diagnostic::UnresolvedItem { .. } | Diagnostic::ConflictingPrices { .. }
                )
            })
            .count()
    }
}
