//! Context-free classification of single OCR lines.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::patterns::{
    DISCOUNT_LINE, ITEM_LINE, PRICE_LINE, SUBTOTAL_LABEL, TAX_LABEL, TOTAL_LABEL,
    TRAILING_AMOUNT,
};
use crate::models::config::ParserConfig;
use crate::models::receipt::FieldName;
use crate::ocr::OcrLine;

/// What a single line looks like, with its captured groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineClass {
    /// Item code and name, with the price when it is printed on the same line.
    Item {
        code: String,
        name: String,
        tax_flag: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price: Option<Decimal>,
    },
    /// Signed amount with two fractional digits.
    Price {
        amount: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
    /// Coupon line linking a discount to an item code.
    Discount {
        code: String,
        linked_code: String,
        tax_flag: bool,
    },
    /// Subtotal, total or tax label, with a trailing amount if present.
    FieldLabel {
        field: FieldName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<Decimal>,
    },
    Unclassified,
}

impl LineClass {
    pub fn is_item(&self) -> bool {
        matches!(self, LineClass::Item { .. })
    }

    /// Amount of a non-negative price line.
    pub fn plain_amount(&self) -> Option<Decimal> {
        match self {
            LineClass::Price { amount, .. } if *amount >= Decimal::ZERO => Some(*amount),
            _ => None,
        }
    }

    /// Lines that end a field value search.
    pub fn is_boundary(&self) -> bool {
        matches!(self, LineClass::Item { .. } | LineClass::FieldLabel { .. })
    }
}

/// Classifies lines by fixed lexical patterns.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    tax_flag_letters: String,
}

impl LineClassifier {
    pub fn new() -> Self {
        Self::from_config(&ParserConfig::default())
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self {
            tax_flag_letters: config.tax_flag_letters.clone(),
        }
    }

    /// Restrict the accepted tax-flag prefixes.
    pub fn with_tax_flag_letters(mut self, letters: impl Into<String>) -> Self {
        self.tax_flag_letters = letters.into();
        self
    }

    /// Classify one line of text. Rules are tried in priority order.
    pub fn classify(&self, text: &str) -> LineClass {
        let text = text.trim();

        if let Some(class) = self.classify_item(text) {
            return class;
        }
        if let Some(class) = classify_price(text) {
            return class;
        }
        if let Some(class) = self.classify_discount(text) {
            return class;
        }
        if let Some(field) = classify_label(text) {
            let amount = split_trailing_amount(text).map(|(_, amount)| amount);
            return LineClass::FieldLabel { field, amount };
        }

        LineClass::Unclassified
    }

    /// Classify every line, indexed by line index.
    pub fn classify_all(&self, lines: &[OcrLine]) -> Vec<LineClass> {
        let classes: Vec<LineClass> = lines.iter().map(|l| self.classify(&l.text)).collect();

        debug!(
            "Classified {} lines: {} item, {} price, {} discount, {} label",
            classes.len(),
            classes.iter().filter(|c| c.is_item()).count(),
            classes
                .iter()
                .filter(|c| matches!(c, LineClass::Price { .. }))
                .count(),
            classes
                .iter()
                .filter(|c| matches!(c, LineClass::Discount { .. }))
                .count(),
            classes
                .iter()
                .filter(|c| matches!(c, LineClass::FieldLabel { .. }))
                .count(),
        );

        classes
    }

    fn tax_flag(&self, flag: Option<regex::Match<'_>>) -> Option<bool> {
        match flag {
            None => Some(false),
            Some(m) if self.tax_flag_letters.contains(m.as_str()) => Some(true),
            Some(_) => None,
        }
    }

    fn classify_item(&self, text: &str) -> Option<LineClass> {
        let caps = ITEM_LINE.captures(text)?;
        let tax_flag = self.tax_flag(caps.get(1))?;

        let rest = caps[3].trim();
        let (name, price) = match split_trailing_amount(rest) {
            Some((name, amount)) => (name, Some(amount)),
            None => (rest, None),
        };

        Some(LineClass::Item {
            code: caps[2].to_string(),
            name: name.to_string(),
            tax_flag,
            price,
        })
    }

    fn classify_discount(&self, text: &str) -> Option<LineClass> {
        let caps = DISCOUNT_LINE.captures(text)?;
        let tax_flag = self.tax_flag(caps.get(1))?;

        Some(LineClass::Discount {
            code: caps[2].to_string(),
            linked_code: caps[3].to_string(),
            tax_flag,
        })
    }
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_price(text: &str) -> Option<LineClass> {
    let caps = PRICE_LINE.captures(text)?;
    let amount = signed_amount(caps.get(1).is_some(), &caps[2], caps.get(3).is_some())?;

    Some(LineClass::Price {
        amount,
        suffix: caps.get(4).map(|m| m.as_str().to_string()),
    })
}

/// Split "BANANAS 3.99 E" into ("BANANAS", 3.99).
fn split_trailing_amount(text: &str) -> Option<(&str, Decimal)> {
    let caps = TRAILING_AMOUNT.captures(text)?;
    let amount = signed_amount(caps.get(1).is_some(), &caps[2], caps.get(3).is_some())?;
    let start = caps.get(0)?.start();

    Some((&text[..start], amount))
}

/// A minus on both sides is not an amount.
fn signed_amount(leading: bool, digits: &str, trailing: bool) -> Option<Decimal> {
    if leading && trailing {
        return None;
    }
    let amount = Decimal::from_str(digits).ok()?;
    Some(if leading || trailing { -amount } else { amount })
}

/// Most specific keyword wins: "TOTAL TAX" is a tax label.
fn classify_label(text: &str) -> Option<FieldName> {
    if SUBTOTAL_LABEL.is_match(text) {
        Some(FieldName::Subtotal)
    } else if TAX_LABEL.is_match(text) {
        Some(FieldName::Tax)
    } else if TOTAL_LABEL.is_match(text) {
        Some(FieldName::Total)
    } else {
        None
    }
}
