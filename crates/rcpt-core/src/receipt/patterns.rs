//! Line patterns for warehouse-style receipts.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Item line: optional tax-flag letter, item code, name ("E 123456 KS WATER")
    pub static ref ITEM_LINE: Regex = Regex::new(
        r"^(?:([A-Z])\s+)?(\d+)\s+([^/\s].*)$"
    ).unwrap();

    // Price line: "3.99", "3.99 E", "-1.00", "1.00-"
    pub static ref PRICE_LINE: Regex = Regex::new(
        r"^(-)?(\d+\.\d{2})(-)?(?:\s+([A-Za-z]{1,3}))?$"
    ).unwrap();

    // Amount at the end of an item or label line: "BANANAS 3.99 E", "SUBTOTAL 45.23"
    pub static ref TRAILING_AMOUNT: Regex = Regex::new(
        r"\s+(-)?(\d+\.\d{2})(-)?(?:\s+[A-Za-z]{1,3})?$"
    ).unwrap();

    // Discount line: coupon code linked to an item code ("0000364297 / 123456")
    pub static ref DISCOUNT_LINE: Regex = Regex::new(
        r"^(?:([A-Z])\s+)?(\d+)\s+/\s*(\d+)$"
    ).unwrap();

    // Field labels, whole words only
    pub static ref SUBTOTAL_LABEL: Regex = Regex::new(
        r"(?i)\bSUB[\s-]?TOTAL\b"
    ).unwrap();

    pub static ref TAX_LABEL: Regex = Regex::new(
        r"(?i)\bTAX\b"
    ).unwrap();

    pub static ref TOTAL_LABEL: Regex = Regex::new(
        r"(?i)\bTOTAL\b"
    ).unwrap();
}
