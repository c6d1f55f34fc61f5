//! Item assembly over classified lines.
//!
//! A single pending-item slot is driven through the line sequence. Item and
//! field-label lines close the slot; price lines fill it; discount lines arm
//! the next negative amount as a discount.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::classifier::LineClass;
use crate::models::config::{ParserConfig, PriceConflict};
use crate::models::receipt::{Diagnostic, ItemRecord};
use crate::ocr::GeometryLookup;

/// Output of one assembly pass.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub items: Vec<ItemRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Lines that ended up in an emitted item.
    pub consumed: BTreeSet<usize>,
}

/// Builds item records from a classified line sequence.
#[derive(Debug, Clone)]
pub struct ItemAssembler {
    price_conflict: PriceConflict,
}

impl ItemAssembler {
    pub fn new() -> Self {
        Self::from_config(&ParserConfig::default())
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self {
            price_conflict: config.price_conflict,
        }
    }

    pub fn with_price_conflict(mut self, price_conflict: PriceConflict) -> Self {
        self.price_conflict = price_conflict;
        self
    }

    /// Run the state machine over `classes`; all state lives in this call.
    pub fn assemble(&self, classes: &[LineClass], lookup: &GeometryLookup<'_>) -> Assembly {
        let mut run = Run {
            price_conflict: self.price_conflict,
            lookup,
            slot: Slot::Idle,
            armed: None,
            out: Assembly::default(),
        };

        for (index, class) in classes.iter().enumerate() {
            run.step(index, class);
        }
        run.close();

        debug!(
            "Assembled {} items ({} diagnostics)",
            run.out.items.len(),
            run.out.diagnostics.len()
        );

        run.out
    }
}

impl Default for ItemAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct PendingItem {
    line: usize,
    code: String,
    name: String,
    tax_flag: bool,
    price: Decimal,
    price_line: Option<usize>,
    discount: Option<Decimal>,
    discount_lines: Vec<usize>,
    conflicting_lines: Vec<usize>,
}

impl PendingItem {
    fn add_discount(&mut self, amount: Decimal, lines: &[usize]) {
        self.discount = Some(self.discount.unwrap_or_default() + amount);
        self.discount_lines.extend_from_slice(lines);
    }
}

/// The pending-item slot.
#[derive(Debug, Clone)]
enum Slot {
    Idle,
    AwaitingPrice(PendingItem),
    Priced(PendingItem),
}

/// A discount line waiting for its negative amount.
#[derive(Debug, Clone)]
struct ArmedDiscount {
    line: usize,
    linked_code: String,
}

struct Run<'l, 'a> {
    price_conflict: PriceConflict,
    lookup: &'l GeometryLookup<'a>,
    slot: Slot,
    armed: Option<ArmedDiscount>,
    out: Assembly,
}

impl Run<'_, '_> {
    fn step(&mut self, index: usize, class: &LineClass) {
        match class {
            LineClass::Item {
                code,
                name,
                tax_flag,
                price,
            } => {
                self.close();
                let mut item = PendingItem {
                    line: index,
                    code: code.clone(),
                    name: name.clone(),
                    tax_flag: *tax_flag,
                    price: Decimal::ZERO,
                    price_line: None,
                    discount: None,
                    discount_lines: Vec::new(),
                    conflicting_lines: Vec::new(),
                };
                self.slot = match price {
                    Some(amount) if *amount >= Decimal::ZERO => {
                        item.price = *amount;
                        item.price_line = Some(index);
                        Slot::Priced(item)
                    }
                    Some(amount) => {
                        item.add_discount(*amount, &[index]);
                        Slot::AwaitingPrice(item)
                    }
                    None => Slot::AwaitingPrice(item),
                };
            }
            LineClass::Price { amount, .. } if *amount < Decimal::ZERO => {
                self.apply_discount(index, *amount);
            }
            LineClass::Price { amount, .. } => {
                self.apply_price(index, *amount);
            }
            LineClass::Discount { linked_code, .. } => {
                self.armed = Some(ArmedDiscount {
                    line: index,
                    linked_code: linked_code.clone(),
                });
            }
            LineClass::FieldLabel { .. } => self.close(),
            LineClass::Unclassified => {}
        }
    }

    fn apply_price(&mut self, index: usize, amount: Decimal) {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Idle => {}
            Slot::AwaitingPrice(mut item) => {
                item.price = amount;
                item.price_line = Some(index);
                self.slot = Slot::Priced(item);
            }
            Slot::Priced(mut item) => {
                match self.price_conflict {
                    PriceConflict::LastWins => {
                        self.out.diagnostics.push(Diagnostic::PriceOverwritten {
                            line: item.line,
                            previous: item.price,
                            price: amount,
                            price_line: index,
                        });
                        item.price = amount;
                        item.price_line = Some(index);
                    }
                    PriceConflict::Reject => item.conflicting_lines.push(index),
                }
                self.slot = Slot::Priced(item);
            }
        }
    }

    fn apply_discount(&mut self, index: usize, amount: Decimal) {
        let Some(armed) = self.armed.take() else {
            // Unannounced negative amount: discount on whatever is open.
            match &mut self.slot {
                Slot::AwaitingPrice(item) | Slot::Priced(item) => {
                    item.add_discount(amount, &[index]);
                }
                Slot::Idle => self.orphan(index, amount),
            }
            return;
        };

        let lines = [armed.line, index];
        if let Slot::AwaitingPrice(item) | Slot::Priced(item) = &mut self.slot {
            if item.code == armed.linked_code {
                item.add_discount(amount, &lines);
                return;
            }
        }

        if let Some(emitted) = self
            .out
            .items
            .iter_mut()
            .rev()
            .find(|i| i.item_code.as_deref() == Some(armed.linked_code.as_str()))
        {
            debug!(
                "Discount on line {} applied to earlier item {}",
                index, emitted.sequence
            );
            emitted.discount = Some(emitted.discount.unwrap_or_default() + amount);
            emitted.source_lines.extend_from_slice(&lines);
            emitted.source_lines.sort_unstable();
            self.out.consumed.extend(lines);
            return;
        }

        match &mut self.slot {
            Slot::AwaitingPrice(item) | Slot::Priced(item) => item.add_discount(amount, &lines),
            Slot::Idle => self.orphan(index, amount),
        }
    }

    fn orphan(&mut self, index: usize, amount: Decimal) {
        warn!("Discount {} on line {} has no item", amount, index);
        self.out
            .diagnostics
            .push(Diagnostic::OrphanDiscount { line: index, amount });
    }

    /// Close the slot: emit a priced item, discard anything else.
    fn close(&mut self) {
        self.armed = None;

        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Idle => {}
            Slot::AwaitingPrice(item) => {
                warn!("Item '{}' on line {} has no price", item.name, item.line);
                self.out.diagnostics.push(Diagnostic::UnresolvedItem {
                    line: item.line,
                    item_code: Some(item.code),
                    name: item.name,
                });
            }
            Slot::Priced(item) if !item.conflicting_lines.is_empty() => {
                warn!("Item '{}' on line {} has conflicting prices", item.name, item.line);
                let mut price_lines: Vec<usize> = item.price_line.into_iter().collect();
                price_lines.extend(item.conflicting_lines);
                self.out.diagnostics.push(Diagnostic::ConflictingPrices {
                    line: item.line,
                    price_lines,
                });
            }
            Slot::Priced(item) => self.emit(item),
        }
    }

    fn emit(&mut self, item: PendingItem) {
        let mut geometry_lines: Vec<usize> = std::iter::once(item.line).chain(item.price_line).collect();
        geometry_lines.dedup();
        let mut source_lines = geometry_lines.clone();
        source_lines.extend(item.discount_lines);
        source_lines.sort_unstable();
        source_lines.dedup();

        self.out.consumed.extend(source_lines.iter().copied());
        self.out.items.push(ItemRecord {
            sequence: self.out.items.len(),
            item_code: Some(item.code),
            name: item.name,
            price: item.price,
            discount: item.discount,
            tax_flag: item.tax_flag,
            source_lines,
            bounding_box: self.lookup.union(&geometry_lines),
        });
    }
}
