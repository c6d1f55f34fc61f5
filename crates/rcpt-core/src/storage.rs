//! Interface to the storage collaborator.
//!
//! Parsed records are written as two batches per receipt into a key-value
//! table with composite keys:
//!
//! - items:  `RECEIPT#{receipt_id}` / `ITEM#{sequence}`
//! - fields: `RECEIPT#{receipt_id}` / `GEOMETRY#{FIELD}#{ROLE}`
//!
//! Writes are conditional on the key being absent, which makes a retried
//! batch for the same receipt fail instead of duplicating records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::models::receipt::{FieldName, FieldRole, ItemRecord, ReceiptParseResult, SpecialFieldRecord};

/// Composite partition/sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageKey {
    pub pk: String,
    pub sk: String,
}

impl StorageKey {
    pub fn receipt_partition(receipt_id: &str) -> String {
        format!("RECEIPT#{}", receipt_id)
    }

    pub fn item(receipt_id: &str, sequence: usize) -> Self {
        Self {
            pk: Self::receipt_partition(receipt_id),
            sk: format!("ITEM#{:04}", sequence),
        }
    }

    pub fn field(receipt_id: &str, field: FieldName, role: FieldRole) -> Self {
        Self {
            pk: Self::receipt_partition(receipt_id),
            sk: format!(
                "GEOMETRY#{}#{}",
                field.as_str().to_uppercase(),
                role.as_str().to_uppercase()
            ),
        }
    }
}

/// Entity type stored alongside each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    ReceiptItem,
    ReceiptGeometry,
}

/// A record as handed to the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub key: StorageKey,
    pub entity_type: EntityType,
    pub receipt_id: String,
    pub payload: serde_json::Value,
    pub written_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn for_item(receipt_id: &str, item: &ItemRecord) -> Result<Self, StorageError> {
        Ok(Self {
            key: StorageKey::item(receipt_id, item.sequence),
            entity_type: EntityType::ReceiptItem,
            receipt_id: receipt_id.to_string(),
            payload: to_payload(item)?,
            written_at: Utc::now(),
        })
    }

    pub fn for_field(receipt_id: &str, record: &SpecialFieldRecord) -> Result<Self, StorageError> {
        Ok(Self {
            key: StorageKey::field(receipt_id, record.field, record.role),
            entity_type: EntityType::ReceiptGeometry,
            receipt_id: receipt_id.to_string(),
            payload: to_payload(record)?,
            written_at: Utc::now(),
        })
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(value).map_err(|e| StorageError::Backend(e.to_string()))
}

/// Storage collaborator receiving parsed records.
pub trait ReceiptSink {
    /// Write all items of a receipt as one batch.
    fn write_items(&mut self, receipt_id: &str, items: &[ItemRecord]) -> Result<(), StorageError>;

    /// Write all special-field records of a receipt as one batch.
    fn write_fields(
        &mut self,
        receipt_id: &str,
        records: &[&SpecialFieldRecord],
    ) -> Result<(), StorageError>;
}

/// Hand a parse result to a sink as its two batches.
pub fn store_result<S: ReceiptSink + ?Sized>(
    sink: &mut S,
    receipt_id: &str,
    result: &ReceiptParseResult,
) -> Result<(), StorageError> {
    sink.write_items(receipt_id, &result.items)?;
    sink.write_fields(receipt_id, &result.field_records())?;
    Ok(())
}

/// Build the keyed records for a parse result without writing them.
pub fn records_for(
    receipt_id: &str,
    result: &ReceiptParseResult,
) -> Result<Vec<StoredRecord>, StorageError> {
    let items = result
        .items
        .iter()
        .map(|item| StoredRecord::for_item(receipt_id, item));
    let fields = result
        .field_records()
        .into_iter()
        .map(|record| StoredRecord::for_field(receipt_id, record));

    items.chain(fields).collect()
}

/// In-memory table with conditional-put semantics.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: BTreeMap<StorageKey, StoredRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose sort key starts with `prefix`, in key order.
    pub fn query(&self, pk: &str, sk_prefix: &str) -> Vec<&StoredRecord> {
        self.records
            .values()
            .filter(|r| r.key.pk == pk && r.key.sk.starts_with(sk_prefix))
            .collect()
    }

    fn put_batch(&mut self, batch: Vec<StoredRecord>) -> Result<(), StorageError> {
        if let Some(existing) = batch.iter().find(|r| self.records.contains_key(&r.key)) {
            return Err(StorageError::Duplicate {
                pk: existing.key.pk.clone(),
                sk: existing.key.sk.clone(),
            });
        }

        debug!("Writing batch of {} records", batch.len());
        for record in batch {
            self.records.insert(record.key.clone(), record);
        }
        Ok(())
    }
}

impl ReceiptSink for MemorySink {
    fn write_items(&mut self, receipt_id: &str, items: &[ItemRecord]) -> Result<(), StorageError> {
        let batch = items
            .iter()
            .map(|item| StoredRecord::for_item(receipt_id, item))
            .collect::<Result<Vec<_>, _>>()?;
        self.put_batch(batch)
    }

    fn write_fields(
        &mut self,
        receipt_id: &str,
        records: &[&SpecialFieldRecord],
    ) -> Result<(), StorageError> {
        let batch = records
            .iter()
            .map(|record| StoredRecord::for_field(receipt_id, record))
            .collect::<Result<Vec<_>, _>>()?;
        self.put_batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::{ReceiptExtractor, ReceiptParser};
    use pretty_assertions::assert_eq;

    fn parsed() -> ReceiptParseResult {
        ReceiptParser::new()
            .extract_from_text("123 BANANAS\n3.99\n456 WIDGET\n5.99\nSUBTOTAL\n9.98\nTOTAL")
            .unwrap()
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            StorageKey::item("r-1", 7),
            StorageKey {
                pk: "RECEIPT#r-1".to_string(),
                sk: "ITEM#0007".to_string(),
            }
        );
        assert_eq!(
            StorageKey::field("r-1", FieldName::Subtotal, FieldRole::Value).sk,
            "GEOMETRY#SUBTOTAL#VALUE"
        );
    }

    #[test]
    fn test_store_result_writes_both_batches() {
        let mut sink = MemorySink::new();
        store_result(&mut sink, "r-1", &parsed()).unwrap();

        // 2 items, subtotal label + value, total label only.
        assert_eq!(sink.len(), 5);
        let items = sink.query("RECEIPT#r-1", "ITEM#");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].payload["name"], "BANANAS");
        assert_eq!(items[1].entity_type, EntityType::ReceiptItem);

        let geometry = sink.query("RECEIPT#r-1", "GEOMETRY#");
        let keys: Vec<&str> = geometry.iter().map(|r| r.key.sk.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "GEOMETRY#SUBTOTAL#LABEL",
                "GEOMETRY#SUBTOTAL#VALUE",
                "GEOMETRY#TOTAL#LABEL",
            ]
        );
    }

    #[test]
    fn test_retry_is_rejected() {
        let mut sink = MemorySink::new();
        let result = parsed();
        store_result(&mut sink, "r-1", &result).unwrap();

        let err = store_result(&mut sink, "r-1", &result).unwrap_err();
        assert_eq!(
            err,
            StorageError::Duplicate {
                pk: "RECEIPT#r-1".to_string(),
                sk: "ITEM#0000".to_string(),
            }
        );
        assert_eq!(sink.len(), 5);

        store_result(&mut sink, "r-2", &result).unwrap();
        assert_eq!(sink.len(), 10);
    }

    #[test]
    fn test_records_for_matches_sink() {
        let records = records_for("r-9", &parsed()).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].key, StorageKey::item("r-9", 0));
        assert_eq!(records[4].entity_type, EntityType::ReceiptGeometry);
    }
}
