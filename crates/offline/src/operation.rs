//! Pending operations: the writes the client owes the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use backoffice_catalog::{EntryBatch, PriceQuote, ReceivingLog};
use backoffice_core::{DomainResult, OperationId};

/// Collection receiving one row per loss entry line.
pub const LOSS_ENTRIES: &str = "loss_entries";
/// Collection receiving one row per price quote.
pub const PRICE_QUOTES: &str = "price_quotes";
/// Server-side function that stores a receiving log header and its lines.
pub const RECORD_RECEIVING_FN: &str = "record-receiving";

/// Typed payload of a queued write, one variant per operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OperationPayload {
    CreateEntryBatch(EntryBatch),
    RecordReceiving(ReceivingLog),
    SavePriceQuote(PriceQuote),
}

impl OperationPayload {
    /// Stable kind tag, also stored in its own column.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationPayload::CreateEntryBatch(_) => "create-entry-batch",
            OperationPayload::RecordReceiving(_) => "record-receiving",
            OperationPayload::SavePriceQuote(_) => "save-price-quote",
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self {
            OperationPayload::CreateEntryBatch(batch) => batch.validate(),
            OperationPayload::RecordReceiving(log) => log.validate(),
            OperationPayload::SavePriceQuote(quote) => quote.validate(),
        }
    }

    /// The remote write that replays this payload.
    ///
    /// Every row carries `client_ref`, the local operation id, so the
    /// backend can recognise a replay it has already applied.
    pub fn to_remote_write(&self, id: OperationId) -> RemoteWrite {
        let client_ref = id.to_string();
        match self {
            OperationPayload::CreateEntryBatch(batch) => RemoteWrite::Insert {
                collection: LOSS_ENTRIES,
                rows: batch
                    .items
                    .iter()
                    .map(|line| {
                        json!({
                            "client_ref": client_ref,
                            "recorded_at": batch.recorded_at,
                            "notes": batch.notes,
                            "item_id": line.item_id,
                            "barcode": line.barcode,
                            "name": line.name,
                            "quantity": line.quantity,
                            "unit_cost": line.unit_cost.as_decimal(),
                            "total_cost": line.total().as_decimal(),
                            "reason": line.reason,
                        })
                    })
                    .collect(),
            },
            OperationPayload::RecordReceiving(log) => RemoteWrite::Invoke {
                function: RECORD_RECEIVING_FN,
                body: json!({
                    "client_ref": client_ref,
                    "supplier": log.supplier,
                    "invoice_number": log.invoice_number,
                    "received_at": log.received_at,
                    "total": log.total().as_decimal(),
                    "lines": log.lines,
                }),
            },
            OperationPayload::SavePriceQuote(quote) => RemoteWrite::Insert {
                collection: PRICE_QUOTES,
                rows: vec![json!({
                    "client_ref": client_ref,
                    "customer": quote.customer,
                    "created_at": quote.created_at,
                    "total": quote.total().as_decimal(),
                    "lines": quote.lines,
                })],
            },
        }
    }
}

/// A concrete request against the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    Insert {
        collection: &'static str,
        rows: Vec<Value>,
    },
    Invoke {
        function: &'static str,
        body: Value,
    },
}

/// Where an operation sits in the local queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting in FIFO order for the next drain.
    Pending,
    /// Rejected too many times; parked until an operator retries or discards it.
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OperationStatus::Pending),
            "failed" => Some(OperationStatus::Failed),
            _ => None,
        }
    }
}

/// A write recorded locally and not yet confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub payload: OperationPayload,
    pub created_at: DateTime<Utc>,
    pub status: OperationStatus,
    /// Replays the backend rejected since the operation was (re)queued.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingOperation {
    pub fn new(payload: OperationPayload) -> Self {
        Self {
            id: OperationId::new(),
            payload,
            created_at: Utc::now(),
            status: OperationStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_catalog::{CatalogItem, EntryLine, LossReason, QuoteLine};
    use backoffice_core::Money;

    fn batch() -> OperationPayload {
        let item = CatalogItem::new("1", Some("123"), "Leite 1L", Money::from_cents(450));
        let lines = vec![
            EntryLine::from_item(&item, 2.0, LossReason::Expired).unwrap(),
            EntryLine::from_item(&item, 1.0, LossReason::Damaged).unwrap(),
        ];
        OperationPayload::CreateEntryBatch(EntryBatch::new(lines).unwrap())
    }

    #[test]
    fn payload_round_trips_with_kind_tag() {
        let payload = batch();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "create-entry-batch");
        let back: OperationPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn minimal_entry_batch_payload_deserializes() {
        let payload: OperationPayload = serde_json::from_value(json!({
            "kind": "create-entry-batch",
            "items": [{"barcode": "123", "qty": 2}]
        }))
        .unwrap();
        assert_eq!(payload.kind(), "create-entry-batch");
        payload.validate().unwrap();
    }

    #[test]
    fn entry_batch_replays_as_one_row_per_line() {
        let id = OperationId::new();
        match batch().to_remote_write(id) {
            RemoteWrite::Insert { collection, rows } => {
                assert_eq!(collection, LOSS_ENTRIES);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0]["client_ref"], id.to_string());
                assert_eq!(rows[0]["total_cost"], 9.0);
                assert_eq!(rows[1]["reason"], "damaged");
            }
            other => panic!("unexpected write: {other:?}"),
        }
    }

    #[test]
    fn receiving_replays_through_function() {
        let log = ReceivingLog {
            supplier: "Atacado Norte".into(),
            invoice_number: None,
            received_at: Utc::now(),
            lines: vec![],
        };
        let write = OperationPayload::RecordReceiving(log).to_remote_write(OperationId::new());
        assert!(matches!(write, RemoteWrite::Invoke { function: RECORD_RECEIVING_FN, .. }));
    }

    #[test]
    fn quote_needs_customer_and_lines() {
        let quote = PriceQuote {
            customer: "Mercado Bom Preço".into(),
            created_at: Utc::now(),
            lines: vec![],
        };
        assert!(OperationPayload::SavePriceQuote(quote.clone()).validate().is_err());

        let item = CatalogItem::new("9", None, "Café 500g", Money::from_cents(1500));
        let mut quote = quote;
        quote.lines.push(QuoteLine::priced(&item, 1.0, 40.0, true).unwrap());
        OperationPayload::SavePriceQuote(quote.clone()).validate().unwrap();

        quote.customer = String::new();
        assert!(OperationPayload::SavePriceQuote(quote).validate().is_err());
    }

    #[test]
    fn status_parsing() {
        assert_eq!(OperationStatus::parse("pending"), Some(OperationStatus::Pending));
        assert_eq!(OperationStatus::parse("failed"), Some(OperationStatus::Failed));
        assert_eq!(OperationStatus::parse("synced"), None);
    }
}
