//! Catalog domain module.
//!
//! Business rules for the product catalog and the documents built on top of
//! it (loss entries, receiving logs, price quotes), implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod barcode;
pub mod entry;
pub mod item;
pub mod pricing;

pub use barcode::{BarcodeKey, normalize_barcode};
pub use entry::{EntryBatch, EntryLine, LossReason, PriceQuote, QuoteLine, ReceivingLine, ReceivingLog};
pub use item::{CatalogItem, ItemId};
pub use pricing::{commercial_round, margin_of, margin_price, markup_price};
