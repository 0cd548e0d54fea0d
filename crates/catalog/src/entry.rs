//! Back-office documents that are written to the backend: loss entry
//! batches, receiving logs and price quotes.
//!
//! Costs are snapshotted from the catalog when a line is built, so a document
//! keeps its value even if the catalog is refreshed before it is synced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use backoffice_core::{DomainError, DomainResult, Money};

use crate::item::{CatalogItem, ItemId};
use crate::pricing::{commercial_round, markup_price};

/// Why stock was written off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    Expired,
    Damaged,
    Theft,
    #[default]
    Other,
}

/// One written-off item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLine {
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "qty")]
    pub quantity: f64,
    #[serde(default)]
    pub unit_cost: Money,
    #[serde(default)]
    pub reason: LossReason,
}

impl EntryLine {
    pub fn from_item(item: &CatalogItem, quantity: f64, reason: LossReason) -> DomainResult<Self> {
        check_quantity(quantity)?;
        Ok(Self {
            item_id: Some(item.id.clone()),
            barcode: item.barcode.clone(),
            name: item.name.clone(),
            quantity,
            unit_cost: item.unit_cost,
            reason,
        })
    }

    pub fn total(&self) -> Money {
        self.unit_cost.times(self.quantity)
    }
}

/// A batch of loss entries recorded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryBatch {
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<EntryLine>,
}

impl EntryBatch {
    pub fn new(items: Vec<EntryLine>) -> DomainResult<Self> {
        let batch = Self {
            recorded_at: Utc::now(),
            notes: None,
            items,
        };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("entry batch has no items"));
        }
        for line in &self.items {
            check_quantity(line.quantity)?;
            if line.item_id.is_none() && line.barcode.is_none() {
                return Err(DomainError::validation("entry line needs an item id or a barcode"));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(EntryLine::total).sum()
    }
}

/// One line of goods received from a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivingLine {
    pub item_id: Option<ItemId>,
    pub barcode: Option<String>,
    pub name: String,
    pub quantity: f64,
    pub unit_cost: Money,
}

impl ReceivingLine {
    pub fn total(&self) -> Money {
        self.unit_cost.times(self.quantity)
    }
}

/// Log of a supplier delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivingLog {
    pub supplier: String,
    pub invoice_number: Option<String>,
    pub received_at: DateTime<Utc>,
    pub lines: Vec<ReceivingLine>,
}

impl ReceivingLog {
    pub fn validate(&self) -> DomainResult<()> {
        if self.supplier.trim().is_empty() {
            return Err(DomainError::validation("receiving log without supplier"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("receiving log has no lines"));
        }
        for line in &self.lines {
            check_quantity(line.quantity)?;
            if line.unit_cost.is_negative() {
                return Err(DomainError::validation(format!("negative cost for {}", line.name)));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(ReceivingLine::total).sum()
    }
}

/// A quoted item, priced from its cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub item_id: ItemId,
    pub name: String,
    pub quantity: f64,
    pub unit_cost: Money,
    pub markup_pct: f64,
    pub unit_price: Money,
}

impl QuoteLine {
    /// Price `item` at `markup_pct`, optionally snapping to a commercial
    /// `x.99` price.
    pub fn priced(item: &CatalogItem, quantity: f64, markup_pct: f64, commercial: bool) -> DomainResult<Self> {
        check_quantity(quantity)?;
        let mut unit_price = markup_price(item.unit_cost, markup_pct)?;
        if commercial {
            unit_price = commercial_round(unit_price);
        }
        Ok(Self {
            item_id: item.id.clone(),
            name: item.name.clone(),
            quantity,
            unit_cost: item.unit_cost,
            markup_pct,
            unit_price,
        })
    }

    pub fn total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// A price quote prepared for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub customer: String,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<QuoteLine>,
}

impl PriceQuote {
    pub fn validate(&self) -> DomainResult<()> {
        if self.customer.trim().is_empty() {
            return Err(DomainError::validation("price quote without customer"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("price quote has no lines"));
        }
        for line in &self.lines {
            check_quantity(line.quantity)?;
            if line.unit_price.is_negative() {
                return Err(DomainError::validation(format!("negative price for {}", line.name)));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(QuoteLine::total).sum()
    }
}

fn check_quantity(quantity: f64) -> DomainResult<()> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(())
    } else {
        Err(DomainError::validation(format!("quantity must be positive: {quantity}")))
    }
}
