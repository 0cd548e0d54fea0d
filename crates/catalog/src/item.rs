use serde::{Deserialize, Serialize};
use serde_json::Value;

use backoffice_core::{DomainError, DomainResult, Money};

use crate::barcode::BarcodeKey;

/// Catalog item identifier, as assigned by the backend.
///
/// Opaque: the backend may use integers or UUIDs, both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A purchasable/trackable item mirrored from the remote catalog.
///
/// Read-only on this side: items are only ever replaced wholesale by a
/// catalog refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub barcode: Option<String>,
    pub name: String,
    pub unit_cost: Money,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, barcode: Option<&str>, name: impl Into<String>, unit_cost: Money) -> Self {
        Self {
            id: ItemId::new(id),
            barcode: barcode.map(str::to_string),
            name: name.into(),
            unit_cost,
        }
    }

    /// Match key for the item's barcode, if it has one with any digits.
    pub fn barcode_key(&self) -> Option<BarcodeKey> {
        self.barcode.as_deref().and_then(BarcodeKey::new)
    }

    /// Build an item from a remote row.
    ///
    /// Rows are loosely typed: `id` and `barcode` may be numbers or strings,
    /// `unit_cost` a number or decimal text, and a missing cost means zero.
    pub fn from_row(row: &Value) -> DomainResult<Self> {
        let obj = row
            .as_object()
            .ok_or_else(|| DomainError::validation("catalog row is not an object"))?;

        let id = obj
            .get("id")
            .and_then(scalar_text)
            .ok_or_else(|| DomainError::validation("catalog row without id"))?;

        let barcode = obj
            .get("barcode")
            .and_then(scalar_text)
            .filter(|b| !b.trim().is_empty());

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let unit_cost = match obj.get("unit_cost") {
            None | Some(Value::Null) => Money::ZERO,
            Some(Value::Number(n)) => {
                let v = n
                    .as_f64()
                    .ok_or_else(|| DomainError::validation(format!("item {id}: bad unit_cost")))?;
                Money::from_decimal(v)?
            }
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(DomainError::validation(format!(
                    "item {id}: unit_cost has unexpected type: {other}"
                )));
            }
        };

        Ok(Self {
            id: ItemId::new(id),
            barcode,
            name,
            unit_cost,
        })
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
