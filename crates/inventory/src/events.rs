use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::ProductId;
use stockroom_events::Event;

/// Kind of stock mutation a caller can request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Decrement, conditional on sufficient stock.
    Reserve,
    /// Increment, unconditional.
    Return,
    /// Availability query; never changes the quantity.
    Check,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Reserve => "reserve",
            MutationKind::Return => "return",
            MutationKind::Check => "check",
        }
    }
}

impl core::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event: a product's quantity changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChanged {
    pub product_id: ProductId,
    pub quantity: u32,
    pub new_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: availability was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChecked {
    pub product_id: ProductId,
    pub quantity: u32,
    pub available: i64,
    pub sufficient: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a mutation was rejected and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRejected {
    pub product_id: ProductId,
    pub kind: MutationKind,
    pub quantity: u32,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    Reserved(StockChanged),
    Returned(StockChanged),
    Checked(StockChecked),
    Rejected(MutationRejected),
}

impl StockEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            StockEvent::Reserved(e) | StockEvent::Returned(e) => e.product_id,
            StockEvent::Checked(e) => e.product_id,
            StockEvent::Rejected(e) => e.product_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::Reserved(_) => "inventory.stock.reserved",
            StockEvent::Returned(_) => "inventory.stock.returned",
            StockEvent::Checked(_) => "inventory.stock.checked",
            StockEvent::Rejected(_) => "inventory.stock.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::Reserved(e) | StockEvent::Returned(e) => e.occurred_at,
            StockEvent::Checked(e) => e.occurred_at,
            StockEvent::Rejected(e) => e.occurred_at,
        }
    }
}
