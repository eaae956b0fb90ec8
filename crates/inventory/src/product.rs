use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ProductId, ValueObject};

/// Plain product record, as produced by the persistence layer.
///
/// Also used as the immutable snapshot returned by [`Product::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    /// Price in the smallest currency unit (e.g. cents).
    pub price_cents: u64,
    pub quantity: i64,
}

impl ProductRecord {
    pub fn new(id: u64, name: impl Into<String>, price_cents: u64, quantity: i64) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            price_cents,
            quantity,
        }
    }
}

impl ValueObject for ProductRecord {}

/// A stocked product.
///
/// Identity, name and price never change after construction and are read
/// without locking. The quantity sits behind the product's own mutex; it is
/// only written by `StockMutator`, which performs check-and-set inside one
/// critical section.
#[derive(Debug)]
pub struct Product {
    id: ProductId,
    name: String,
    price_cents: u64,
    quantity: Mutex<i64>,
}

impl Product {
    /// Build a product from a persisted record.
    pub fn new(record: ProductRecord) -> DomainResult<Self> {
        if record.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if record.quantity < 0 {
            return Err(DomainError::validation(format!(
                "product {} has negative quantity {}",
                record.id, record.quantity
            )));
        }

        Ok(Self {
            id: record.id,
            name: record.name,
            price_cents: record.price_cents,
            quantity: Mutex::new(record.quantity),
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price_cents(&self) -> u64 {
        self.price_cents
    }

    /// Current quantity (one lock acquisition).
    pub fn quantity(&self) -> i64 {
        *self.lock_quantity()
    }

    /// Consistent copy of every field, taken under a single lock acquisition.
    pub fn snapshot(&self) -> ProductRecord {
        let quantity = *self.lock_quantity();
        ProductRecord {
            id: self.id,
            name: self.name.clone(),
            price_cents: self.price_cents,
            quantity,
        }
    }

    /// Lock the quantity counter.
    ///
    /// The counter is a plain integer written only after the non-negative check
    /// passed, so a poisoned lock still guards a valid value.
    pub(crate) fn lock_quantity(&self) -> MutexGuard<'_, i64> {
        self.quantity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}
