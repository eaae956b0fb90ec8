//! Atomic compare-and-apply for stock quantities.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use stockroom_core::{DomainError, DomainResult, Entity, ProductId, ValueObject};

use crate::events::{MutationKind, MutationRejected, StockChanged, StockChecked, StockEvent};
use crate::observer::{NoopObserver, StockObserver};
use crate::product::Product;
use crate::registry::ProductRegistry;

/// Outcome of one (product, quantity) line applied by a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineOutcome {
    pub product_id: ProductId,
    pub quantity: u32,
    /// New (or, for checks, available) quantity on success.
    #[serde(serialize_with = "serialize_result")]
    pub result: DomainResult<i64>,
}

impl LineOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl ValueObject for LineOutcome {}

fn serialize_result<S>(result: &DomainResult<i64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match result {
        Ok(quantity) => serializer.serialize_i64(*quantity),
        Err(err) => serializer.serialize_str(&err.to_string()),
    }
}

/// Applies quantity changes to products held by a [`ProductRegistry`].
///
/// Every change is a single critical section on the product's own lock: the
/// read of the current quantity, the non-negative check and the write happen
/// without the lock being released in between. Two reservations racing for
/// the last units can therefore never both succeed.
pub struct StockMutator {
    registry: Arc<ProductRegistry>,
    observer: Arc<dyn StockObserver>,
}

impl core::fmt::Debug for StockMutator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockMutator")
            .field("products", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl StockMutator {
    pub fn new(registry: Arc<ProductRegistry>) -> Self {
        Self::with_observer(registry, Arc::new(NoopObserver))
    }

    pub fn with_observer(registry: Arc<ProductRegistry>, observer: Arc<dyn StockObserver>) -> Self {
        Self { registry, observer }
    }

    pub fn registry(&self) -> &Arc<ProductRegistry> {
        &self.registry
    }

    /// Apply `delta` to the product's quantity if the result stays non-negative.
    ///
    /// Returns the new quantity. On `InsufficientStock` the quantity is unchanged.
    pub fn apply_delta(&self, product: &Product, delta: i64) -> DomainResult<i64> {
        let mut quantity = product.lock_quantity();

        let next = quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if next < 0 {
            return Err(DomainError::insufficient(
                product.id(),
                delta.unsigned_abs(),
                *quantity,
            ));
        }

        *quantity = next;
        Ok(next)
    }

    /// Run one mutation of the given kind, then report it to the log and observer.
    pub fn apply(
        &self,
        kind: MutationKind,
        product_id: ProductId,
        quantity: u32,
    ) -> DomainResult<i64> {
        let result = self.try_apply(kind, product_id, quantity);
        self.report(kind, product_id, quantity, &result);
        result
    }

    /// Decrement by `quantity`, failing if stock is insufficient.
    pub fn reserve(&self, product_id: ProductId, quantity: u32) -> DomainResult<i64> {
        self.apply(MutationKind::Reserve, product_id, quantity)
    }

    /// Increment by `quantity`. Always succeeds for a registered product.
    pub fn return_stock(&self, product_id: ProductId, quantity: u32) -> DomainResult<i64> {
        self.apply(MutationKind::Return, product_id, quantity)
    }

    /// Report the available quantity if it covers `quantity`.
    pub fn check(&self, product_id: ProductId, quantity: u32) -> DomainResult<i64> {
        self.apply(MutationKind::Check, product_id, quantity)
    }

    pub fn reserve_one(&self, product_id: ProductId) -> DomainResult<i64> {
        self.reserve(product_id, 1)
    }

    pub fn return_one(&self, product_id: ProductId) -> DomainResult<i64> {
        self.return_stock(product_id, 1)
    }

    /// Apply a sequence of lines of one kind, in order, without rollback.
    pub fn apply_lines<I>(&self, kind: MutationKind, lines: I) -> Vec<LineOutcome>
    where
        I: IntoIterator<Item = (ProductId, u32)>,
    {
        lines
            .into_iter()
            .map(|(product_id, quantity)| LineOutcome {
                product_id,
                quantity,
                result: self.apply(kind, product_id, quantity),
            })
            .collect()
    }

    fn try_apply(
        &self,
        kind: MutationKind,
        product_id: ProductId,
        quantity: u32,
    ) -> DomainResult<i64> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let product = self
            .registry
            .find(product_id)
            .ok_or(DomainError::UnknownProduct(product_id))?;

        match kind {
            MutationKind::Reserve => self.apply_delta(&product, -i64::from(quantity)),
            MutationKind::Return => self.apply_delta(&product, i64::from(quantity)),
            MutationKind::Check => {
                let available = product.quantity();
                if available >= i64::from(quantity) {
                    Ok(available)
                } else {
                    Err(DomainError::insufficient(product_id, u64::from(quantity), available))
                }
            }
        }
    }

    fn report(
        &self,
        kind: MutationKind,
        product_id: ProductId,
        quantity: u32,
        result: &DomainResult<i64>,
    ) {
        let occurred_at = Utc::now();

        let event = match (kind, result) {
            (MutationKind::Reserve, Ok(new_quantity)) => {
                tracing::info!(%product_id, quantity, new_quantity, "stock reserved");
                StockEvent::Reserved(StockChanged {
                    product_id,
                    quantity,
                    new_quantity: *new_quantity,
                    occurred_at,
                })
            }
            (MutationKind::Return, Ok(new_quantity)) => {
                tracing::info!(%product_id, quantity, new_quantity, "stock returned");
                StockEvent::Returned(StockChanged {
                    product_id,
                    quantity,
                    new_quantity: *new_quantity,
                    occurred_at,
                })
            }
            (MutationKind::Check, Ok(available)) => {
                tracing::info!(%product_id, quantity, available, "stock available");
                StockEvent::Checked(StockChecked {
                    product_id,
                    quantity,
                    available: *available,
                    sufficient: true,
                    occurred_at,
                })
            }
            (MutationKind::Check, Err(DomainError::InsufficientStock { available, .. })) => {
                tracing::info!(%product_id, quantity, available, "stock unavailable");
                StockEvent::Checked(StockChecked {
                    product_id,
                    quantity,
                    available: *available,
                    sufficient: false,
                    occurred_at,
                })
            }
            (kind, Err(err)) => {
                tracing::warn!(
                    %product_id,
                    %kind,
                    quantity,
                    error = %err,
                    "stock mutation rejected"
                );
                StockEvent::Rejected(MutationRejected {
                    product_id,
                    kind,
                    quantity,
                    reason: err.to_string(),
                    occurred_at,
                })
            }
        };

        // The mutation already happened; an observer fault must not hide it
        // from the caller.
        let notified =
            panic::catch_unwind(AssertUnwindSafe(|| self.observer.on_stock_event(&event)));
        if let Err(payload) = notified {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(%product_id, %kind, panic = %message, "stock observer panicked");
        }
    }
}
