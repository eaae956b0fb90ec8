//! Per-order accumulation of reserved lines.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use stockroom_core::{DomainError, OrderId, ProductId, ValueObject};
use stockroom_inventory::MutationKind;

use crate::workers::TaskOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u64,
}

impl ValueObject for OrderLine {}

/// A mutation of an order that the stock rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFailure {
    pub order_id: OrderId,
    pub kind: MutationKind,
    pub product_id: ProductId,
    pub quantity: u32,
    pub error: DomainError,
}

impl fmt::Display for OrderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order {}: {} of {} x{} failed: {}",
            self.order_id, self.kind, self.product_id, self.quantity, self.error
        )
    }
}

pub type FailureSink = Arc<dyn Fn(&OrderFailure) + Send + Sync>;

/// Lines successfully reserved for one order.
///
/// Only task completion callbacks mutate it. Every read-modify-write of the
/// line list happens under one acquisition of the order lock.
pub struct OrderAggregator {
    order_id: OrderId,
    lines: Mutex<Vec<OrderLine>>,
    failure_sink: Option<FailureSink>,
}

impl fmt::Debug for OrderAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderAggregator")
            .field("order_id", &self.order_id)
            .field("lines", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl OrderAggregator {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            lines: Mutex::new(Vec::new()),
            failure_sink: None,
        }
    }

    pub fn with_failure_sink(order_id: OrderId, sink: FailureSink) -> Self {
        Self {
            failure_sink: Some(sink),
            ..Self::new(order_id)
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Record a completed reservation; repeated products merge into one line.
    pub fn on_reserve_complete(&self, product_id: ProductId, quantity: u32, outcome: &TaskOutcome) {
        match outcome {
            Ok(remaining) => {
                let mut lines = self.lock();
                match lines.iter_mut().find(|l| l.product_id == product_id) {
                    Some(line) => line.quantity += u64::from(quantity),
                    None => lines.push(OrderLine {
                        product_id,
                        quantity: u64::from(quantity),
                    }),
                }
                info!(
                    order_id = %self.order_id,
                    %product_id,
                    quantity,
                    remaining,
                    "product added to order"
                );
            }
            Err(err) => self.fail(MutationKind::Reserve, product_id, quantity, err),
        }
    }

    /// Record a completed return: the matching line shrinks and disappears at zero.
    pub fn on_return_complete(&self, product_id: ProductId, quantity: u32, outcome: &TaskOutcome) {
        if let Err(err) = outcome {
            self.fail(MutationKind::Return, product_id, quantity, err);
            return;
        }

        let mut lines = self.lock();
        let Some(index) = lines.iter().position(|l| l.product_id == product_id) else {
            warn!(
                order_id = %self.order_id,
                %product_id,
                quantity,
                "returned product was not on the order"
            );
            return;
        };

        let line = &mut lines[index];
        line.quantity = line.quantity.saturating_sub(u64::from(quantity));
        if line.quantity == 0 {
            lines.remove(index);
        }
        info!(order_id = %self.order_id, %product_id, quantity, "product removed from order");
    }

    pub fn lines(&self) -> Vec<OrderLine> {
        self.lock().clone()
    }

    /// Reserved quantity of `product_id` on this order (0 if absent).
    pub fn quantity_of(&self, product_id: ProductId) -> u64 {
        self.lock()
            .iter()
            .find(|l| l.product_id == product_id)
            .map_or(0, |l| l.quantity)
    }

    fn fail(&self, kind: MutationKind, product_id: ProductId, quantity: u32, err: &DomainError) {
        warn!(
            order_id = %self.order_id,
            %product_id,
            %kind,
            quantity,
            error = %err,
            "order mutation failed"
        );

        if let Some(sink) = &self.failure_sink {
            sink(&OrderFailure {
                order_id: self.order_id,
                kind,
                product_id,
                quantity,
                error: err.clone(),
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OrderLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
