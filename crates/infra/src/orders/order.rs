//! Customer order driving stock mutations through a shared task queue.

use std::sync::Arc;

use tracing::info;

use stockroom_core::{Entity, OrderId, ProductId};
use stockroom_inventory::MutationKind;

use super::aggregator::{FailureSink, OrderAggregator, OrderLine};
use crate::workers::{TaskQueue, WorkerError};

/// A logical order.
///
/// Every operation is asynchronous: it enqueues a task and returns as soon as
/// the queue accepts it. The order's lines change only when the task's
/// callback runs on the queue worker.
#[derive(Debug, Clone)]
pub struct Order {
    aggregator: Arc<OrderAggregator>,
    queue: Arc<TaskQueue>,
}

impl Order {
    pub fn new(id: OrderId, queue: Arc<TaskQueue>) -> Self {
        Self {
            aggregator: Arc::new(OrderAggregator::new(id)),
            queue,
        }
    }

    pub fn with_failure_sink(id: OrderId, queue: Arc<TaskQueue>, sink: FailureSink) -> Self {
        Self {
            aggregator: Arc::new(OrderAggregator::with_failure_sink(id, sink)),
            queue,
        }
    }

    /// Reserve `quantity` units and, on success, add them to the order.
    pub fn add_product_async(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), WorkerError> {
        let aggregator = Arc::clone(&self.aggregator);
        self.queue
            .submit_mutation(MutationKind::Reserve, product_id, quantity, move |outcome| {
                aggregator.on_reserve_complete(product_id, quantity, &outcome);
            })
    }

    /// Return `quantity` units to stock and, on success, take them off the order.
    pub fn remove_product_async(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), WorkerError> {
        let aggregator = Arc::clone(&self.aggregator);
        self.queue
            .submit_mutation(MutationKind::Return, product_id, quantity, move |outcome| {
                aggregator.on_return_complete(product_id, quantity, &outcome);
            })
    }

    /// Ask whether `quantity` units are available; `on_checked` receives the answer.
    pub fn check_product_async<F>(
        &self,
        product_id: ProductId,
        quantity: u32,
        on_checked: F,
    ) -> Result<(), WorkerError>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let order_id = self.id();
        self.queue
            .submit_mutation(MutationKind::Check, product_id, quantity, move |outcome| {
                let available = outcome.is_ok();
                info!(%order_id, %product_id, quantity, available, "availability checked");
                on_checked(available);
            })
    }

    pub fn lines(&self) -> Vec<OrderLine> {
        self.aggregator.lines()
    }

    pub fn quantity_of(&self, product_id: ProductId) -> u64 {
        self.aggregator.quantity_of(product_id)
    }

    pub fn aggregator(&self) -> &Arc<OrderAggregator> {
        &self.aggregator
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> OrderId {
        self.aggregator.order_id()
    }
}
