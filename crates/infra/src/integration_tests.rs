//! Integration tests for the concurrent mutation paths.
//!
//! Tests: Order → TaskQueue → StockMutator → callback → OrderAggregator,
//! Receipt → ReceiptPipeline → StockMutator, and both racing on one registry.
//!
//! Verifies:
//! - Stock is conserved: initial = final + held by orders + sold by receipts
//! - Quantities never go negative under contention
//! - Every mutation reaches the event bus in per-source sequence order

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier, mpsc};
    use std::time::Duration;

    use stockroom_core::{OrderId, ProductId, ReceiptId};
    use stockroom_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use stockroom_inventory::{
        BusObserver, ProductRecord, ProductRegistry, StockEvent, StockMutator,
    };

    use crate::config::PoolConfig;
    use crate::orders::Order;
    use crate::workers::{
        LifecycleState, ReceiptLine, ReceiptPipeline, ReceiptPipelineConfig, ReceiptReport,
        TaskQueue, WorkerPool,
    };

    fn seed() -> Vec<ProductRecord> {
        vec![
            ProductRecord::new(1, "Laptop", 100_000, 10),
            ProductRecord::new(2, "Mouse", 2_500, 50),
            ProductRecord::new(3, "Keyboard", 4_000, 30),
        ]
    }

    fn mutator() -> Arc<StockMutator> {
        Arc::new(StockMutator::new(Arc::new(
            ProductRegistry::from_records(seed()).unwrap(),
        )))
    }

    fn stock(mutator: &StockMutator, id: u64) -> i64 {
        mutator.registry().find(ProductId::new(id)).unwrap().quantity()
    }

    #[test]
    fn orders_driven_from_a_pool_share_one_queue() {
        let mutator = mutator();
        let queue = Arc::new(TaskQueue::spawn("orders", Arc::clone(&mutator)).unwrap());
        let pool = WorkerPool::new(
            PoolConfig::default()
                .with_name("order-driver")
                .with_workers(3),
        )
        .unwrap();

        let orders: Vec<Order> = (1..=3)
            .map(|n| Order::new(OrderId::new(n), Arc::clone(&queue)))
            .collect();

        for order in &orders {
            let order = order.clone();
            pool.submit(move || {
                order.add_product_async(ProductId::new(1), 1).unwrap();
                order.add_product_async(ProductId::new(2), 2).unwrap();
                order.add_product_async(ProductId::new(3), 1).unwrap();
                order.remove_product_async(ProductId::new(2), 1).unwrap();
            })
            .unwrap();
        }

        pool.shutdown();
        queue.shutdown();
        assert_eq!(queue.state(), LifecycleState::Stopped);

        for order in &orders {
            assert_eq!(order.quantity_of(ProductId::new(1)), 1);
            assert_eq!(order.quantity_of(ProductId::new(2)), 1);
            assert_eq!(order.quantity_of(ProductId::new(3)), 1);
        }
        assert_eq!(stock(&mutator, 1), 7);
        assert_eq!(stock(&mutator, 2), 47);
        assert_eq!(stock(&mutator, 3), 27);

        let stats = queue.stats();
        assert_eq!(stats.processed, 12);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn orders_and_receipts_racing_for_scarce_stock_conserve_it() {
        let mutator = mutator();
        let queue = Arc::new(TaskQueue::spawn("orders", Arc::clone(&mutator)).unwrap());
        let (tx, rx) = mpsc::channel();
        let pipeline = ReceiptPipeline::with_sink(
            Arc::clone(&mutator),
            ReceiptPipelineConfig::default().with_workers(3),
            move |report| tx.send(report).unwrap(),
        )
        .unwrap();

        let orders: Vec<Order> = (1..=4)
            .map(|n| Order::new(OrderId::new(n), Arc::clone(&queue)))
            .collect();

        // 4 orders x 2 laptops + 6 receipts x 1 laptop against 10 in stock.
        for order in &orders {
            order.add_product_async(ProductId::new(1), 2).unwrap();
        }
        for id in 0..6 {
            let lines = vec![ReceiptLine::new(1, 1), ReceiptLine::new(2, 1)];
            pipeline.submit_receipt(ReceiptId::new(id), lines).unwrap();
        }

        pipeline.shutdown();
        queue.shutdown();

        let reports: Vec<ReceiptReport> = rx.try_iter().collect();
        let held: u64 = orders.iter().map(|o| o.quantity_of(ProductId::new(1))).sum();
        let sold = reports
            .iter()
            .filter(|r| r.lines[0].is_success())
            .count() as i64;
        let remaining = stock(&mutator, 1);

        assert!(remaining >= 0);
        assert_eq!(remaining + held as i64 + sold, 10);
        assert_eq!(stock(&mutator, 2), 50 - reports.len() as i64);
    }

    #[test]
    fn half_reserve_half_return_through_the_pool_restores_quantity() {
        let registry = Arc::new(
            ProductRegistry::from_records([ProductRecord::new(1, "Laptop", 100_000, 100)]).unwrap(),
        );
        let mutator = Arc::new(StockMutator::new(registry));
        let pool = WorkerPool::new(PoolConfig::default().with_workers(8)).unwrap();
        let barrier = Arc::new(Barrier::new(8));

        for worker in 0..8 {
            let mutator = Arc::clone(&mutator);
            let barrier = Arc::clone(&barrier);
            pool.submit(move || {
                barrier.wait();
                for i in 0..50 {
                    if (worker + i) % 2 == 0 {
                        mutator.reserve_one(ProductId::new(1)).unwrap();
                    } else {
                        mutator.return_one(ProductId::new(1)).unwrap();
                    }
                }
            })
            .unwrap();
        }
        pool.shutdown();

        assert_eq!(stock(&mutator, 1), 100);
        assert_eq!(pool.stats().faulted, 0);
    }

    #[test]
    fn stock_events_reach_the_bus_in_sequence() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<StockEvent>>> =
            Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let registry = Arc::new(ProductRegistry::from_records(seed()).unwrap());
        let mutator = Arc::new(StockMutator::with_observer(
            registry,
            Arc::new(BusObserver::new(Arc::clone(&bus), "orders")),
        ));
        let queue = Arc::new(TaskQueue::spawn("orders", Arc::clone(&mutator)).unwrap());
        let order = Order::new(OrderId::new(1), Arc::clone(&queue));

        order.add_product_async(ProductId::new(1), 4).unwrap();
        order.add_product_async(ProductId::new(1), 20).unwrap();
        order.remove_product_async(ProductId::new(1), 1).unwrap();

        let timeout = Duration::from_secs(5);
        let envelopes: Vec<_> = (0..3)
            .map(|_| subscription.recv_timeout(timeout).unwrap())
            .collect();

        let sequences: Vec<u64> = envelopes.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(envelopes.iter().all(|e| e.source() == "orders"));
        assert!(matches!(envelopes[0].payload(), StockEvent::Reserved(c) if c.new_quantity == 6));
        assert!(matches!(envelopes[1].payload(), StockEvent::Rejected(_)));
        assert!(matches!(envelopes[2].payload(), StockEvent::Returned(c) if c.new_quantity == 7));

        queue.shutdown();
        assert_eq!(order.quantity_of(ProductId::new(1)), 3);
    }
}
