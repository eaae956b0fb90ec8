//! The end-to-end warehouse run: concurrent orders, cashier receipts,
//! documents and a reserve/return stress round against one registry.

use std::sync::{Arc, mpsc};
use std::thread;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{info, warn};

use stockroom_core::{DocumentId, Entity, OrderId, ProductId, ReceiptId};
use stockroom_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockroom_infra::{
    DocumentProcessor, Order, OrderLine, PoolConfig, PoolStats, ReceiptLine, ReceiptPipeline,
    ReceiptReport, RuntimeConfig, TaskQueue, TaskQueueStats, WorkerError, WorkerPool,
};
use stockroom_inventory::{
    BusObserver, DocumentFactory, DocumentKind, DocumentReport, ProductRecord, StockEvent,
    StockMutator,
};

use crate::seed;

const LAPTOP: ProductId = ProductId::new(1);
const MOUSE: ProductId = ProductId::new(2);
const KEYBOARD: ProductId = ProductId::new(3);

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub orders: Vec<OrderSummary>,
    pub availability_checks: Vec<(OrderId, bool)>,
    /// Orders whose submissions were refused by the task queue.
    pub rejected_orders: Vec<OrderId>,
    pub receipts: Vec<ReceiptReport>,
    pub documents: Vec<DocumentReport>,
    pub order_queue: TaskQueueStats,
    pub receipt_pool: PoolStats,
    pub stress_laptops_before: i64,
    pub stress_laptops_after: i64,
    pub events_published: usize,
    pub inventory: Vec<ProductRecord>,
}

pub fn run(config: &RuntimeConfig) -> Result<SimulationSummary> {
    let registry = Arc::new(seed::build_registry(config.seed_file.as_deref())?);
    log_inventory("initial inventory", &registry.list());

    let bus: Arc<InMemoryEventBus<EventEnvelope<StockEvent>>> = Arc::new(InMemoryEventBus::new());
    let events = bus.subscribe();
    let mutator = Arc::new(StockMutator::with_observer(
        Arc::clone(&registry),
        Arc::new(BusObserver::new(Arc::clone(&bus), "stock-mutator")),
    ));

    let order_phase = run_orders(&mutator)?;
    let (receipts, receipt_pool) = run_receipts(&mutator, config)?;
    let documents = run_documents(&mutator, config)?;
    let (stress_laptops_before, stress_laptops_after) = run_stress(&mutator)?;

    let inventory = registry.list();
    log_inventory("final inventory", &inventory);

    Ok(SimulationSummary {
        orders: order_phase.orders,
        availability_checks: order_phase.availability_checks,
        rejected_orders: order_phase.rejected_orders,
        receipts,
        documents,
        order_queue: order_phase.queue_stats,
        receipt_pool,
        stress_laptops_before,
        stress_laptops_after,
        events_published: events.drain().len(),
        inventory,
    })
}

struct OrderPhase {
    orders: Vec<OrderSummary>,
    availability_checks: Vec<(OrderId, bool)>,
    rejected_orders: Vec<OrderId>,
    queue_stats: TaskQueueStats,
}

/// Three orders, each driven from its own pool worker, sharing one task queue.
fn run_orders(mutator: &Arc<StockMutator>) -> Result<OrderPhase> {
    let queue = Arc::new(TaskQueue::spawn("order-queue", Arc::clone(mutator))?);
    let drivers = WorkerPool::new(
        PoolConfig::default()
            .with_name("order-driver")
            .with_workers(3),
    )?;
    let (checks_tx, checks_rx) = mpsc::channel();
    let (rejected_tx, rejected_rx) = mpsc::channel();

    let orders: Vec<Order> = [101, 102, 103]
        .into_iter()
        .map(|id| Order::new(OrderId::new(id), Arc::clone(&queue)))
        .collect();

    let order = orders[0].clone();
    let rejected = rejected_tx.clone();
    drivers.submit(move || {
        let submitted = order
            .add_product_async(LAPTOP, 5)
            .and_then(|()| order.add_product_async(MOUSE, 10));
        report_rejection(order.id(), submitted, &rejected);
    })?;

    let order = orders[1].clone();
    let rejected = rejected_tx.clone();
    drivers.submit(move || {
        let submitted = order
            .add_product_async(KEYBOARD, 8)
            .and_then(|()| order.add_product_async(LAPTOP, 3))
            .and_then(|()| order.remove_product_async(KEYBOARD, 2));
        report_rejection(order.id(), submitted, &rejected);
    })?;

    let order = orders[2].clone();
    let rejected = rejected_tx;
    drivers.submit(move || {
        let order_id = order.id();
        let submitted = order
            .check_product_async(LAPTOP, 20, move |available| {
                let _ = checks_tx.send((order_id, available));
            })
            .and_then(|()| order.add_product_async(MOUSE, 15))
            .and_then(|()| order.add_product_async(KEYBOARD, 5));
        report_rejection(order_id, submitted, &rejected);
    })?;

    drivers.shutdown();
    queue.shutdown();

    let summaries: Vec<OrderSummary> = orders
        .iter()
        .map(|order| OrderSummary {
            order_id: order.id(),
            lines: order.lines(),
        })
        .collect();
    for summary in &summaries {
        info!(order_id = %summary.order_id, lines = ?summary.lines, "order complete");
    }

    Ok(OrderPhase {
        orders: summaries,
        availability_checks: checks_rx.try_iter().collect(),
        rejected_orders: rejected_rx.try_iter().collect(),
        queue_stats: queue.stats(),
    })
}

/// Five two-line receipts fanned across the cashier pool.
fn run_receipts(
    mutator: &Arc<StockMutator>,
    config: &RuntimeConfig,
) -> Result<(Vec<ReceiptReport>, PoolStats)> {
    let (tx, rx) = mpsc::channel();
    let pipeline = ReceiptPipeline::with_sink(
        Arc::clone(mutator),
        config.receipt_pipeline(),
        move |report| {
            let _ = tx.send(report);
        },
    )?;

    for id in 1..=5 {
        pipeline.submit_receipt(
            ReceiptId::new(id),
            vec![
                ReceiptLine::new(LAPTOP.get(), 2),
                ReceiptLine::new(MOUSE.get(), 3),
            ],
        )?;
    }
    pipeline.shutdown();

    let mut reports: Vec<ReceiptReport> = rx.try_iter().collect();
    reports.sort_by_key(|r| r.receipt_id);
    Ok((reports, pipeline.stats()))
}

/// One document of every kind, processed in the background.
fn run_documents(
    mutator: &Arc<StockMutator>,
    config: &RuntimeConfig,
) -> Result<Vec<DocumentReport>> {
    let processor = DocumentProcessor::new(Arc::clone(mutator), config.document_pool())?;
    let (tx, rx) = mpsc::channel();

    let lines = [
        (DocumentKind::IncomeInvoice, "IN-0001", KEYBOARD, 10),
        (DocumentKind::OutcomeInvoice, "OUT-0001", LAPTOP, 1),
        (DocumentKind::SaleReceipt, "SR-0001", MOUSE, 2),
        (DocumentKind::Stocktake, "ST-0001", LAPTOP, 1),
    ];

    for (n, (kind, number, product_id, quantity)) in lines.into_iter().enumerate() {
        let id = DocumentId::new(n as u64 + 1);
        let mut document = DocumentFactory::create(kind, id, number, "warehouse-clerk");
        document.add_line(product_id, quantity, "")?;

        let tx = tx.clone();
        processor.process_async(document, move |_, result| {
            let _ = tx.send(result);
        })?;
    }
    drop(tx);
    processor.shutdown();

    let mut reports = rx.try_iter().collect::<Result<Vec<_>, _>>()?;
    reports.sort_by_key(|r| r.document_id);
    Ok(reports)
}

/// Ten threads alternately reserving and returning one laptop.
fn run_stress(mutator: &Arc<StockMutator>) -> Result<(i64, i64)> {
    let laptop = mutator
        .registry()
        .find(LAPTOP)
        .ok_or_else(|| anyhow!("stress round needs product {LAPTOP}"))?;
    let before = laptop.quantity();

    thread::scope(|s| -> Result<()> {
        let handles = (0..10)
            .map(|i| {
                thread::Builder::new()
                    .name(format!("stress-{i}"))
                    .spawn_scoped(s, move || {
                        if i % 2 == 0 {
                            mutator.reserve_one(LAPTOP)
                        } else {
                            mutator.return_one(LAPTOP)
                        }
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()
            .context("failed to spawn stress thread")?;

        for handle in handles {
            let _ = handle.join().map_err(|_| anyhow!("stress thread panicked"))?;
        }
        Ok(())
    })?;

    let after = laptop.quantity();
    info!(before, after, "stress round complete");
    Ok((before, after))
}

/// Log a refused submission and hand the order id back to the driver.
fn report_rejection(
    order_id: OrderId,
    submitted: Result<(), WorkerError>,
    rejected: &mpsc::Sender<OrderId>,
) {
    if let Err(err) = submitted {
        warn!(%order_id, error = %err, "order submission rejected");
        let _ = rejected.send(order_id);
    }
}

fn log_inventory(label: &str, products: &[ProductRecord]) {
    for p in products {
        info!(
            product_id = %p.id,
            name = %p.name,
            price_cents = p.price_cents,
            quantity = p.quantity,
            "{label}"
        );
    }
}
